//! `capgen explain` command

use anyhow::{bail, Result};

use capgen::core::fact::FactSpec;
use capgen::core::target::TargetCondition;
use capgen::registry::{InvariantKind, ProbeRegistry, RuleKind, TargetProperty};

use super::{current_config, load_registry, resolve_policy};
use crate::cli::ExplainArgs;

pub fn execute(args: ExplainArgs) -> Result<()> {
    let config = current_config()?;
    let registry = load_registry(args.registry.as_deref(), &config)?;
    let policy = resolve_policy(&args.policy, &config, &registry)?;

    let spec = match registry.lookup(&args.fact) {
        Ok(spec) => spec,
        Err(err) => {
            let mut message = err.to_string();
            if let Some(similar) = similar_name(&registry, &args.fact) {
                message.push_str(&format!("\nhelp: did you mean `{}`?", similar));
            }
            bail!(message);
        }
    };

    print_spec(spec);

    if let Some(rule) = registry.rule_for(&spec.name) {
        println!();
        let strength = if policy.is_required(rule) { "required" } else { "advisory" };
        if policy.is_required(rule) != rule.required {
            println!("Derived by ({} rule, overridden by policy):", strength);
        } else {
            println!("Derived by ({} rule):", strength);
        }
        println!("  {}", describe_rule(&rule.kind));
        if let Some(ref when) = rule.when {
            println!("  only when {}", describe_condition(when));
        }
    }

    let consumers: Vec<_> = registry
        .derivation_rules()
        .iter()
        .filter(|r| r.inputs().contains(&spec.name.as_str()))
        .collect();
    if !consumers.is_empty() {
        println!();
        println!("Used by rules:");
        for rule in consumers {
            println!("  → {} ({})", rule.output, rule.kind.name());
        }
    }

    let groups: Vec<_> = registry.groups_of(&spec.name).collect();
    if !groups.is_empty() {
        println!();
        println!("Conflict groups:");
        for group in groups {
            println!("  {}: {}", group.name, group.members.join(", "));
            if group.prefer.is_empty() {
                println!("     (no precedence; two enabled members is an error)");
            }
            for chain in &group.prefer {
                println!("     prefer {}", chain.join(" > "));
            }
        }
    }

    let invariants: Vec<_> = registry
        .invariants()
        .iter()
        .filter(|i| i.kind.facts().contains(&spec.name.as_str()))
        .collect();
    if !invariants.is_empty() {
        println!();
        println!("Invariants:");
        for invariant in invariants {
            let scope = invariant
                .when
                .as_ref()
                .map(|w| format!(" (when {})", describe_condition(w)))
                .unwrap_or_default();
            println!(
                "  {}: {}{}",
                invariant.name,
                describe_invariant(&invariant.kind),
                scope
            );
        }
    }

    Ok(())
}

fn print_spec(spec: &FactSpec) {
    println!("{}", spec.name);
    println!("  category: {}", spec.category);
    println!("  kind:     {}", spec.kind);
    if spec.internal {
        println!("  emitted:  no (internal)");
    }
    if let Some(ref doc) = spec.doc {
        println!("  doc:      {}", doc);
    }
}

fn describe_rule(kind: &RuleKind) -> String {
    match kind {
        RuleKind::AnyOf { inputs } => format!("any of {}", inputs.join(", ")),
        RuleKind::AllOf { inputs } => format!("all of {}", inputs.join(", ")),
        RuleKind::Equals { input, value } => format!("{} == {}", input, value),
        RuleKind::CompareAll { conditions } => conditions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" && "),
        RuleKind::Target {
            property: TargetProperty::BigEndian,
        } => "target byte order is big-endian".to_string(),
        RuleKind::Target { property } => property.describe().to_string(),
    }
}

fn describe_invariant(kind: &InvariantKind) -> String {
    match kind {
        InvariantKind::Compare { left, op, right } => format!("{} {} {}", left, op, right),
        InvariantKind::Range { fact, min, max } => {
            let lo = min.map(|m| m.to_string()).unwrap_or_else(|| "..".into());
            let hi = max.map(|m| m.to_string()).unwrap_or_else(|| "..".into());
            format!("{} in [{}, {}]", fact, lo, hi)
        }
        InvariantKind::Implies { fact, requires } => format!("{} implies {}", fact, requires),
        InvariantKind::PointerWidth { fact } => format!("{} * 8 == pointer width", fact),
        InvariantKind::Endianness { fact } => format!("{} matches target byte order", fact),
    }
}

fn describe_condition(when: &TargetCondition) -> String {
    let mut parts = Vec::new();
    if let Some(ref os) = when.os {
        parts.push(format!("os = {}", os));
    }
    if let Some(ref arch) = when.arch {
        parts.push(format!("arch = {}", arch));
    }
    if let Some(ref env) = when.env {
        parts.push(format!("env = {}", env));
    }
    parts.join(", ")
}

/// A registered fact spelled the same apart from case.
fn similar_name<'a>(registry: &'a ProbeRegistry, name: &str) -> Option<&'a str> {
    registry
        .facts()
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
        .map(|spec| spec.name.as_str())
}
