//! Derivation of computed facts.

use crate::core::fact::FactValue;
use crate::core::manifest::Origin;
use crate::core::probe::RawValue;
use crate::core::target::{Endianness, TargetDescriptor};
use crate::registry::{Comparison, DerivationRule, Operand, ProbeRegistry, RuleKind, TargetProperty};
use crate::util::diagnostic::{suggestions, Diagnostic, DiagnosticCode};

use super::coerce::coerce;
use super::{FactTable, ResolvePolicy};

/// Evaluate one rule against the facts resolved so far.
///
/// Undefined boolean inputs of `any_of`/`all_of` count as false unless
/// every input is undefined. Any undefined operand of `equals` or
/// `compare_all` leaves the output undefined.
pub(crate) fn evaluate(
    rule: &DerivationRule,
    target: &TargetDescriptor,
    table: &FactTable<'_>,
) -> Option<FactValue> {
    match &rule.kind {
        RuleKind::AnyOf { inputs } => {
            if inputs.iter().all(|i| table.get(i).is_none()) {
                return None;
            }
            Some(FactValue::Bool(inputs.iter().any(|i| table.is_enabled(i))))
        }
        RuleKind::AllOf { inputs } => {
            if inputs.iter().all(|i| table.get(i).is_none()) {
                return None;
            }
            Some(FactValue::Bool(inputs.iter().all(|i| table.is_enabled(i))))
        }
        RuleKind::Equals { input, value } => {
            table.get(input).map(|v| FactValue::Bool(v == value))
        }
        RuleKind::CompareAll { conditions } => {
            let mut holds = true;
            for cond in conditions {
                holds &= compare(cond, table)?;
            }
            Some(FactValue::Bool(holds))
        }
        RuleKind::Target { property } => match property {
            TargetProperty::PointerBytes => Some(FactValue::Int(target.pointer_bytes())),
            TargetProperty::BigEndian => target
                .endianness
                .map(|e| FactValue::Bool(e == Endianness::Big)),
        },
    }
}

/// `None` if either side is undefined.
pub(crate) fn compare(cond: &Comparison, table: &FactTable<'_>) -> Option<bool> {
    let left = table.get_int(&cond.left)?;
    let right = match &cond.right {
        Operand::Literal(v) => *v,
        Operand::Fact(name) => table.get_int(name)?,
    };
    Some(cond.op.apply(left, right))
}

pub(crate) fn derive_facts(
    registry: &ProbeRegistry,
    target: &TargetDescriptor,
    policy: &ResolvePolicy,
    table: &mut FactTable<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for rule in registry.derivation_rules() {
        let Some(spec) = registry.get(&rule.output) else {
            continue;
        };

        if let Some(ref when) = rule.when {
            if !when.matches(target) {
                table.set(spec, None, Origin::NotApplicable);
                continue;
            }
        }

        let origin = Origin::Derived {
            rule: rule.kind.name(),
        };

        if policy.is_required(rule) {
            let mut missing: Vec<&str> = rule
                .inputs()
                .into_iter()
                .filter(|i| table.get(i).is_none())
                .collect();
            if let RuleKind::Target { property } = rule.kind {
                if !property.is_known(target) {
                    missing.push(property.describe());
                }
            }
            if !missing.is_empty() {
                let mut diag = Diagnostic::error(format!(
                    "required rule has undefined inputs: {}",
                    missing.join(", ")
                ))
                .with_code(DiagnosticCode::DerivationFailed)
                .with_subject(&rule.output);
                for input in &missing {
                    diag = diag.with_context(format!("{} is undefined", input));
                }
                diagnostics.push(diag.with_suggestion(suggestions::MISSING_INPUT));
                table.set(spec, None, origin);
                continue;
            }
        }

        let value = evaluate(rule, target, table);
        tracing::debug!(
            "derived {} = {}",
            rule.output,
            value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "undefined".to_string())
        );
        table.set(spec, value, origin);
    }
}

/// Cross-check raw values the prober reported for derived facts.
pub(crate) fn check_reported(
    registry: &ProbeRegistry,
    reported: &[(&str, &RawValue)],
    table: &FactTable<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for &(name, raw) in reported {
        let Some(spec) = registry.get(name) else {
            continue;
        };
        let normalize = |v: Option<FactValue>| match v {
            Some(FactValue::Bool(false)) => None,
            other => other,
        };

        match coerce(spec, raw) {
            Ok(probed) => {
                let derived = normalize(table.get(name).cloned());
                let probed = normalize(probed);
                if probed != derived {
                    let shown = derived
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "undefined".to_string());
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "probe reported {} but the rule derives {}",
                            raw, shown
                        ))
                        .with_code(DiagnosticCode::InvariantViolation)
                        .with_subject(name),
                    );
                }
            }
            Err(err) => {
                diagnostics.push(
                    Diagnostic::error(format!("{}; ignored", err))
                        .with_code(DiagnosticCode::TypeMismatch)
                        .with_subject(name),
                );
            }
        }
    }
}
