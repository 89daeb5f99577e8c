//! `capgen registry` command

use std::borrow::Cow;

use anyhow::{anyhow, bail, Result};

use capgen::core::fact::{Category, FactKind};
use capgen::util::diagnostic;
use capgen::ProbeRegistry;

use super::{current_config, load_registry};
use crate::cli::{GlobalArgs, RegistryArgs};

pub fn execute(args: RegistryArgs, global: &GlobalArgs) -> Result<()> {
    let registry = match args.path {
        Some(ref path) => match ProbeRegistry::load(path) {
            Ok(registry) => Cow::Owned(registry),
            Err(err) => {
                let diag = err.to_diagnostic().with_location(path);
                diagnostic::emit(&diag, global.verbose, global.color);
                bail!("{} is not a valid registry", path.display());
            }
        },
        None => load_registry(None, &current_config()?)?,
    };

    if args.check {
        println!(
            "ok: schema {}, {} facts, {} conflict groups, {} rules, {} invariants",
            registry.schema(),
            registry.len(),
            registry.conflict_groups().len(),
            registry.derivation_rules().len(),
            registry.invariants().len()
        );
        return Ok(());
    }

    let only = args
        .category
        .as_deref()
        .map(str::parse::<Category>)
        .transpose()
        .map_err(|e| anyhow!(e))?;

    for category in Category::ALL {
        if only.is_some_and(|c| c != category) {
            continue;
        }
        let facts: Vec<_> = registry
            .facts()
            .iter()
            .filter(|f| f.category == category)
            .collect();
        if facts.is_empty() {
            continue;
        }

        println!("{} ({})", category.title(), facts.len());
        for spec in facts {
            let mut notes = Vec::new();
            if spec.kind != FactKind::Boolean {
                notes.push(spec.kind.to_string());
            }
            if spec.internal {
                notes.push("internal".to_string());
            }
            if notes.is_empty() {
                println!("  {}", spec.name);
            } else {
                println!("  {} ({})", spec.name, notes.join(", "));
            }
        }
    }

    Ok(())
}
