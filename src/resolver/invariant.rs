//! Post-resolution sanity invariants.
//!
//! An invariant with an undefined operand is skipped: missing data is
//! reported by the passes that own it, not here.

use crate::core::fact::FactValue;
use crate::core::target::{Endianness, TargetDescriptor};
use crate::registry::{Comparison, Invariant, InvariantKind, ProbeRegistry};
use crate::util::diagnostic::{Diagnostic, DiagnosticCode};

use super::derive::compare;
use super::FactTable;

/// Outcome of checking one invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Holds,
    /// Some operand is undefined, or the target does not match
    Skipped,
    Violated(String),
}

pub(crate) fn check(
    invariant: &Invariant,
    target: &TargetDescriptor,
    table: &FactTable<'_>,
) -> Check {
    if let Some(ref when) = invariant.when {
        if !when.matches(target) {
            return Check::Skipped;
        }
    }

    match &invariant.kind {
        InvariantKind::Compare { left, op, right } => {
            let cond = Comparison {
                left: left.clone(),
                op: *op,
                right: right.clone(),
            };
            match compare(&cond, table) {
                None => Check::Skipped,
                Some(true) => Check::Holds,
                Some(false) => {
                    let rhs = right
                        .fact()
                        .and_then(|r| table.get_int(r))
                        .map(|v| format!(" ({})", v))
                        .unwrap_or_default();
                    Check::Violated(format!(
                        "{} ({}) {} {}{} does not hold",
                        left,
                        table.get_int(left).unwrap_or_default(),
                        op,
                        right,
                        rhs
                    ))
                }
            }
        }
        InvariantKind::Range { fact, min, max } => {
            let Some(v) = table.get_int(fact) else {
                return Check::Skipped;
            };
            if min.is_some_and(|m| v < m) || max.is_some_and(|m| v > m) {
                let bound = match (min, max) {
                    (Some(lo), Some(hi)) => format!("[{}, {}]", lo, hi),
                    (Some(lo), None) => format!(">= {}", lo),
                    (None, Some(hi)) => format!("<= {}", hi),
                    (None, None) => String::new(),
                };
                Check::Violated(format!("{} = {} is outside {}", fact, v, bound))
            } else {
                Check::Holds
            }
        }
        InvariantKind::Implies { fact, requires } => {
            match (table.get(fact), table.get(requires)) {
                (None, _) | (_, None) => Check::Skipped,
                (Some(FactValue::Bool(true)), Some(req)) if *req != FactValue::Bool(true) => {
                    Check::Violated(format!("{} is enabled but {} is not", fact, requires))
                }
                _ => Check::Holds,
            }
        }
        InvariantKind::PointerWidth { fact } => {
            let Some(bytes) = table.get_int(fact) else {
                return Check::Skipped;
            };
            if bytes * 8 == i64::from(target.pointer_width) {
                Check::Holds
            } else {
                Check::Violated(format!(
                    "{} = {} disagrees with the {}-bit pointer width of {}",
                    fact, bytes, target.pointer_width, target
                ))
            }
        }
        InvariantKind::Endianness { fact } => {
            let Some(value) = table.get(fact).and_then(FactValue::as_str) else {
                return Check::Skipped;
            };
            let Some(declared) = target.endianness else {
                return Check::Skipped;
            };
            match value.parse::<Endianness>() {
                Ok(probed) if probed == declared => Check::Holds,
                Ok(probed) => Check::Violated(format!(
                    "{} reports {}-endian but {} is {}-endian",
                    fact, probed, target, declared
                )),
                Err(_) => Check::Violated(format!("{} = {:?} is not a byte order", fact, value)),
            }
        }
    }
}

pub(crate) fn check_invariants(
    registry: &ProbeRegistry,
    target: &TargetDescriptor,
    table: &FactTable<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for invariant in registry.invariants() {
        match check(invariant, target, table) {
            Check::Holds => {}
            Check::Skipped => {
                tracing::debug!("invariant `{}` skipped", invariant.name);
            }
            Check::Violated(message) => {
                let subject = invariant
                    .kind
                    .facts()
                    .first()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| invariant.name.clone());
                diagnostics.push(
                    Diagnostic::error(message)
                        .with_code(DiagnosticCode::InvariantViolation)
                        .with_subject(subject)
                        .with_context(format!("invariant `{}`", invariant.name)),
                );
            }
        }
    }
}
