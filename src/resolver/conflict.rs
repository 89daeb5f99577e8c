//! Conflict group resolution.
//!
//! A group with more than one enabled member keeps the member the group's
//! precedence ranks above every other enabled member. If no such member
//! exists the group fails closed: every enabled member is disabled and an
//! error is recorded.

use crate::core::fact::FactValue;
use crate::core::manifest::Origin;
use crate::registry::{ConflictGroup, ProbeRegistry};
use crate::util::diagnostic::{suggestions, Diagnostic, DiagnosticCode};

use super::FactTable;

/// The member of `enabled` preferred over all the others, if any.
pub fn select_winner<'g>(group: &ConflictGroup, enabled: &[&'g str]) -> Option<&'g str> {
    enabled.iter().copied().find(|&candidate| {
        enabled
            .iter()
            .all(|&other| other == candidate || group.prefers(candidate, other))
    })
}

pub(crate) fn resolve_conflicts(
    registry: &ProbeRegistry,
    table: &mut FactTable<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for group in registry.conflict_groups() {
        let enabled: Vec<&str> = group
            .members
            .iter()
            .map(String::as_str)
            .filter(|m| table.is_enabled(m))
            .collect();
        if enabled.len() < 2 {
            continue;
        }

        let winner = select_winner(group, &enabled);
        match winner {
            Some(winner) => {
                tracing::debug!(
                    "conflict group `{}`: `{}` wins over {}",
                    group.name,
                    winner,
                    enabled.len() - 1
                );
            }
            None => {
                let listed = enabled
                    .iter()
                    .map(|m| format!("`{}`", m))
                    .collect::<Vec<_>>()
                    .join(", ");
                diagnostics.push(
                    Diagnostic::error(format!(
                        "{} are mutually exclusive and no precedence breaks the tie; all disabled",
                        listed
                    ))
                    .with_code(DiagnosticCode::UnresolvedConflict)
                    .with_subject(&group.name)
                    .with_suggestion(suggestions::UNRESOLVED_CONFLICT),
                );
            }
        }

        for member in enabled.iter().filter(|&&m| Some(m) != winner) {
            if let Some(spec) = table.spec(member) {
                table.set(
                    spec,
                    Some(FactValue::Bool(false)),
                    Origin::Suppressed {
                        group: group.name.clone(),
                        winner: winner.map(str::to_string),
                    },
                );
            }
        }
    }
}
