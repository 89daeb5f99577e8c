//! Consistency resolution.
//!
//! Turns one target's raw probe results into a closed, consistent
//! [`ResolvedManifest`]. Resolution is pure and deterministic: it never
//! touches the filesystem, and every pass walks facts in registry or
//! sorted-name order so the manifest and diagnostics are byte-identical
//! across runs.
//!
//! Passes, in order:
//! 1. schema validation and type coercion ([`coerce`])
//! 2. conflict group resolution ([`conflict`])
//! 3. derivation in topological order ([`derive`]), then a cross-check
//!    of any derived values the prober reported
//! 4. cross-fact invariant checks ([`invariant`])

pub mod coerce;
pub mod conflict;
pub mod derive;
pub mod invariant;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::fact::{FactKind, FactSpec, FactValue};
use crate::core::manifest::{Origin, ResolutionStatus, ResolvedManifest};
use crate::core::probe::ProbeResults;
use crate::core::target::TargetDescriptor;
use crate::registry::{DerivationRule, ProbeRegistry, RegistryError};
use crate::util::diagnostic::Diagnostic;

/// Which derivation rules are required rather than advisory.
///
/// The registry declares a default for each rule; a policy overrides it
/// by derived fact name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvePolicy {
    /// Rules to treat as required
    pub required: BTreeSet<String>,
    /// Rules to treat as advisory
    pub advisory: BTreeSet<String>,
}

impl ResolvePolicy {
    pub fn require(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.advisory.remove(&name);
        self.required.insert(name);
        self
    }

    pub fn relax(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.required.remove(&name);
        self.advisory.insert(name);
        self
    }

    pub fn is_required(&self, rule: &DerivationRule) -> bool {
        if self.advisory.contains(&rule.output) {
            false
        } else {
            rule.required || self.required.contains(&rule.output)
        }
    }

    /// Check that every named fact is a derived fact of `registry`.
    pub fn validate(&self, registry: &ProbeRegistry) -> Result<(), RegistryError> {
        for name in self.required.iter().chain(&self.advisory) {
            if !registry.lookup(name)?.is_derived() {
                return Err(RegistryError::NotDerived { name: name.clone() });
            }
        }
        Ok(())
    }
}

/// The outcome of resolving one target.
#[derive(Debug, Clone)]
pub struct Resolution<'r> {
    pub manifest: ResolvedManifest<'r>,
    /// In the order problems were found
    pub diagnostics: Vec<Diagnostic>,
}

impl<'r> Resolution<'r> {
    pub fn is_success(&self) -> bool {
        self.manifest.is_success()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// Resolves raw probe results against one registry.
///
/// Holds no per-target state, so one resolver can serve any number of
/// targets, from any number of threads.
#[derive(Debug, Clone)]
pub struct Resolver<'r> {
    registry: &'r ProbeRegistry,
    policy: ResolvePolicy,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r ProbeRegistry) -> Self {
        Resolver {
            registry,
            policy: ResolvePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &'r ProbeRegistry {
        self.registry
    }

    pub fn policy(&self) -> &ResolvePolicy {
        &self.policy
    }

    /// Resolve one target. Always returns a manifest; check its status
    /// before using it.
    pub fn resolve(&self, target: &TargetDescriptor, raw: &ProbeResults) -> Resolution<'r> {
        tracing::debug!("resolving {} raw results for {}", raw.len(), target);

        let mut table = FactTable::new(self.registry);
        let mut diagnostics = Vec::new();

        let reported = coerce::ingest(self.registry, raw, &mut table, &mut diagnostics);
        conflict::resolve_conflicts(self.registry, &mut table, &mut diagnostics);
        derive::derive_facts(self.registry, target, &self.policy, &mut table, &mut diagnostics);
        derive::check_reported(self.registry, &reported, &table, &mut diagnostics);
        invariant::check_invariants(self.registry, target, &table, &mut diagnostics);

        let status = if diagnostics.iter().any(Diagnostic::is_error) {
            ResolutionStatus::Failed
        } else {
            ResolutionStatus::Success
        };
        tracing::debug!(
            "resolved {}: {} ({} diagnostics)",
            target,
            status,
            diagnostics.len()
        );

        let (values, origins) = table.into_parts();
        Resolution {
            manifest: ResolvedManifest::new(
                self.registry,
                target.clone(),
                values,
                origins,
                status,
            ),
            diagnostics,
        }
    }
}

/// Working state of one resolution, indexed by registry position.
///
/// Unlike the finished manifest, `Some(Bool(false))` ("probed absent") is
/// kept distinct from `None` ("unknown") here, since derivation treats
/// the two differently.
#[derive(Debug)]
pub(crate) struct FactTable<'r> {
    registry: &'r ProbeRegistry,
    values: Vec<Option<FactValue>>,
    origins: Vec<Origin>,
}

impl<'r> FactTable<'r> {
    fn new(registry: &'r ProbeRegistry) -> Self {
        let origins = registry
            .facts()
            .iter()
            .map(|spec| match spec.kind {
                FactKind::Undefined => Origin::AlwaysUndefined,
                _ => Origin::NotProbed,
            })
            .collect();
        FactTable {
            registry,
            values: vec![None; registry.len()],
            origins,
        }
    }

    pub(crate) fn spec(&self, name: &str) -> Option<&'r FactSpec> {
        self.registry.get(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&FactValue> {
        self.spec(name)
            .and_then(|spec| self.values[spec.index].as_ref())
    }

    pub(crate) fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FactValue::as_int)
    }

    pub(crate) fn is_enabled(&self, name: &str) -> bool {
        matches!(self.get(name), Some(FactValue::Bool(true)))
    }

    pub(crate) fn set(&mut self, spec: &FactSpec, value: Option<FactValue>, origin: Origin) {
        self.values[spec.index] = value;
        self.origins[spec.index] = origin;
    }

    fn into_parts(self) -> (Vec<Option<FactValue>>, Vec<Origin>) {
        (self.values, self.origins)
    }
}
