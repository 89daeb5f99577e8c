//! The resolved, immutable fact set for one target.

use std::fmt;

use serde::Serialize;

use crate::core::fact::{FactSpec, FactValue};
use crate::core::target::TargetDescriptor;
use crate::registry::ProbeRegistry;
use crate::util::hash::Fingerprint;

/// Overall outcome of one resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Success,
    /// At least one error diagnostic was recorded. The manifest is kept
    /// for inspection but must not be emitted.
    Failed,
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStatus::Success => write!(f, "success"),
            ResolutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// How a fact arrived at its final value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "origin", rename_all = "kebab-case")]
pub enum Origin {
    /// No raw value, or explicitly not probed
    NotProbed,
    /// Raw value accepted as given
    Probed,
    /// Raw value did not fit the fact's kind
    Rejected,
    /// Disabled by a conflict group; `winner` is absent when the group
    /// could not be tie-broken
    Suppressed {
        group: String,
        winner: Option<String>,
    },
    /// Computed by the fact's derivation rule
    Derived { rule: &'static str },
    /// The derivation rule does not apply to this target
    NotApplicable,
    /// Kind is `undefined`; never carries a value
    AlwaysUndefined,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::NotProbed => write!(f, "not probed"),
            Origin::Probed => write!(f, "probed"),
            Origin::Rejected => write!(f, "rejected raw value"),
            Origin::Suppressed {
                group,
                winner: Some(winner),
            } => write!(f, "suppressed by `{}` in conflict group `{}`", winner, group),
            Origin::Suppressed { group, winner: None } => {
                write!(f, "suppressed by unresolved conflict group `{}`", group)
            }
            Origin::Derived { rule } => write!(f, "derived ({})", rule),
            Origin::NotApplicable => write!(f, "rule does not apply to this target"),
            Origin::AlwaysUndefined => write!(f, "always undefined"),
        }
    }
}

/// One fact of a resolved manifest.
#[derive(Debug, Clone, Copy)]
pub struct ManifestEntry<'m> {
    pub spec: &'m FactSpec,
    pub value: Option<&'m FactValue>,
    pub origin: &'m Origin,
}

impl<'m> ManifestEntry<'m> {
    pub fn name(&self) -> &'m str {
        &self.spec.name
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }

    /// True for a boolean fact resolved present.
    pub fn is_enabled(&self) -> bool {
        matches!(self.value, Some(FactValue::Bool(true)))
    }
}

/// Final mapping from fact to value for one target.
///
/// Boolean facts resolved `false` are stored as undefined: the two are
/// indistinguishable to a consumer, and keeping one representation makes
/// equal manifests compare equal.
#[derive(Debug, Clone)]
pub struct ResolvedManifest<'r> {
    registry: &'r ProbeRegistry,
    target: TargetDescriptor,
    /// Indexed by registry declaration position
    values: Vec<Option<FactValue>>,
    origins: Vec<Origin>,
    status: ResolutionStatus,
}

impl<'r> ResolvedManifest<'r> {
    pub(crate) fn new(
        registry: &'r ProbeRegistry,
        target: TargetDescriptor,
        values: Vec<Option<FactValue>>,
        origins: Vec<Origin>,
        status: ResolutionStatus,
    ) -> Self {
        debug_assert_eq!(values.len(), registry.len());
        debug_assert_eq!(origins.len(), registry.len());
        let values = values
            .into_iter()
            .map(|v| match v {
                Some(FactValue::Bool(false)) => None,
                other => other,
            })
            .collect();
        ResolvedManifest {
            registry,
            target,
            values,
            origins,
            status,
        }
    }

    pub fn registry(&self) -> &'r ProbeRegistry {
        self.registry
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    pub fn status(&self) -> ResolutionStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == ResolutionStatus::Success
    }

    fn entry(&self, spec: &'r FactSpec) -> ManifestEntry<'_> {
        ManifestEntry {
            spec,
            value: self.values[spec.index].as_ref(),
            origin: &self.origins[spec.index],
        }
    }

    pub fn get(&self, name: &str) -> Option<ManifestEntry<'_>> {
        self.registry.get(name).map(|spec| self.entry(spec))
    }

    pub fn value(&self, name: &str) -> Option<&FactValue> {
        self.registry
            .get(name)
            .and_then(|spec| self.values[spec.index].as_ref())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        matches!(self.value(name), Some(FactValue::Bool(true)))
    }

    /// Every fact, including internal ones, in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry<'_>> {
        self.registry.facts().iter().map(move |spec| self.entry(spec))
    }

    /// Facts that belong in an emitted manifest, in canonical order.
    pub fn emitted(&self) -> impl Iterator<Item = ManifestEntry<'_>> {
        self.registry.emission_order().map(move |spec| self.entry(spec))
    }

    pub fn defined(&self) -> impl Iterator<Item = ManifestEntry<'_>> {
        self.entries().filter(|e| e.is_defined())
    }

    /// Names of facts explicitly left undefined.
    pub fn undefined(&self) -> impl Iterator<Item = &str> {
        self.entries()
            .filter(|e| !e.is_defined())
            .map(|e| e.spec.name.as_str())
    }

    /// Names of facts whose values differ between two manifests resolved
    /// against the same registry.
    pub fn diff<'a>(&'a self, other: &ResolvedManifest<'_>) -> Vec<&'a str> {
        self.registry
            .facts()
            .iter()
            .filter(|spec| other.value(&spec.name) != self.values[spec.index].as_ref())
            .map(|spec| spec.name.as_str())
            .collect()
    }

    /// Stable digest of the emitted facts and their values.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        for entry in self.emitted() {
            fp.update_str(entry.name());
            match entry.value {
                None => {
                    fp.update_opt(None);
                }
                Some(FactValue::Bool(b)) => {
                    fp.update_str("bool").update_bool(*b);
                }
                Some(FactValue::Int(i)) => {
                    fp.update_str("int").update_i64(*i);
                }
                Some(FactValue::Str(s)) => {
                    fp.update_str("str").update_str(s);
                }
            }
        }
        fp.finish_short()
    }
}

impl PartialEq for ResolvedManifest<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.registry, other.registry)
            && self.target == other.target
            && self.values == other.values
            && self.status == other.status
    }
}
