//! Shared fixtures for capgen unit tests.
//!
//! The main fixture is a full set of probe results recorded for an iOS
//! simulator target, stored as a replayable header under
//! `tests/fixtures/`.

use crate::core::probe::{parse_header, ProbeResults, RawValue};
use crate::core::target::TargetDescriptor;
use crate::registry::ProbeRegistry;

/// Probe results for `x86_64-apple-ios-simulator`, as a header.
pub const IOS_SIMULATOR_HEADER: &str =
    include_str!("../../tests/fixtures/x86_64-apple-ios-simulator.h");

pub const IOS_SIMULATOR_TRIPLE: &str = "x86_64-apple-ios-simulator";

/// The same target's header as configure generated it, conditional
/// blocks included.
pub const GENERATED_HEADER: &str = include_str!("../../tests/fixtures/pyconfig-x86_64.h");

pub fn builtin() -> &'static ProbeRegistry {
    ProbeRegistry::builtin().unwrap()
}

pub fn ios_simulator_target() -> TargetDescriptor {
    TargetDescriptor::from_triple(IOS_SIMULATOR_TRIPLE).unwrap()
}

/// Every probe recorded for the iOS simulator, including the values of
/// derived facts the recording happened to contain.
pub fn ios_simulator_probes() -> ProbeResults {
    parse_header(IOS_SIMULATOR_HEADER).unwrap()
}

/// The iOS simulator probes with derived facts stripped, as a prober
/// that only reports primitive facts would send them.
pub fn ios_simulator_primitives() -> ProbeResults {
    let registry = builtin();
    ios_simulator_probes()
        .iter()
        .filter(|(name, _)| !registry.get(name).is_some_and(|spec| spec.is_derived()))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Probe results from `(name, value)` pairs.
pub fn probes<'a>(pairs: impl IntoIterator<Item = (&'a str, RawValue)>) -> ProbeResults {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
