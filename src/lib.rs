//! capgen - A deterministic platform capability manifest compiler
//!
//! This crate turns raw per-target probe results into one consistent
//! configuration manifest: facts are looked up in the probe registry,
//! coerced, de-conflicted, derived and checked by the resolver, then
//! rendered by the emitter.

pub mod core;
pub mod emitter;
pub mod ops;
pub mod registry;
pub mod resolver;
pub mod util;

/// Test fixtures for capgen unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides the recorded iOS simulator probe set and
/// small builders for probe results.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{
    fact::{Category, FactKind, FactSpec, FactValue},
    manifest::{ResolutionStatus, ResolvedManifest},
    probe::{ProbeResults, RawValue},
    target::TargetDescriptor,
};

pub use emitter::{emit, EmitOptions, ManifestFormat};
pub use registry::ProbeRegistry;
pub use resolver::{Resolution, ResolvePolicy, Resolver};
