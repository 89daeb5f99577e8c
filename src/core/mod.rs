//! Core data structures for capgen.
//!
//! - Fact schema and values
//! - Target descriptors
//! - Raw probe input and its encodings
//! - Resolved manifests

pub mod fact;
pub mod manifest;
pub mod probe;
pub mod target;

pub use fact::{Category, FactKind, FactSpec, FactValue};
pub use manifest::{ManifestEntry, Origin, ResolutionStatus, ResolvedManifest};
pub use probe::{ProbeInput, ProbeResults, RawValue};
pub use target::{Endianness, TargetDescriptor};
