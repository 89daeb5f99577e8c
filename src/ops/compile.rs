//! Resolve-and-render for one or many targets.
//!
//! Each target is an independent invocation over the shared, read-only
//! registry. Batches fan out with rayon; results come back in input order.

use rayon::prelude::*;

use crate::core::probe::ProbeResults;
use crate::core::target::TargetDescriptor;
use crate::emitter::{emit, EmitError, EmitOptions};
use crate::registry::ProbeRegistry;
use crate::resolver::{Resolution, ResolvePolicy, Resolver};
use crate::util::diagnostic::Diagnostic;
use crate::util::hash::sha256_bytes;

/// One target's probe results, ready to compile.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub target: TargetDescriptor,
    pub probes: ProbeResults,
}

impl CompileJob {
    pub fn new(target: TargetDescriptor, probes: ProbeResults) -> Self {
        CompileJob { target, probes }
    }
}

/// The outcome of compiling one target.
#[derive(Debug)]
pub struct Compilation<'r> {
    pub resolution: Resolution<'r>,
    /// Rendered manifest; `None` when resolution failed
    pub output: Option<Vec<u8>>,
}

impl<'r> Compilation<'r> {
    pub fn is_success(&self) -> bool {
        self.output.is_some()
    }

    pub fn target(&self) -> &TargetDescriptor {
        self.resolution.manifest.target()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.resolution.diagnostics
    }

    /// SHA-256 of the rendered bytes.
    pub fn digest(&self) -> Option<String> {
        self.output.as_deref().map(sha256_bytes)
    }
}

/// Resolve one target and render it if resolution succeeded.
///
/// Data problems land in the resolution's diagnostics; only a rendering
/// failure is an `Err`.
pub fn compile_target<'r>(
    registry: &'r ProbeRegistry,
    policy: &ResolvePolicy,
    target: &TargetDescriptor,
    probes: &ProbeResults,
    options: &EmitOptions,
) -> Result<Compilation<'r>, EmitError> {
    let resolver = Resolver::new(registry).with_policy(policy.clone());
    let resolution = resolver.resolve(target, probes);

    let output = if resolution.is_success() {
        Some(emit(&resolution.manifest, options)?)
    } else {
        None
    };

    tracing::info!(
        "compiled {} ({} diagnostics, {})",
        target,
        resolution.diagnostics.len(),
        resolution.manifest.status()
    );

    Ok(Compilation { resolution, output })
}

/// Compile every job in parallel.
pub fn compile_batch<'r>(
    registry: &'r ProbeRegistry,
    policy: &ResolvePolicy,
    jobs: &[CompileJob],
    options: &EmitOptions,
) -> Vec<Result<Compilation<'r>, EmitError>> {
    compile_batch_with_progress(registry, policy, jobs, options, || {})
}

/// Like [`compile_batch`], calling `on_done` as each job finishes.
pub fn compile_batch_with_progress<'r, F>(
    registry: &'r ProbeRegistry,
    policy: &ResolvePolicy,
    jobs: &[CompileJob],
    options: &EmitOptions,
    on_done: F,
) -> Vec<Result<Compilation<'r>, EmitError>>
where
    F: Fn() + Sync,
{
    jobs.par_iter()
        .map(|job| {
            let result = compile_target(registry, policy, &job.target, &job.probes, options);
            on_done();
            result
        })
        .collect()
}
