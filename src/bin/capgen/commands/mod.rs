//! Command implementations

pub mod batch;
pub mod compile;
pub mod completions;
pub mod explain;
pub mod registry;

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};

use capgen::util::config::{global_config_path, load_config, project_config_path, Config};
use capgen::util::diagnostic::{self, Diagnostic};
use capgen::{EmitOptions, ProbeRegistry, ResolvePolicy};

use crate::cli::{EmitArgs, GlobalArgs, PolicyArgs};

/// Global config merged with the project config in the working directory.
pub fn current_config() -> Result<Config> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    Ok(load_config(
        global_config_path().as_deref(),
        &project_config_path(&cwd),
    ))
}

/// The registry named on the command line, else in config, else the
/// builtin one.
pub fn load_registry(path: Option<&Path>, config: &Config) -> Result<Cow<'static, ProbeRegistry>> {
    match path.or(config.registry.path.as_deref()) {
        Some(path) => {
            let registry = ProbeRegistry::load(path)
                .with_context(|| format!("failed to load registry from {}", path.display()))?;
            Ok(Cow::Owned(registry))
        }
        None => Ok(Cow::Borrowed(ProbeRegistry::builtin()?)),
    }
}

/// Emit options and policy from config, overridden by flags.
pub fn emit_settings(
    args: &EmitArgs,
    config: &Config,
    registry: &ProbeRegistry,
) -> Result<(EmitOptions, ResolvePolicy)> {
    let mut options = config.emit_options();
    if let Some(format) = args.format {
        options.format = format.into();
    }
    if let Some(ref guard) = args.guard {
        options.guard = Some(guard.clone());
    }
    if args.no_comments {
        options.comments = false;
    }

    let policy = resolve_policy(&args.policy, config, registry)?;
    Ok((options, policy))
}

/// Policy from config, overridden by `--require`/`--advisory`.
pub fn resolve_policy(
    args: &PolicyArgs,
    config: &Config,
    registry: &ProbeRegistry,
) -> Result<ResolvePolicy> {
    let mut policy = config.policy();
    for name in &args.require {
        policy = policy.require(name.clone());
    }
    for name in &args.advisory {
        policy = policy.relax(name.clone());
    }
    policy.validate(registry).context("invalid resolve policy")?;
    Ok(policy)
}

/// Print every diagnostic to stderr, one per line unless verbose.
pub fn report(diagnostics: &[Diagnostic], global: &GlobalArgs) {
    for diag in diagnostics {
        diagnostic::emit(diag, global.verbose, global.color);
    }
}
