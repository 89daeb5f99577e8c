//! `capgen compile` command

use std::io::Write;

use anyhow::{bail, Context, Result};

use capgen::core::probe::load_probe_file;
use capgen::core::target::{Endianness, TargetDescriptor};
use capgen::ops::compile_target;
use capgen::util::diagnostic::{suggestions, tally};

use super::{current_config, emit_settings, load_registry, report};
use crate::cli::{CompileArgs, GlobalArgs};

pub fn execute(args: CompileArgs, global: &GlobalArgs) -> Result<()> {
    let config = current_config()?;
    let registry = load_registry(args.emit.registry.as_deref(), &config)?;
    let (options, policy) = emit_settings(&args.emit, &config, &registry)?;

    let input = load_probe_file(&args.probes)
        .with_context(|| format!("failed to load probe results from {}", args.probes.display()))?;
    let target = select_target(&args, input.target)?;

    let compilation = compile_target(&registry, &policy, &target, &input.results, &options)?;
    report(compilation.diagnostics(), global);

    let Some(ref bytes) = compilation.output else {
        let (errors, _) = tally(compilation.diagnostics());
        bail!(
            "could not compile manifest for {} due to {} previous error(s)\nhelp: {}",
            target,
            errors,
            suggestions::FAILED_MANIFEST
        );
    };

    match args.output {
        Some(ref path) => std::fs::write(path, bytes)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes).context("failed to write manifest")?;
            stdout.flush()?;
        }
    }

    if args.digest {
        if let Some(digest) = compilation.digest() {
            eprintln!("sha256:{}", digest);
        }
    }

    Ok(())
}

/// The command-line triple wins over one recorded in the probe file;
/// explicit overrides apply to either.
fn select_target(args: &CompileArgs, recorded: Option<TargetDescriptor>) -> Result<TargetDescriptor> {
    let endian = args
        .endian
        .as_deref()
        .map(str::parse::<Endianness>)
        .transpose()?;

    let target = match (args.target.as_deref(), recorded) {
        (Some(triple), _) => {
            TargetDescriptor::with_overrides(triple, args.pointer_width, endian, args.env.as_deref())?
        }
        (None, Some(mut target)) => {
            if let Some(width) = args.pointer_width {
                target = target.with_pointer_width(width)?;
            }
            if let Some(endian) = endian {
                target = target.with_endianness(endian);
            }
            if let Some(ref env) = args.env {
                target.env = Some(env.clone());
            }
            target
        }
        (None, None) => bail!(
            "no target given for {}\n\
             help: pass --target <TRIPLE> or add a [target] table to the probe file",
            args.probes.display()
        ),
    };

    tracing::debug!("target: {}", target.summary());
    Ok(target)
}
