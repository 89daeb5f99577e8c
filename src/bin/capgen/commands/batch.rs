//! `capgen batch` command
//!
//! Compiles every matching probe file as an independent target and writes
//! one manifest per target triple.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use capgen::core::probe::load_probe_file;
use capgen::ops::{compile_batch_with_progress, CompileJob};
use capgen::ManifestFormat;

use super::{current_config, emit_settings, load_registry, report};
use crate::cli::{BatchArgs, GlobalArgs};

pub fn execute(args: BatchArgs, global: &GlobalArgs) -> Result<()> {
    let start = Instant::now();
    let config = current_config()?;
    let registry = load_registry(args.emit.registry.as_deref(), &config)?;
    let (options, policy) = emit_settings(&args.emit, &config, &registry)?;

    if let Some(j) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(j)
            .build_global()
            .ok(); // Ignore if already set
    }

    let paths = collect_paths(&args.patterns)?;

    // Triple -> file, to refuse two files writing the same manifest
    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut jobs = Vec::with_capacity(paths.len());
    for path in &paths {
        let input = load_probe_file(path)
            .with_context(|| format!("failed to load probe results from {}", path.display()))?;
        let target = input.target.ok_or_else(|| {
            anyhow!(
                "{} has no [target] table\n\
                 help: batch inputs must record their target triple",
                path.display()
            )
        })?;
        if let Some(other) = seen.insert(target.triple.clone(), path.clone()) {
            bail!(
                "{} and {} both describe target {}",
                other.display(),
                path.display(),
                target
            );
        }
        jobs.push(CompileJob::new(target, input.results));
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let pb = if !global.verbose && jobs.len() > 1 {
        let pb = ProgressBar::new(jobs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let results = compile_batch_with_progress(&registry, &policy, &jobs, &options, || {
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
    });

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let extension = match options.format {
        ManifestFormat::Header => "h",
        ManifestFormat::Json => "json",
    };

    let mut failed = Vec::new();
    for result in results {
        let compilation = result?;
        report(compilation.diagnostics(), global);

        let triple = &compilation.target().triple;
        match compilation.output {
            Some(ref bytes) => {
                let file = args.out_dir.join(format!("{}.{}", triple, extension));
                std::fs::write(&file, bytes)
                    .with_context(|| format!("failed to write {}", file.display()))?;
                tracing::info!("wrote {}", file.display());
            }
            None => failed.push(triple.clone()),
        }
    }

    eprintln!(
        "    Finished {} target(s) in {:.2}s",
        jobs.len() - failed.len(),
        start.elapsed().as_secs_f64()
    );

    if !failed.is_empty() {
        bail!(
            "{} of {} target(s) failed: {}",
            failed.len(),
            jobs.len(),
            failed.join(", ")
        );
    }

    Ok(())
}

fn collect_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let entries =
            glob::glob(pattern).with_context(|| format!("invalid glob pattern `{}`", pattern))?;
        for entry in entries {
            paths.push(entry?);
        }
    }
    paths.sort();
    paths.dedup();

    if paths.is_empty() {
        bail!("no probe files match {}", patterns.join(" "));
    }
    Ok(paths)
}
