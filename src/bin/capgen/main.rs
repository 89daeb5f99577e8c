//! capgen CLI - A deterministic platform capability manifest compiler

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("capgen=debug")
    } else {
        EnvFilter::new("capgen=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let global = cli::GlobalArgs {
        verbose: cli.verbose,
        color: !cli.no_color && std::io::stderr().is_terminal(),
    };

    // Execute command
    match cli.command {
        Commands::Compile(args) => commands::compile::execute(args, &global),
        Commands::Batch(args) => commands::batch::execute(args, &global),
        Commands::Explain(args) => commands::explain::execute(args),
        Commands::Registry(args) => commands::registry::execute(args, &global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
