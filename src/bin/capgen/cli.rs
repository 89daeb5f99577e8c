//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use capgen::ManifestFormat;

/// capgen - Compile raw platform probe results into a configuration manifest
#[derive(Parser)]
#[command(name = "capgen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command.
pub struct GlobalArgs {
    pub verbose: bool,
    pub color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve one target's probe results and print its manifest
    Compile(CompileArgs),

    /// Compile many targets in parallel, one manifest file each
    Batch(BatchArgs),

    /// Show what the registry knows about a fact
    Explain(ExplainArgs),

    /// List or validate a probe registry
    Registry(RegistryArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Header,
    Json,
}

impl From<FormatArg> for ManifestFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Header => ManifestFormat::Header,
            FormatArg::Json => ManifestFormat::Json,
        }
    }
}

/// Rendering and policy flags shared by `compile` and `batch`.
#[derive(Args)]
pub struct EmitArgs {
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Include guard macro
    #[arg(long)]
    pub guard: Option<String>,

    /// Omit per-fact doc comments
    #[arg(long)]
    pub no_comments: bool,

    /// Alternate registry catalog (TOML)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Required/advisory overrides for derivation rules.
#[derive(Args)]
pub struct PolicyArgs {
    /// Treat the rule for this derived fact as required
    #[arg(long = "require", value_name = "FACT")]
    pub require: Vec<String>,

    /// Treat the rule for this derived fact as advisory
    #[arg(long = "advisory", value_name = "FACT")]
    pub advisory: Vec<String>,
}

#[derive(Args)]
pub struct CompileArgs {
    /// Probe results (.toml, .json, .h, or text records)
    pub probes: PathBuf,

    /// Target triple (overrides a [target] table in the probe file)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Pointer width in bits
    #[arg(long, value_name = "BITS")]
    pub pointer_width: Option<u32>,

    /// Byte order (little, big)
    #[arg(long)]
    pub endian: Option<String>,

    /// Environment / libc component
    #[arg(long)]
    pub env: Option<String>,

    /// Write the manifest here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the SHA-256 of the rendered manifest to stderr
    #[arg(long)]
    pub digest: bool,

    #[command(flatten)]
    pub emit: EmitArgs,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Glob patterns selecting TOML/JSON probe files with a [target] table
    #[arg(required = true)]
    pub patterns: Vec<String>,

    /// Directory to write `<triple>.h` manifests into
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    #[command(flatten)]
    pub emit: EmitArgs,
}

#[derive(Args)]
pub struct ExplainArgs {
    /// Fact to explain
    pub fact: String,

    /// Alternate registry catalog (TOML)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

#[derive(Args)]
pub struct RegistryArgs {
    /// Catalog file (defaults to the builtin registry)
    pub path: Option<PathBuf>,

    /// Validate only; print a summary instead of the fact list
    #[arg(long)]
    pub check: bool,

    /// Only list facts in this category
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
