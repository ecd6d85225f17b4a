//! CLI argument parsing.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "manifester",
    version,
    about = "Generate Kubernetes manifests from plain-language requirements",
    after_help = "Examples:\n  manifester generate \"an nginx deployment with 3 replicas\"\n  manifester generate --apply --namespace web \"a redis statefulset\"\n  manifester generate --json --no-cache \"a cronjob that runs every hour\"\n  manifester apply --file manifests.yaml\n  cat manifests.yaml | manifester apply --file -",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Config file (defaults to $MANIFESTER_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Namespace for namespaced resources that declare none
    #[arg(long, short = 'n', global = true, value_name = "NS")]
    pub namespace: Option<String>,

    /// Emit debug logs on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Generate(GenerateArgs),
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
#[command(about = "Generate a manifest and optionally apply it")]
pub struct GenerateArgs {
    /// What the manifest should describe
    #[arg(value_name = "REQUIREMENT", required = true, num_args = 1..)]
    pub requirement: Vec<String>,

    /// Language for comments and prose in the manifest
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Ignore cached completions (results are still cached)
    #[arg(long)]
    pub no_cache: bool,

    /// Do not write the completion to the cache
    #[arg(long)]
    pub no_store: bool,

    /// Apply the generated manifest to the cluster
    #[arg(long)]
    pub apply: bool,

    /// Apply without asking for confirmation
    #[arg(long, short = 'y', requires = "apply")]
    pub yes: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,

    /// Give up on generation after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

impl GenerateArgs {
    pub fn requirement_text(&self) -> String {
        self.requirement.join(" ")
    }
}

#[derive(Args, Debug)]
#[command(about = "Apply an existing manifest stream (YAML or JSON)")]
pub struct ApplyArgs {
    /// Manifest file, or `-` for stdin
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
