//! Defines the command-line arguments and subcommands for the diagcheck CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "diagcheck",
    version,
    about = "Golden-file conformance harness for compiler diagnostics."
)]
pub struct DiagcheckArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Print every fixture, not only failing ones.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check fixtures against the analyzer's diagnostics.
    Run(RunArgs),
    /// Rewrite failing fixtures with the analyzer's diagnostics.
    Update(RunArgs),
    /// Generate or check the test registry.
    Registry {
        #[command(subcommand)]
        action: RegistryCommand,
    },
    /// List the fixtures of the corpus with their test identifiers.
    List {
        /// Only fixtures whose relative path starts with one of these.
        prefixes: Vec<String>,
        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum RegistryCommand {
    /// Write the registry for the current corpus.
    Generate {
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Where to write the registry (defaults to the configured registry).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Report fixtures missing from the registry and entries without a fixture.
    Check {
        /// Limit the check to these path prefixes.
        prefixes: Vec<String>,
        #[command(flatten)]
        corpus: CorpusArgs,
        /// Registry to check against.
        #[arg(long)]
        registry: Option<PathBuf>,
    },
}

/// Options locating the corpus, shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct CorpusArgs {
    /// Configuration file (defaults to ./diagcheck.yaml when present).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Corpus root directory.
    #[arg(long)]
    pub root: Option<PathBuf>,
    /// Fixture file extension.
    #[arg(long)]
    pub ext: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Only fixtures whose relative path starts with one of these.
    pub prefixes: Vec<String>,
    #[command(flatten)]
    pub corpus: CorpusArgs,
    /// Registry to check completeness against.
    #[arg(long)]
    pub registry: Option<PathBuf>,
    /// Number of worker threads.
    #[arg(long, short)]
    pub jobs: Option<usize>,
    /// Per-fixture analysis timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Stop starting new fixtures after the first failure.
    #[arg(long)]
    pub fail_fast: bool,
    /// Analyzer command and its arguments.
    #[arg(last = true)]
    pub analyzer: Vec<String>,
}
