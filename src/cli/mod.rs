//! The diagcheck command-line interface.
//!
//! This module is the entry point for all CLI commands and orchestrates the
//! library: it layers the configuration, builds the analyzer, runs the harness
//! and maps the outcome to an exit code.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use termcolor::StandardStream;

use crate::analysis::{Analyzer, CommandAnalyzer};
use crate::cli::args::{Command, CorpusArgs, DiagcheckArgs, RegistryCommand, RunArgs};
use crate::cli::output::{color_choice, Reporter};
use crate::completeness;
use crate::config::{FileConfig, HarnessConfig, RunMode};
use crate::errors::{HarnessError, Result};
use crate::harness::{ExitStatus, Harness};
use crate::registry::Registry;
use crate::scanner::CorpusScanner;

pub mod args;
pub mod diagnostics;
pub mod output;

/// Parses the process arguments, runs the command and returns the exit code.
pub fn run() -> i32 {
    let args = DiagcheckArgs::parse();
    let mut out = StandardStream::stdout(color_choice(args.no_color));
    let mut reporter = Reporter::new(&mut out, args.verbose);

    match dispatch(args.command, &mut reporter) {
        Ok(status) => status.code(),
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            ExitStatus::Fatal.code()
        }
    }
}

fn dispatch<W: termcolor::WriteColor>(command: Command, reporter: &mut Reporter<W>) -> Result<ExitStatus> {
    match command {
        Command::Run(args) => handle_run(args, RunMode::Check, reporter),
        Command::Update(args) => handle_run(args, RunMode::Update, reporter),
        Command::Registry {
            action: RegistryCommand::Generate { corpus, output },
        } => handle_generate(&corpus, output, reporter),
        Command::Registry {
            action:
                RegistryCommand::Check {
                    prefixes,
                    corpus,
                    registry,
                },
        } => handle_registry_check(prefixes, &corpus, registry, reporter),
        Command::List { prefixes, corpus } => handle_list(prefixes, &corpus, reporter),
    }
}

/// Handles `run` and `update`.
fn handle_run<W: termcolor::WriteColor>(
    args: RunArgs,
    mode: RunMode,
    reporter: &mut Reporter<W>,
) -> Result<ExitStatus> {
    let (mut config, file) = layered_config(&args.corpus)?;
    if mode == RunMode::Update {
        config.mode = RunMode::Update;
    }
    config.prefixes.extend(args.prefixes);
    if let Some(registry) = args.registry {
        config.registry = Some(registry);
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs;
    }
    if let Some(ms) = args.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    config.fail_fast |= args.fail_fast;

    // An analyzer from the config file runs in the config file's directory.
    let command = if args.analyzer.is_empty() {
        file.and_then(|(f, base)| Some(CommandAnalyzer::from_argv(&f.analyzer?)?.current_dir(base)))
    } else {
        CommandAnalyzer::from_argv(&args.analyzer)
    };
    let analyzer: Arc<dyn Analyzer> = Arc::new(command.ok_or_else(|| {
        HarnessError::config("no analyzer command: pass one after `--` or set `analyzer` in diagcheck.yaml")
    })?);

    let summary = Harness::new(config, analyzer).run()?;
    reporter.run(&summary).map_err(io_error)?;
    Ok(summary.exit_status())
}

fn handle_generate<W: termcolor::WriteColor>(
    corpus_args: &CorpusArgs,
    output: Option<PathBuf>,
    reporter: &mut Reporter<W>,
) -> Result<ExitStatus> {
    let (config, _) = layered_config(corpus_args)?;
    let path = registry_path(output, &config)?;
    let corpus = CorpusScanner::new(&config.corpus_root, &config.extension).scan()?;
    let registry = Registry::generate(&corpus, &config.extension);
    registry.save(&path)?;
    reporter
        .line(&format!("wrote {} entries to {}", registry.len(), path.display()))
        .map_err(io_error)?;
    Ok(ExitStatus::Success)
}

fn handle_registry_check<W: termcolor::WriteColor>(
    prefixes: Vec<String>,
    corpus_args: &CorpusArgs,
    registry: Option<PathBuf>,
    reporter: &mut Reporter<W>,
) -> Result<ExitStatus> {
    let (mut config, _) = layered_config(corpus_args)?;
    config.prefixes.extend(prefixes);
    let path = registry_path(registry, &config)?;
    let registry = Registry::load(&path)?;
    let corpus = CorpusScanner::new(&config.corpus_root, &config.extension).scan()?;

    let report = completeness::check(&registry, &corpus, &config.prefixes);
    reporter.completeness(&report).map_err(io_error)?;
    Ok(if report.is_complete() {
        ExitStatus::Success
    } else {
        ExitStatus::RegistryDrift
    })
}

fn handle_list<W: termcolor::WriteColor>(
    prefixes: Vec<String>,
    corpus_args: &CorpusArgs,
    reporter: &mut Reporter<W>,
) -> Result<ExitStatus> {
    let (mut config, _) = layered_config(corpus_args)?;
    config.prefixes.extend(prefixes);
    let corpus = CorpusScanner::new(&config.corpus_root, &config.extension)
        .scan()?
        .filter_prefixes(&config.prefixes);
    reporter.listing(&corpus).map_err(io_error)?;
    Ok(ExitStatus::Success)
}

// =============================================================================
// PRIVATE HELPERS
// =============================================================================

/// Defaults, then the config file, then the environment, then the corpus flags.
/// Returns the config file with its directory when one was used.
fn layered_config(args: &CorpusArgs) -> Result<(HarnessConfig, Option<(FileConfig, PathBuf)>)> {
    let mut config = HarnessConfig::default();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let file = match FileConfig::discover(args.config.as_deref(), &cwd)? {
        Some((file, base)) => {
            config.apply_file(&file, &base);
            Some((file, base))
        }
        None => None,
    };
    config.apply_env(|name| std::env::var(name).ok());

    if let Some(root) = &args.root {
        config.corpus_root = root.clone();
    }
    if let Some(ext) = &args.ext {
        config.extension = ext.trim_start_matches('.').to_string();
    }
    config.validate()?;
    Ok((config, file))
}

fn registry_path(explicit: Option<PathBuf>, config: &HarnessConfig) -> Result<PathBuf> {
    explicit
        .or_else(|| config.registry.clone())
        .ok_or_else(|| HarnessError::config("no registry path: pass one on the command line or set `registry` in diagcheck.yaml"))
}

fn io_error(e: std::io::Error) -> HarnessError {
    HarnessError::ReportWrite {
        message: e.to_string(),
    }
}
