//! The harness driver: scan, evaluate every selected fixture, check completeness.
//!
//! # Architecture
//!
//! A run follows a phase-based model:
//! 1. **Scan**: walk the corpus root fresh and select fixtures by path prefix
//! 2. **Registry**: load the registry if one is configured (fatal when unreadable)
//! 3. **Evaluate**: a pool of `jobs` worker threads takes fixtures one at a time.
//!    Each fixture is loaded, parsed, analysed under a timeout, compared, and in
//!    update mode rewritten
//! 4. **Completeness**: compare the registry with the scan, scoped to the prefixes
//!
//! Per-fixture problems end up in that fixture's [`FixtureOutcome`]; only
//! environment failures make [`Harness::run`] return an error.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use diagcheck::analysis::CommandAnalyzer;
//! use diagcheck::config::HarnessConfig;
//! use diagcheck::harness::Harness;
//!
//! let analyzer = Arc::new(CommandAnalyzer::new("./frontend"));
//! let summary = Harness::new(HarnessConfig::default(), analyzer).run()?;
//! std::process::exit(summary.exit_status().code());
//! # Ok::<(), diagcheck::errors::HarnessError>(())
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::analysis::{analyze_with_timeout, AnalysisError, AnalysisRequest, Analyzer};
use crate::compare::{compare, ComparisonResult};
use crate::completeness::{self, CompletenessReport};
use crate::config::{HarnessConfig, RunMode};
use crate::errors::{HarnessError, Result};
use crate::fixture::Fixture;
use crate::registry::Registry;
use crate::scanner::{CorpusScanner, FixturePath};

// =============================================================================
// CORE TYPES
// =============================================================================

/// Shared flag stopping a run from starting further fixtures.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one fixture ended.
#[derive(Debug)]
pub enum FixtureOutcome {
    Passed,
    Failed(Box<ComparisonResult>),
    /// Update mode rewrote the fixture with the actual diagnostics.
    Updated(Box<ComparisonResult>),
    Malformed(HarnessError),
    Unreadable(HarnessError),
    TimedOut(Duration),
    AnalysisFailed(String),
    UpdateFailed(Box<ComparisonResult>, HarnessError),
    /// Evaluation panicked; the message is the panic payload.
    Panicked(String),
    /// Never started because the run was cancelled.
    Cancelled,
}

impl FixtureOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            FixtureOutcome::Passed | FixtureOutcome::Updated(_) | FixtureOutcome::Cancelled
        )
    }

    pub fn comparison(&self) -> Option<&ComparisonResult> {
        match self {
            FixtureOutcome::Failed(result)
            | FixtureOutcome::Updated(result)
            | FixtureOutcome::UpdateFailed(result, _) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct FixtureReport {
    /// Corpus-relative path.
    pub id: String,
    pub outcome: FixtureOutcome,
    pub elapsed: Duration,
}

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// At least one fixture failed or was cancelled.
    Failures,
    /// All fixtures passed but the registry disagrees with the corpus.
    RegistryDrift,
    /// The environment was broken: missing corpus, bad registry, bad configuration.
    Fatal,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failures => 1,
            ExitStatus::RegistryDrift => 3,
            ExitStatus::Fatal => 4,
        }
    }
}

/// Everything a run produced, sorted by fixture id.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<FixtureReport>,
    /// Present when a registry was configured.
    pub completeness: Option<CompletenessReport>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, FixtureOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(FixtureOutcome::is_failure)
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, FixtureOutcome::Updated(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, FixtureOutcome::Cancelled))
    }

    pub fn get(&self, id: &str) -> Option<&FixtureReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.failed() > 0 || self.cancelled() > 0 {
            ExitStatus::Failures
        } else if self.completeness.as_ref().is_some_and(|c| !c.is_complete()) {
            ExitStatus::RegistryDrift
        } else {
            ExitStatus::Success
        }
    }

    fn count(&self, pred: impl Fn(&FixtureOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

// =============================================================================
// DRIVER
// =============================================================================

pub struct Harness {
    config: HarnessConfig,
    analyzer: Arc<dyn Analyzer>,
    cancel: CancelToken,
}

impl Harness {
    pub fn new(config: HarnessConfig, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            config,
            analyzer,
            cancel: CancelToken::new(),
        }
    }

    /// Shares an externally owned token, e.g. one set from a signal handler.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let corpus = CorpusScanner::new(&self.config.corpus_root, &self.config.extension).scan()?;
        let registry = self
            .config
            .registry
            .as_deref()
            .map(Registry::load)
            .transpose()?;

        let selected = corpus.filter_prefixes(&self.config.prefixes).into_vec();
        let mut reports = self.evaluate_all(&selected);
        reports.sort_by(|a, b| a.id.cmp(&b.id));

        let completeness = registry.map(|r| completeness::check(&r, &corpus, &self.config.prefixes));
        Ok(RunSummary {
            reports,
            completeness,
        })
    }

    /// Evaluates one fixture from start to finish.
    pub fn run_fixture(&self, path: &FixturePath) -> FixtureOutcome {
        let fixture = match Fixture::load(path) {
            Ok(fixture) => fixture,
            Err(e @ HarnessError::FixtureReadError { .. }) => return FixtureOutcome::Unreadable(e),
            Err(e) => return FixtureOutcome::Malformed(e),
        };

        let request = AnalysisRequest::for_fixture(&fixture);
        let actual = match analyze_with_timeout(self.analyzer.clone(), request, self.config.timeout) {
            Ok(Ok(diagnostics)) => diagnostics,
            Ok(Err(AnalysisError::TimedOut(limit))) => return FixtureOutcome::TimedOut(limit),
            Ok(Err(e)) => return FixtureOutcome::AnalysisFailed(e.to_string()),
            Err(_) => return FixtureOutcome::TimedOut(self.config.timeout),
        };

        let result = compare(&fixture, actual);
        if result.passed() {
            return FixtureOutcome::Passed;
        }
        match self.config.mode {
            RunMode::Check => FixtureOutcome::Failed(Box::new(result)),
            RunMode::Update => rewrite(&fixture, result),
        }
    }

    fn evaluate_all(&self, fixtures: &[FixturePath]) -> Vec<FixtureReport> {
        let next = AtomicUsize::new(0);
        let reports = Mutex::new(Vec::with_capacity(fixtures.len()));
        let workers = self.config.jobs.clamp(1, fixtures.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(path) = fixtures.get(index) else {
                        break;
                    };

                    let started = Instant::now();
                    let outcome = if self.cancel.is_cancelled() {
                        FixtureOutcome::Cancelled
                    } else {
                        isolate(|| self.run_fixture(path))
                    };
                    if self.config.fail_fast && outcome.is_failure() {
                        self.cancel.cancel();
                    }

                    let report = FixtureReport {
                        id: path.relative().to_string(),
                        outcome,
                        elapsed: started.elapsed(),
                    };
                    if let Ok(mut reports) = reports.lock() {
                        reports.push(report);
                    }
                });
            }
        });

        reports.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs `evaluate`, turning a panic into [`FixtureOutcome::Panicked`].
fn isolate(evaluate: impl FnOnce() -> FixtureOutcome) -> FixtureOutcome {
    panic::catch_unwind(AssertUnwindSafe(evaluate)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        FixtureOutcome::Panicked(message)
    })
}

fn rewrite(fixture: &Fixture, result: ComparisonResult) -> FixtureOutcome {
    let write_error = |message: String| HarnessError::FixtureWrite {
        fixture: fixture.id.clone(),
        message,
    };
    let text = match &result.actual_text {
        Ok(text) => text.clone(),
        Err(e) => {
            let error = write_error(e.to_string());
            return FixtureOutcome::UpdateFailed(Box::new(result), error);
        }
    };
    if text == result.expected_text {
        // Nothing renderable differs: the mismatch lies outside every segment.
        return FixtureOutcome::Failed(Box::new(result));
    }
    match std::fs::write(&fixture.path, text) {
        Ok(()) => FixtureOutcome::Updated(Box::new(result)),
        Err(e) => {
            let error = write_error(e.to_string());
            FixtureOutcome::UpdateFailed(Box::new(result), error)
        }
    }
}
