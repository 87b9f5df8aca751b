//! The seam to the compiler front end under test.
//!
//! The harness never analyses code itself. It hands each fixture's segments to an
//! [`Analyzer`] and compares what comes back. Two adapters are provided:
//! closures (`Fn(&AnalysisRequest) -> Result<..>`), used by tests and embedders, and
//! [`CommandAnalyzer`], which talks JSON to an external process.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::diagnostic::ActualDiagnostic;
use crate::errors::HarnessError;
use crate::fixture::{Fixture, SourceSegment};

/// What the front end is asked to analyse: the named segments of one fixture,
/// with all markers removed.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub fixture: String,
    pub segments: Vec<SourceSegment>,
}

impl AnalysisRequest {
    pub fn for_fixture(fixture: &Fixture) -> Self {
        Self {
            fixture: fixture.id.clone(),
            segments: fixture.segments.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to start analyzer `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("analyzer i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("analyzer output is not a diagnostic list: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("analyzer exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },
    #[error("analyzer was stopped after {}ms", .0.as_millis())]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(String),
}

/// A compiler front end producing diagnostics for a fixture.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<ActualDiagnostic>, AnalysisError>;

    /// Like [`Analyzer::analyze`], but gives up with [`AnalysisError::TimedOut`] once
    /// `timeout` has passed, releasing whatever the analysis holds. The default
    /// ignores the limit.
    fn analyze_within(
        &self,
        request: &AnalysisRequest,
        _timeout: Duration,
    ) -> Result<Vec<ActualDiagnostic>, AnalysisError> {
        self.analyze(request)
    }
}

impl<F> Analyzer for F
where
    F: Fn(&AnalysisRequest) -> Result<Vec<ActualDiagnostic>, AnalysisError> + Send + Sync,
{
    fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<ActualDiagnostic>, AnalysisError> {
        self(request)
    }
}

/// Runs an external command per fixture.
///
/// The request is written to the command's stdin as JSON:
///
/// ```json
/// {"fixture": "resolve/a.src", "segments": [{"name": "a.src", "text": "..."}]}
/// ```
///
/// and a JSON array of diagnostics is read back from stdout:
///
/// ```json
/// [{"segment": 0, "start": 10, "end": 14, "code": "UNRESOLVED_REFERENCE", "severity": "error"}]
/// ```
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Builds an analyzer from `[program, args...]`. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// How often a running analyzer process is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl CommandAnalyzer {
    fn run(
        &self,
        request: &AnalysisRequest,
        timeout: Option<Duration>,
    ) -> Result<Vec<ActualDiagnostic>, AnalysisError> {
        let payload = serde_json::to_vec(request)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        let deadline = timeout.map(|t| (Instant::now() + t, t));
        let mut child = command.spawn().map_err(|source| AnalysisError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Each pipe gets its own thread so a child that fills one pipe while we
        // wait on another cannot deadlock.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(&payload) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some((at, limit)) = deadline {
                if Instant::now() >= at {
                    stop(&mut child);
                    return Err(AnalysisError::TimedOut(limit));
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| AnalysisError::Failed("stdin writer panicked".to_string()))??;
        }
        let stdout = join_output(stdout)?;
        let stderr = join_output(stderr)?;

        if !status.success() {
            return Err(AnalysisError::Exited {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(serde_json::from_slice(&stdout)?)
    }
}

impl Analyzer for CommandAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<ActualDiagnostic>, AnalysisError> {
        self.run(request, None)
    }

    /// Kills the process when `timeout` expires.
    fn analyze_within(
        &self,
        request: &AnalysisRequest,
        timeout: Duration,
    ) -> Result<Vec<ActualDiagnostic>, AnalysisError> {
        self.run(request, Some(timeout))
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_output(reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>, AnalysisError> {
    match reader {
        Some(handle) => Ok(handle
            .join()
            .map_err(|_| AnalysisError::Failed("output reader panicked".to_string()))??),
        None => Ok(Vec::new()),
    }
}

/// Kills and reaps `child`. Errors mean it already exited.
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Runs `analyzer` on a helper thread and waits at most `timeout` for it.
///
/// The outer `Err` is the timeout. The helper calls [`Analyzer::analyze_within`], so
/// an analyzer that honours the limit (like [`CommandAnalyzer`]) stops its work; any
/// other is left to finish on its own and its result is discarded.
pub fn analyze_with_timeout(
    analyzer: Arc<dyn Analyzer>,
    request: AnalysisRequest,
    timeout: Duration,
) -> Result<Result<Vec<ActualDiagnostic>, AnalysisError>, HarnessError> {
    let fixture = request.fixture.clone();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(analyzer.analyze_within(&request, timeout));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => Ok(result),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(HarnessError::AnalysisTimeout { fixture, timeout }),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Ok(Err(AnalysisError::Failed("analyzer panicked".to_string())))
        }
    }
}
