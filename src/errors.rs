//! Error taxonomy for the harness.
//!
//! Every failure the harness can hit is a variant of [`HarnessError`]. Variants are
//! split into two classes:
//!
//! - **Environment failures** (`CorpusNotFound`, `CorpusWalk`, `RegistryUnreadable`,
//!   `RegistryTampered`, `RegistryWrite`, `Config`, `ReportWrite`) abort the whole run.
//! - **Fixture failures** (`FixtureReadError`, `MalformedAnnotation`, `AnalysisTimeout`,
//!   `FixtureWrite`) are confined to one fixture's outcome; the run carries on.
//!
//! A diagnostic mismatch is not an error value: it is a failed
//! [`ComparisonResult`](crate::compare::ComparisonResult).
//!
//! Errors render through `miette`. Malformed annotations carry the fixture text and a
//! labelled span so the offending marker is shown in context.

use std::path::PathBuf;
use std::time::Duration;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::span::Span;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("corpus root `{}` does not exist or is not a directory", root.display())]
    #[diagnostic(
        code(diagcheck::corpus_not_found),
        help("pass --root or set `corpus_root` in diagcheck.yaml")
    )]
    CorpusNotFound { root: PathBuf },

    #[error("failed to walk corpus under `{}`: {message}", root.display())]
    #[diagnostic(code(diagcheck::corpus_walk))]
    CorpusWalk { root: PathBuf, message: String },

    #[error("failed to read fixture `{fixture}`: {message}")]
    #[diagnostic(code(diagcheck::fixture_read))]
    FixtureReadError { fixture: String, message: String },

    #[error("malformed annotation in `{fixture}`: {message}")]
    #[diagnostic(code(diagcheck::malformed_annotation))]
    MalformedAnnotation {
        fixture: String,
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("analysis of `{fixture}` did not finish within {}ms", timeout.as_millis())]
    #[diagnostic(code(diagcheck::analysis_timeout))]
    AnalysisTimeout { fixture: String, timeout: Duration },

    #[error("failed to rewrite fixture `{fixture}`: {message}")]
    #[diagnostic(code(diagcheck::fixture_write))]
    FixtureWrite { fixture: String, message: String },

    #[error("registry `{}` is unreadable: {message}", path.display())]
    #[diagnostic(
        code(diagcheck::registry_unreadable),
        help("run `diagcheck registry generate` to recreate it")
    )]
    RegistryUnreadable { path: PathBuf, message: String },

    #[error("registry `{}` was edited by hand: digest {recorded} does not match contents ({computed})", path.display())]
    #[diagnostic(
        code(diagcheck::registry_tampered),
        help("the registry must be regenerated with `diagcheck registry generate`, not edited")
    )]
    RegistryTampered {
        path: PathBuf,
        recorded: String,
        computed: String,
    },

    #[error("failed to write registry `{}`: {message}", path.display())]
    #[diagnostic(code(diagcheck::registry_write))]
    RegistryWrite { path: PathBuf, message: String },

    #[error("configuration error: {message}")]
    #[diagnostic(code(diagcheck::config))]
    Config { message: String },

    #[error("failed to write the report: {message}")]
    #[diagnostic(code(diagcheck::report_write))]
    ReportWrite { message: String },
}

impl HarnessError {
    /// Builds a `MalformedAnnotation` pointing at `span` of the fixture's original text.
    pub fn malformed(
        fixture: &str,
        source: &str,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        HarnessError::MalformedAnnotation {
            fixture: fixture.to_string(),
            message: message.into(),
            src: NamedSource::new(fixture, source.to_string()),
            span: (span.start, span.len()).into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        HarnessError::Config {
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole run rather than a single fixture.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::CorpusNotFound { .. }
                | HarnessError::CorpusWalk { .. }
                | HarnessError::RegistryUnreadable { .. }
                | HarnessError::RegistryTampered { .. }
                | HarnessError::RegistryWrite { .. }
                | HarnessError::Config { .. }
                | HarnessError::ReportWrite { .. }
        )
    }
}
