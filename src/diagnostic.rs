//! Expected and actual diagnostics, and the key they are matched on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(format!("unknown severity `{other}`")),
        }
    }
}

/// The canonical comparison key: segment, range and code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiagnosticKey {
    pub segment: usize,
    pub span: Span,
    pub code: String,
}

/// A diagnostic declared by a marker in a fixture.
///
/// `severity` and `message` are optional: an expectation that leaves them out
/// matches on position and code alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDiagnostic {
    pub segment: usize,
    pub span: Span,
    pub code: String,
    pub severity: Option<Severity>,
    pub message: Option<String>,
}

impl ExpectedDiagnostic {
    pub fn new(segment: usize, span: Span, code: impl Into<String>) -> Self {
        Self {
            segment,
            span,
            code: code.into(),
            severity: None,
            message: None,
        }
    }

    pub fn key(&self) -> DiagnosticKey {
        DiagnosticKey {
            segment: self.segment,
            span: self.span,
            code: self.code.clone(),
        }
    }

    /// Whether `actual` satisfies this expectation exactly.
    pub fn accepts(&self, actual: &ActualDiagnostic) -> bool {
        self.segment == actual.segment
            && self.span == actual.span
            && self.code == actual.code
            && self.severity.map_or(true, |s| s == actual.severity)
            && self
                .message
                .as_deref()
                .map_or(true, |m| m == actual.message)
    }
}

/// A diagnostic reported by the analysis front end.
///
/// This is also the wire shape of the external-process protocol, so every field
/// but the range and code has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualDiagnostic {
    #[serde(default)]
    pub segment: usize,
    #[serde(flatten)]
    pub span: Span,
    pub code: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
}

impl ActualDiagnostic {
    pub fn new(segment: usize, span: Span, code: impl Into<String>) -> Self {
        Self {
            segment,
            span,
            code: code.into(),
            severity: Severity::Error,
            message: String::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn key(&self) -> DiagnosticKey {
        DiagnosticKey {
            segment: self.segment,
            span: self.span,
            code: self.code.clone(),
        }
    }
}
