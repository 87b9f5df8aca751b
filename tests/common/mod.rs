//! Shared helpers for the integration tests.
//!
//! The toy front end stands in for a real compiler. Its language is one statement
//! per line; `val NAME = ...` declares a variable and `fun NAME(...)` a function.
//! It reports:
//! - `UNRESOLVED_REFERENCE` (error) for an identifier that nothing declares
//! - `UNUSED_VARIABLE` (warning) for a `val` that is never referenced
//!
//! Declarations are visible across all segments of a fixture. Lines starting with
//! `//` are ignored.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diagcheck::analysis::{AnalysisError, AnalysisRequest, Analyzer};
use diagcheck::config::HarnessConfig;
use diagcheck::diagnostic::{ActualDiagnostic, Severity};
use diagcheck::span::Span;
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::TempDir;

static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

const KEYWORDS: &[&str] = &["val", "fun", "return"];

struct Token<'a> {
    segment: usize,
    span: Span,
    text: &'a str,
    declares: Option<&'static str>,
}

fn tokens(request: &AnalysisRequest) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    for (segment, source) in request.segments.iter().enumerate() {
        let mut offset = 0;
        for line in source.text.split_inclusive('\n') {
            if !line.trim_start().starts_with("//") {
                let mut previous: Option<&str> = None;
                for m in IDENT.find_iter(line) {
                    let text = m.as_str();
                    let declares = match previous {
                        Some("val") => Some("val"),
                        Some("fun") => Some("fun"),
                        _ => None,
                    };
                    previous = Some(text);
                    out.push(Token {
                        segment,
                        span: Span::new(offset + m.start(), offset + m.end()),
                        text,
                        declares,
                    });
                }
            }
            offset += line.len();
        }
    }
    out
}

/// Analyses a request the way the toy language defines.
pub fn toy_front_end(request: &AnalysisRequest) -> Result<Vec<ActualDiagnostic>, AnalysisError> {
    let tokens = tokens(request);
    let declared: HashSet<&str> = tokens
        .iter()
        .filter(|t| t.declares.is_some())
        .map(|t| t.text)
        .collect();
    let used: HashSet<&str> = tokens
        .iter()
        .filter(|t| t.declares.is_none() && !KEYWORDS.contains(&t.text))
        .map(|t| t.text)
        .collect();

    let mut diagnostics = Vec::new();
    for token in &tokens {
        if KEYWORDS.contains(&token.text) {
            continue;
        }
        match token.declares {
            Some("val") if !used.contains(token.text) => diagnostics.push(
                ActualDiagnostic::new(token.segment, token.span, "UNUSED_VARIABLE")
                    .with_severity(Severity::Warning)
                    .with_message(format!("variable '{}' is never used", token.text)),
            ),
            None if !declared.contains(token.text) => diagnostics.push(
                ActualDiagnostic::new(token.segment, token.span, "UNRESOLVED_REFERENCE")
                    .with_message(format!("unresolved reference: {}", token.text)),
            ),
            _ => {}
        }
    }
    Ok(diagnostics)
}

pub fn toy() -> Arc<dyn Analyzer> {
    Arc::new(toy_front_end)
}

/// An analyzer that sleeps before answering like the toy front end.
pub fn slow(delay: Duration) -> Arc<dyn Analyzer> {
    Arc::new(move |request: &AnalysisRequest| {
        std::thread::sleep(delay);
        toy_front_end(request)
    })
}

/// Writes `files` (relative path, contents) under a fresh temporary directory.
pub fn corpus(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, contents) in files {
        write(dir.path(), path, contents);
    }
    dir
}

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub fn read(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative)).unwrap()
}

/// A check-mode config for `root` with a short timeout.
pub fn config(root: &Path) -> HarnessConfig {
    HarnessConfig {
        corpus_root: root.to_path_buf(),
        jobs: 2,
        timeout: Duration::from_secs(5),
        ..HarnessConfig::default()
    }
}
