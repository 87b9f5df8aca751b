//! In-memory fixtures: source text, segments and parsed expectations.
//!
//! A fixture is loaded once per run, parsed, and never mutated afterwards. Loading
//! follows a fixed flow:
//! 1. Read the raw bytes and decode them strictly as UTF-8
//! 2. Strip the expectation markers ([`crate::annotation`])
//! 3. Split the stripped text into segments at `// FILE: <name>` directive lines
//! 4. Re-base each expectation onto the segment that contains it
//! 5. Read the optional `// !DIAGNOSTICS:` filter directives, merged in order

use std::collections::BTreeMap;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::annotation::{self, Annotated};
use crate::diagnostic::{ActualDiagnostic, ExpectedDiagnostic, Severity};
use crate::errors::{HarnessError, Result};
use crate::scanner::FixturePath;
use crate::span::Span;

static FILE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^// FILE: *(\S+)[ \t]*\r?$").expect("FILE directive pattern is valid")
});

static FILTER_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^// !DIAGNOSTICS:(.*?)\r?$").expect("DIAGNOSTICS directive pattern is valid")
});

/// One independently analysed module of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSegment {
    pub name: String,
    /// Byte offset of the segment inside the stripped fixture text.
    #[serde(skip)]
    pub base: usize,
    pub text: String,
}

impl SourceSegment {
    /// Renders `span` as `name:line:col-line:col [start..end)`.
    pub fn locate(&self, span: Span) -> String {
        match span.line_col(&self.text) {
            Some(((l1, c1), (l2, c2))) => format!("{}:{l1}:{c1}-{l2}:{c2} {span}", self.name),
            None => format!("{} {span} (out of range)", self.name),
        }
    }
}

/// Codes and severities excluded from comparison by a `// !DIAGNOSTICS:` line.
///
/// ```text
/// // !DIAGNOSTICS: -UNUSED_VARIABLE -warning +DEPRECATION
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticFilter {
    codes: BTreeMap<String, bool>,
    severities: BTreeMap<Severity, bool>,
}

impl DiagnosticFilter {
    pub fn parse(tokens: &str) -> Result<Self, String> {
        let mut filter = DiagnosticFilter::default();
        for token in tokens.split_whitespace() {
            let (include, name) = if let Some(name) = token.strip_prefix('+') {
                (true, name)
            } else if let Some(name) = token.strip_prefix('-') {
                (false, name)
            } else {
                return Err(format!("filter token `{token}` must start with `+` or `-`"));
            };
            if name.is_empty() {
                return Err(format!("filter token `{token}` names nothing"));
            }
            match name.parse::<Severity>() {
                Ok(severity) => {
                    filter.severities.insert(severity, include);
                }
                Err(_) => {
                    filter.codes.insert(name.to_string(), include);
                }
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.severities.is_empty()
    }

    /// Adds the rules of `later`; a rule for the same code or severity replaces the
    /// earlier one.
    pub fn merge(&mut self, later: DiagnosticFilter) {
        self.codes.extend(later.codes);
        self.severities.extend(later.severities);
    }

    /// Whether `diagnostic` takes part in the comparison. An explicit code rule wins
    /// over a severity rule.
    pub fn admits(&self, diagnostic: &ActualDiagnostic) -> bool {
        if let Some(&include) = self.codes.get(&diagnostic.code) {
            return include;
        }
        self.severities
            .get(&diagnostic.severity)
            .copied()
            .unwrap_or(true)
    }
}

/// A parsed test fixture.
#[derive(Debug, Clone)]
pub struct Fixture {
    /// Corpus-relative path, `/`-separated.
    pub id: String,
    pub path: PathBuf,
    /// The text exactly as it is on disk.
    pub source: String,
    pub annotated: Annotated,
    pub segments: Vec<SourceSegment>,
    /// Expectations with segment-local ranges, in source order.
    pub expectations: Vec<ExpectedDiagnostic>,
    pub filter: DiagnosticFilter,
}

impl Fixture {
    /// Reads and parses a fixture from disk.
    pub fn load(fixture: &FixturePath) -> Result<Self> {
        let source = read_source(fixture)?;
        Self::from_source(fixture.relative(), fixture.absolute().to_path_buf(), source)
    }

    /// Parses fixture text that has already been read.
    pub fn from_source(id: impl Into<String>, path: PathBuf, source: String) -> Result<Self> {
        let id = id.into();
        let annotated = annotation::parse(&id, &source)?;
        let segments = split_segments(&id, &annotated.stripped);

        let mut expectations = Vec::with_capacity(annotated.annotations.len());
        for annotation in &annotated.annotations {
            let Some((index, segment)) = segments
                .iter()
                .enumerate()
                .find(|(_, s)| contains(s, annotation.span))
            else {
                return Err(HarnessError::malformed(
                    &id,
                    &source,
                    annotation.marker,
                    format!(
                        "`{}` does not fall inside a single `// FILE:` segment",
                        annotation.entry.code
                    ),
                ));
            };
            expectations.push(ExpectedDiagnostic {
                segment: index,
                span: Span::new(
                    annotation.span.start - segment.base,
                    annotation.span.end - segment.base,
                ),
                code: annotation.entry.code.clone(),
                severity: annotation.entry.severity,
                message: annotation.entry.message.clone(),
            });
        }

        let mut filter = DiagnosticFilter::default();
        for caps in FILTER_DIRECTIVE.captures_iter(&annotated.stripped) {
            let (Some(line), Some(tokens)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let rules = DiagnosticFilter::parse(tokens.as_str()).map_err(|message| {
                let span = annotated.original_span(Span::new(line.start(), line.end()));
                HarnessError::malformed(&id, &source, span, message)
            })?;
            filter.merge(rules);
        }

        Ok(Fixture {
            id,
            path,
            source,
            annotated,
            segments,
            expectations,
            filter,
        })
    }

    /// Converts a segment-local range to a range of the stripped text.
    pub fn global_span(&self, segment: usize, span: Span) -> Span {
        let base = self.segments.get(segment).map_or(0, |s| s.base);
        span.offset(base)
    }

    pub fn is_multi_file(&self) -> bool {
        self.segments.len() > 1 || self.segments.first().is_some_and(|s| s.base > 0)
    }
}

fn contains(segment: &SourceSegment, span: Span) -> bool {
    span.start >= segment.base && span.end <= segment.base + segment.text.len()
}

fn read_source(fixture: &FixturePath) -> Result<String> {
    let bytes = std::fs::read(fixture.absolute()).map_err(|e| HarnessError::FixtureReadError {
        fixture: fixture.relative().to_string(),
        message: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| HarnessError::FixtureReadError {
        fixture: fixture.relative().to_string(),
        message: format!(
            "invalid UTF-8 at byte {}",
            e.utf8_error().valid_up_to()
        ),
    })
}

/// Splits stripped text at `// FILE:` lines. Text before the first directive is
/// not analysed.
fn split_segments(id: &str, stripped: &str) -> Vec<SourceSegment> {
    let directives: Vec<_> = FILE_DIRECTIVE
        .captures_iter(stripped)
        .filter_map(|caps| Some((caps.get(0)?, caps.get(1)?.as_str().to_string())))
        .collect();

    if directives.is_empty() {
        let name = id.rsplit('/').next().unwrap_or(id).to_string();
        return vec![SourceSegment {
            name,
            base: 0,
            text: stripped.to_string(),
        }];
    }

    let mut segments = Vec::with_capacity(directives.len());
    for (i, (line, name)) in directives.iter().enumerate() {
        let base = if stripped[line.end()..].starts_with('\n') {
            line.end() + 1
        } else {
            line.end()
        };
        let end = directives
            .get(i + 1)
            .map_or(stripped.len(), |(next, _)| next.start());
        segments.push(SourceSegment {
            name: name.clone(),
            base,
            text: stripped[base..end.max(base)].to_string(),
        });
    }
    segments
}
