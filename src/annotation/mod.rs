//! Inline expected-diagnostic markers.
//!
//! A fixture declares the diagnostics it expects by wrapping the offending source
//! construct in markers:
//!
//! ```text
//! fun test() {
//!     <!UNRESOLVED_REFERENCE!>foo<!>()
//!     val <!warning:UNUSED_VARIABLE!>x<!> = <!TYPE_MISMATCH("Int", "String")!>""<!>
//! }
//! ```
//!
//! - `<!CODE!>` opens a range, `<!>` closes the most recently opened one.
//! - Several diagnostics on the same range share an opener: `<!A, B!>`.
//! - An entry may carry a severity prefix (`error:`, `warning:`, `info:`) and a
//!   parenthesised list of quoted arguments; the arguments, joined with `", "`, are the
//!   expected message.
//! - An empty range (`<!CODE!><!>`) marks a position.
//!
//! Markers are not part of the analysed program. [`parse`] strips them and records
//! where each one sat, so [`reinsert`] can rebuild the original text byte for byte,
//! and [`render`] writes a fresh set of markers for a new set of diagnostics.

mod parser;
mod render;

use std::fmt;

use crate::diagnostic::Severity;
use crate::span::Span;

pub use parser::parse;
pub use render::{render, reinsert, RenderError};

/// A marker exactly as it appeared in the fixture, positioned in the stripped text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMarker {
    pub offset: usize,
    pub text: String,
}

/// One diagnostic named inside an opening marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEntry {
    pub severity: Option<Severity>,
    pub code: String,
    pub message: Option<String>,
}

impl MarkerEntry {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            severity: None,
            code: code.into(),
            message: None,
        }
    }
}

impl fmt::Display for MarkerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(severity) = self.severity {
            write!(f, "{severity}:")?;
        }
        f.write_str(&self.code)?;
        if let Some(message) = &self.message {
            write!(f, "(\"{}\")", escape(message))?;
        }
        Ok(())
    }
}

/// An expectation resolved to a range of the stripped text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub span: Span,
    pub entry: MarkerEntry,
    /// Where the opening marker sat in the original text.
    pub marker: Span,
}

/// Result of parsing a fixture's markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotated {
    /// The fixture text with every marker removed.
    pub stripped: String,
    /// Every marker, in order, for the round trip.
    pub markers: Vec<RawMarker>,
    /// Expectations ordered by opener position, then by entry order.
    pub annotations: Vec<Annotation>,
}

impl Annotated {
    /// Rebuilds the original fixture text.
    pub fn original(&self) -> String {
        reinsert(&self.stripped, &self.markers)
    }

    /// Maps a range of the stripped text to the same characters in the original.
    pub fn original_span(&self, span: Span) -> Span {
        let before = |offset: usize, inclusive: bool| -> usize {
            self.markers
                .iter()
                .filter(|m| m.offset < offset || (inclusive && m.offset == offset))
                .map(|m| m.text.len())
                .sum()
        };
        Span::new(
            span.start + before(span.start, true),
            span.end + before(span.end, false),
        )
    }
}

fn escape(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "no markers at all\n",
        "fun f() { <!UNRESOLVED_REFERENCE!>foo<!>() }\n",
        "<!A, B!><!C!>x<!><!>\n",
        "val <!warning:UNUSED_VARIABLE!>x<!> = <!TYPE_MISMATCH(\"Int\",  \"String\")!>\"\"<!>\n",
        "<!DEBUG_INFO_MISSING_UNRESOLVED!><!>\r\nwindows line\r\n",
        "\u{feff}bom then <!X!>ünïcode<!> text",
        "<!NOTE(\"contains !> and \\\" quote\")!>body<!>",
    ];

    #[test]
    fn reinsert_reproduces_original_text() {
        for sample in SAMPLES {
            let annotated = parse("sample.src", sample).unwrap();
            assert_eq!(&annotated.original(), sample);
        }
    }

    #[test]
    fn original_span_skips_marker_text() {
        let source = "fun f() { <!UNRESOLVED_REFERENCE!>foo<!>() }\n";
        let annotated = parse("sample.src", source).unwrap();
        let foo = annotated.original_span(Span::new(10, 13));
        assert_eq!(&source[foo.start..foo.end], "foo");
        let call = annotated.original_span(Span::new(13, 15));
        assert_eq!(&source[call.start..call.end], "()");
    }

    #[test]
    fn stripped_text_has_no_markers() {
        let annotated = parse("sample.src", SAMPLES[4]).unwrap();
        assert_eq!(annotated.stripped, "val x = \"\"\n");
    }

    #[test]
    fn entry_display_escapes_message() {
        let entry = MarkerEntry {
            severity: Some(Severity::Warning),
            code: "NOTE".to_string(),
            message: Some("say \"hi\"".to_string()),
        };
        assert_eq!(entry.to_string(), "warning:NOTE(\"say \\\"hi\\\"\")");
    }
}
