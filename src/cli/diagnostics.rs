//! Source snippets with a pointer under a diagnostic range.
//!
//! Used by the reporter to show where a missing or unexpected diagnostic sits in
//! its segment:
//!
//! ```text
//! 1 | fun f() { foo() }
//!   |           ^-- UNRESOLVED_REFERENCE
//! ```

use unicode_width::UnicodeWidthStr;

use crate::span::{floor_char_boundary, Span};

/// Number of lines of context to show before and after the range.
const SNIPPET_CONTEXT_LINES: usize = 1;

/// Renders the lines of `source` covered by `span`, plus context, with a pointer
/// line under each covered line. Returns `None` when the range does not fit.
pub fn snippet(source: &str, span: Span, label: &str) -> Option<String> {
    let ((start_line, _), (end_line, _)) = span.line_col(source)?;
    let lines: Vec<(usize, &str)> = line_starts(source);

    let display_start = start_line.saturating_sub(SNIPPET_CONTEXT_LINES).max(1);
    let display_end = (end_line + SNIPPET_CONTEXT_LINES).min(lines.len());
    let width = display_end.to_string().len();

    let mut result = String::new();
    for line_num in display_start..=display_end {
        let (offset, line) = lines[line_num - 1];
        result.push_str(&format!("{line_num:width$} | {line}\n"));

        if line_num < start_line || line_num > end_line {
            continue;
        }
        let from = span.start.max(offset) - offset;
        let to = span.end.min(offset + line.len()).max(span.start.max(offset)) - offset;
        result.push_str(&format!("{:width$} | ", ""));
        result.push_str(&pointer_line(line, from, to, line_num == end_line, label));
        result.push('\n');
    }
    Some(result)
}

/// Each line of `source` with its starting byte offset, without line terminators.
fn line_starts(source: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    let mut lines = Vec::new();
    for raw in source.split('\n') {
        lines.push((offset, raw.strip_suffix('\r').unwrap_or(raw)));
        offset += raw.len() + 1;
    }
    lines
}

/// Spaces up to `from`, then `^` and dashes up to `to`, measured in display columns.
fn pointer_line(line: &str, from: usize, to: usize, last: bool, label: &str) -> String {
    let from = floor_char_boundary(line, from);
    let to = floor_char_boundary(line, to);
    let indent = line[..from].width();
    let marked = line[from..to].width();

    let mut s = " ".repeat(indent);
    s.push('^');
    s.push_str(&"-".repeat(marked.saturating_sub(1)));
    if last {
        s.push(' ');
        s.push_str(label);
    }
    s
}
