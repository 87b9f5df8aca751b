use std::cmp::Reverse;
use std::collections::HashMap;

use thiserror::Error;

use super::{MarkerEntry, RawMarker};
use crate::span::{floor_char_boundary, Span};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("ranges {outer} and {inner} overlap without nesting and cannot be written as markers")]
    Crossing { outer: Span, inner: Span },
}

/// Puts recorded markers back into stripped text.
///
/// Markers are inserted in order; several markers at one offset keep their
/// recorded order.
pub fn reinsert(stripped: &str, markers: &[RawMarker]) -> String {
    let extra: usize = markers.iter().map(|m| m.text.len()).sum();
    let mut out = String::with_capacity(stripped.len() + extra);
    let mut cursor = 0;
    for marker in markers {
        let offset = floor_char_boundary(stripped, marker.offset.max(cursor));
        out.push_str(&stripped[cursor..offset]);
        out.push_str(&marker.text);
        cursor = offset;
    }
    out.push_str(&stripped[cursor..]);
    out
}

struct Group {
    span: Span,
    entries: Vec<MarkerEntry>,
}

/// Writes canonical markers for `diagnostics` into `stripped`.
///
/// Diagnostics on an identical range share one opener, in the order given.
/// Openers at one offset are written outermost first, and a range ending at an
/// offset is closed before a new one opens there. Ranges are clamped to the text
/// and to char boundaries.
pub fn render(
    stripped: &str,
    diagnostics: impl IntoIterator<Item = (Span, MarkerEntry)>,
) -> Result<String, RenderError> {
    let mut groups: Vec<Group> = Vec::new();
    let mut by_span: HashMap<Span, usize> = HashMap::new();
    for (span, entry) in diagnostics {
        let start = floor_char_boundary(stripped, span.start);
        let end = floor_char_boundary(stripped, span.end.max(span.start)).max(start);
        let span = Span::new(start, end);
        match by_span.get(&span) {
            Some(&idx) => groups[idx].entries.push(entry),
            None => {
                by_span.insert(span, groups.len());
                groups.push(Group {
                    span,
                    entries: vec![entry],
                });
            }
        }
    }
    groups.sort_by_key(|g| (g.span.start, Reverse(g.span.end)));

    let mut out = String::with_capacity(stripped.len() + groups.len() * 16);
    let mut cursor = 0;
    let mut open: Vec<Span> = Vec::new();
    let mut next = groups.iter().peekable();

    loop {
        let close_at = open.last().map(|s| s.end);
        let open_at = next.peek().map(|g| g.span.start);
        match (close_at, open_at) {
            (None, None) => break,
            (Some(end), Some(start)) if end <= start => close(&mut out, stripped, &mut cursor, &mut open, end),
            (Some(end), None) => close(&mut out, stripped, &mut cursor, &mut open, end),
            (_, Some(start)) => {
                let Some(group) = next.next() else { break };
                if let Some(outer) = open.last() {
                    if group.span.end > outer.end {
                        return Err(RenderError::Crossing {
                            outer: *outer,
                            inner: group.span,
                        });
                    }
                }
                out.push_str(&stripped[cursor..start]);
                cursor = start;
                out.push_str("<!");
                for (i, entry) in group.entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&entry.to_string());
                }
                out.push_str("!>");
                open.push(group.span);
            }
        }
    }
    out.push_str(&stripped[cursor..]);
    Ok(out)
}

fn close(out: &mut String, stripped: &str, cursor: &mut usize, open: &mut Vec<Span>, end: usize) {
    out.push_str(&stripped[*cursor..end]);
    *cursor = end;
    out.push_str("<!>");
    open.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::parse;

    fn entry(code: &str) -> MarkerEntry {
        MarkerEntry::new(code)
    }

    #[test]
    fn renders_shared_and_nested_ranges() {
        let text = "x(y)";
        let rendered = render(
            text,
            vec![
                (Span::new(2, 3), entry("C")),
                (Span::new(0, 4), entry("A")),
                (Span::new(0, 4), entry("B")),
            ],
        )
        .unwrap();
        assert_eq!(rendered, "<!A, B!>x(<!C!>y<!>)<!>");
    }

    #[test]
    fn closes_before_opening_at_same_offset() {
        let rendered = render(
            "abcd",
            vec![(Span::new(0, 2), entry("A")), (Span::new(2, 4), entry("B"))],
        )
        .unwrap();
        assert_eq!(rendered, "<!A!>ab<!><!B!>cd<!>");
    }

    #[test]
    fn empty_ranges_are_rendered_in_place() {
        let rendered = render(
            "abc",
            vec![(Span::new(1, 3), entry("OUTER")), (Span::new(1, 1), entry("POINT"))],
        )
        .unwrap();
        assert_eq!(rendered, "a<!OUTER!><!POINT!><!>bc<!>");
    }

    #[test]
    fn crossing_ranges_are_rejected() {
        let err = render(
            "abcdef",
            vec![(Span::new(0, 3), entry("A")), (Span::new(2, 5), entry("B"))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RenderError::Crossing {
                outer: Span::new(0, 3),
                inner: Span::new(2, 5)
            }
        );
    }

    #[test]
    fn rendered_markers_parse_back_to_same_ranges() {
        let text = "fun f() { foo(bar) }";
        let diagnostics = vec![
            (Span::new(10, 18), entry("TOO_MANY_ARGUMENTS")),
            (Span::new(14, 17), entry("UNRESOLVED_REFERENCE")),
        ];
        let rendered = render(text, diagnostics.clone()).unwrap();
        let annotated = parse("f.src", &rendered).unwrap();
        assert_eq!(annotated.stripped, text);
        let spans: Vec<_> = annotated
            .annotations
            .iter()
            .map(|a| (a.span, a.entry.clone()))
            .collect();
        assert_eq!(spans, diagnostics);
    }

    #[test]
    fn out_of_range_spans_are_clamped() {
        let rendered = render("ab", vec![(Span::new(1, 40), entry("X"))]).unwrap();
        assert_eq!(rendered, "a<!X!>b<!>");
    }
}
