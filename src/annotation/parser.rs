use once_cell::sync::Lazy;
use regex::Regex;

use super::{Annotated, Annotation, MarkerEntry, RawMarker};
use crate::diagnostic::Severity;
use crate::errors::{HarnessError, Result};
use crate::span::Span;

const OPEN: &str = "<!";
const CLOSE: &str = "<!>";
const OPEN_END: &str = "!>";

static CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("diagnostic code pattern is valid")
});

/// An opener waiting for its `<!>`.
struct Pending {
    marker: Span,
    first: usize,
    count: usize,
}

/// Strips every marker from `source` and resolves each expectation to a range of
/// the stripped text.
///
/// Any marker that cannot be resolved is a hard `MalformedAnnotation`; nothing is
/// skipped.
pub fn parse(fixture: &str, source: &str) -> Result<Annotated> {
    let mut stripped = String::with_capacity(source.len());
    let mut markers = Vec::new();
    let mut annotations: Vec<Annotation> = Vec::new();
    let mut stack: Vec<Pending> = Vec::new();
    let mut pos = 0;

    let malformed =
        |span: Span, message: String| HarnessError::malformed(fixture, source, span, message);

    while let Some(rel) = source[pos..].find(OPEN) {
        let at = pos + rel;
        stripped.push_str(&source[pos..at]);

        if source[at..].starts_with(CLOSE) {
            let marker = Span::new(at, at + CLOSE.len());
            let Some(open) = stack.pop() else {
                return Err(malformed(marker, "closing marker `<!>` has no opener".to_string()));
            };
            for annotation in &mut annotations[open.first..open.first + open.count] {
                annotation.span.end = stripped.len();
            }
            markers.push(RawMarker {
                offset: stripped.len(),
                text: CLOSE.to_string(),
            });
            pos = marker.end;
            continue;
        }

        let body_start = at + OPEN.len();
        let Some(body_len) = find_open_end(&source[body_start..]) else {
            let line_end = source[at..].find('\n').map_or(source.len(), |i| at + i);
            return Err(malformed(
                Span::new(at, line_end),
                "unterminated marker: expected `!>` before the end of the line".to_string(),
            ));
        };
        let marker = Span::new(at, body_start + body_len + OPEN_END.len());
        let entries = parse_entries(&source[body_start..body_start + body_len])
            .map_err(|message| malformed(marker, message))?;

        let offset = stripped.len();
        stack.push(Pending {
            marker,
            first: annotations.len(),
            count: entries.len(),
        });
        annotations.extend(entries.into_iter().map(|entry| Annotation {
            span: Span::new(offset, offset),
            entry,
            marker,
        }));
        markers.push(RawMarker {
            offset,
            text: source[marker.start..marker.end].to_string(),
        });
        pos = marker.end;
    }
    stripped.push_str(&source[pos..]);

    if let Some(open) = stack.pop() {
        return Err(malformed(
            open.marker,
            "marker is never closed with `<!>`".to_string(),
        ));
    }

    Ok(Annotated {
        stripped,
        markers,
        annotations,
    })
}

/// Finds the `!>` that ends an opener, skipping over quoted arguments. The opener
/// must end on its own line.
fn find_open_end(rest: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if c == '\n' {
            return None;
        }
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if rest[i..].starts_with(OPEN_END) {
            return Some(i);
        }
    }
    None
}

fn parse_entries(body: &str) -> Result<Vec<MarkerEntry>, String> {
    if body.trim().is_empty() {
        return Err("empty marker: expected at least one diagnostic code".to_string());
    }
    split_top_level(body)?
        .into_iter()
        .map(|entry| parse_entry(entry.trim()))
        .collect()
}

/// Splits on commas that are outside quotes and parentheses.
fn split_top_level(body: &str) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced `)` in marker".to_string())?;
            }
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_string {
        return Err("unterminated string in marker arguments".to_string());
    }
    if depth != 0 {
        return Err("unbalanced `(` in marker".to_string());
    }
    parts.push(&body[start..]);
    Ok(parts)
}

fn parse_entry(entry: &str) -> Result<MarkerEntry, String> {
    let (head, message) = match entry.find('(') {
        Some(open) => {
            let Some(args) = entry[open + 1..].strip_suffix(')') else {
                return Err(format!("trailing text after arguments in `{entry}`"));
            };
            (&entry[..open], Some(parse_args(args)?.join(", ")))
        }
        None => (entry, None),
    };

    let (severity, code) = match head.split_once(':') {
        Some((severity, code)) => (Some(severity.trim().parse::<Severity>()?), code.trim()),
        None => (None, head.trim()),
    };

    if !CODE.is_match(code) {
        return Err(format!("invalid diagnostic code `{code}`"));
    }

    Ok(MarkerEntry {
        severity,
        code: code.to_string(),
        message,
    })
}

fn parse_args(args: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut chars = args.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            Some('"') => {}
            Some(c) => return Err(format!("expected a quoted argument, found `{c}`")),
            None => return Err("expected a quoted argument".to_string()),
        }

        let mut arg = String::new();
        loop {
            match chars.next() {
                Some('"') => break,
                Some('\\') => match chars.next() {
                    Some('n') => arg.push('\n'),
                    Some('t') => arg.push('\t'),
                    Some(c @ ('"' | '\\')) => arg.push(c),
                    Some(c) => return Err(format!("unknown escape `\\{c}` in argument")),
                    None => return Err("unterminated string in marker arguments".to_string()),
                },
                Some(c) => arg.push(c),
                None => return Err("unterminated string in marker arguments".to_string()),
            }
        }
        out.push(arg);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => return Ok(out),
            Some(',') => continue,
            Some(c) => return Err(format!("expected `,` between arguments, found `{c}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(source: &str) -> Vec<(String, Span)> {
        parse("t.src", source)
            .unwrap()
            .annotations
            .into_iter()
            .map(|a| (a.entry.code, a.span))
            .collect()
    }

    fn error(source: &str) -> String {
        parse("t.src", source).unwrap_err().to_string()
    }

    #[test]
    fn resolves_range_after_stripping_markers() {
        let source = "fun f() { <!UNRESOLVED_REFERENCE!>foo<!>() }";
        let annotated = parse("t.src", source).unwrap();
        assert_eq!(annotated.stripped, "fun f() { foo() }");
        assert_eq!(
            codes(source),
            vec![("UNRESOLVED_REFERENCE".to_string(), Span::new(10, 13))]
        );
    }

    #[test]
    fn shared_and_nested_markers_keep_source_order() {
        let source = "<!A, B!>x(<!C!>y<!>)<!>";
        assert_eq!(
            codes(source),
            vec![
                ("A".to_string(), Span::new(0, 4)),
                ("B".to_string(), Span::new(0, 4)),
                ("C".to_string(), Span::new(2, 3)),
            ]
        );
    }

    #[test]
    fn empty_range_marks_a_position() {
        assert_eq!(codes("ab<!X!><!>c"), vec![("X".to_string(), Span::new(2, 2))]);
    }

    #[test]
    fn severity_and_arguments_are_parsed() {
        let annotated = parse("t.src", r#"<!warning:TYPE_MISMATCH("Int", "Str\"ing")!>x<!>"#).unwrap();
        let entry = &annotated.annotations[0].entry;
        assert_eq!(entry.severity, Some(Severity::Warning));
        assert_eq!(entry.code, "TYPE_MISMATCH");
        assert_eq!(entry.message.as_deref(), Some("Int, Str\"ing"));
    }

    #[test]
    fn unterminated_opener_is_malformed() {
        assert!(error("val x = <!UNRESOLVED foo\n").contains("unterminated marker"));
    }

    #[test]
    fn opener_must_end_on_its_line() {
        assert!(error("<!A\n!>x<!>").contains("unterminated marker"));
    }

    #[test]
    fn unclosed_range_is_malformed() {
        assert!(error("<!A!>x").contains("never closed"));
    }

    #[test]
    fn stray_closer_is_malformed() {
        assert!(error("x<!>").contains("has no opener"));
    }

    #[test]
    fn empty_marker_is_malformed() {
        assert!(error("<!!>x<!>").contains("empty marker"));
    }

    #[test]
    fn bad_code_and_severity_are_malformed() {
        assert!(error("<!1ABC!>x<!>").contains("invalid diagnostic code"));
        assert!(error("<!fatal:ABC!>x<!>").contains("unknown severity"));
        assert!(error("<!A(unquoted)!>x<!>").contains("expected a quoted argument"));
    }

    #[test]
    fn malformed_error_points_at_marker() {
        let err = parse("t.src", "ok <!!> tail").unwrap_err();
        let HarnessError::MalformedAnnotation { span, .. } = err else {
            panic!("expected MalformedAnnotation, got {err:?}");
        };
        assert_eq!(span.offset(), 3);
        assert_eq!(span.len(), 4);
    }
}
