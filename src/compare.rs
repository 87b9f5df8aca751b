//! Matching actual diagnostics against a fixture's expectations.
//!
//! Both sides are reduced to the canonical key `(segment, start, end, code)`. The
//! comparison runs in three passes:
//! 1. **Exact**: a maximum bipartite matching between expectations and actual
//!    diagnostics with the same key (and the same message/severity when the
//!    expectation states them). Expectations are placed in source order, each on the
//!    lowest-indexed free diagnostic, and earlier placements are moved along an
//!    augmenting path when that lets a later expectation match too.
//! 2. **Near miss**: each expectation still missing is paired, for reporting only,
//!    with the closest unexpected diagnostic of the same code in the same segment.
//! 3. **Duplicates**: actual diagnostics sharing a key with an earlier one are noted
//!    as an anomaly. They fail the fixture only if nothing expected them.

use difference::{Changeset, Difference};

use crate::annotation::{self, MarkerEntry, RenderError};
use crate::diagnostic::{ActualDiagnostic, ExpectedDiagnostic};
use crate::fixture::{Fixture, SourceSegment};
use crate::span::Span;

/// A missing and an unexpected diagnostic with the same code, paired to make the
/// report point at the range disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearMiss {
    /// Index into [`ComparisonResult::missing`].
    pub missing: usize,
    /// Index into [`ComparisonResult::unexpected`].
    pub unexpected: usize,
    pub distance: usize,
}

#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub fixture: String,
    pub segments: Vec<SourceSegment>,
    pub matched: Vec<(ExpectedDiagnostic, ActualDiagnostic)>,
    pub missing: Vec<ExpectedDiagnostic>,
    pub unexpected: Vec<ActualDiagnostic>,
    pub near_misses: Vec<NearMiss>,
    pub duplicates: Vec<ActualDiagnostic>,
    /// The fixture as it is on disk.
    pub expected_text: String,
    /// The fixture rewritten with markers for the actual diagnostics.
    pub actual_text: Result<String, RenderError>,
}

impl ComparisonResult {
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    /// `name:line:col-line:col [start..end)` for a segment-local range.
    pub fn locate(&self, segment: usize, span: Span) -> String {
        match self.segments.get(segment) {
            Some(s) => s.locate(span),
            None => format!("<segment {segment}> {span}"),
        }
    }

    /// Line diff between the fixture and its rewrite, if the rewrite is possible.
    pub fn diff(&self) -> Option<Vec<Difference>> {
        let actual = self.actual_text.as_ref().ok()?;
        Some(Changeset::new(&self.expected_text, actual, "\n").diffs)
    }

    /// Whether rewriting the fixture would change it.
    pub fn needs_rewrite(&self) -> bool {
        !self.passed()
            && self
                .actual_text
                .as_ref()
                .is_ok_and(|actual| actual != &self.expected_text)
    }
}

/// Compares the analyzer output for `fixture` with its expectations.
pub fn compare(fixture: &Fixture, actual: Vec<ActualDiagnostic>) -> ComparisonResult {
    let mut actual: Vec<ActualDiagnostic> =
        actual.into_iter().filter(|d| fixture.filter.admits(d)).collect();
    actual.sort_by(|a, b| a.key().cmp(&b.key()));

    let duplicates = actual
        .windows(2)
        .filter(|pair| pair[0].key() == pair[1].key())
        .map(|pair| pair[1].clone())
        .collect();

    let (taken, matched_index, missing_index) = match_exact(&fixture.expectations, &actual);

    let unexpected_index: Vec<usize> = (0..actual.len()).filter(|&i| !taken[i]).collect();
    let near_misses = pair_near_misses(fixture, &actual, &missing_index, &unexpected_index);
    let actual_text = render_actual(fixture, &actual, &matched_index, &unexpected_index);

    ComparisonResult {
        fixture: fixture.id.clone(),
        segments: fixture.segments.clone(),
        matched: matched_index
            .iter()
            .map(|&(e, a)| (fixture.expectations[e].clone(), actual[a].clone()))
            .collect(),
        missing: missing_index
            .iter()
            .map(|&e| fixture.expectations[e].clone())
            .collect(),
        unexpected: unexpected_index.iter().map(|&a| actual[a].clone()).collect(),
        near_misses,
        duplicates,
        expected_text: fixture.source.clone(),
        actual_text,
    }
}

/// Returns, per actual diagnostic, whether it was matched, the `(expected, actual)`
/// pairs in expectation order, and the unmatched expectations.
fn match_exact(
    expectations: &[ExpectedDiagnostic],
    actual: &[ActualDiagnostic],
) -> (Vec<bool>, Vec<(usize, usize)>, Vec<usize>) {
    let candidates: Vec<Vec<usize>> = expectations
        .iter()
        .map(|e| (0..actual.len()).filter(|&a| e.accepts(&actual[a])).collect())
        .collect();

    // owner[a] is the expectation currently holding actual diagnostic `a`.
    let mut owner: Vec<Option<usize>> = vec![None; actual.len()];
    for e in 0..expectations.len() {
        let mut visited = vec![false; actual.len()];
        augment(e, &candidates, &mut owner, &mut visited);
    }

    let mut assigned: Vec<Option<usize>> = vec![None; expectations.len()];
    for (a, holder) in owner.iter().enumerate() {
        if let Some(e) = holder {
            assigned[*e] = Some(a);
        }
    }
    let taken = owner.iter().map(Option::is_some).collect();
    let matched = assigned
        .iter()
        .enumerate()
        .filter_map(|(e, a)| a.map(|a| (e, a)))
        .collect();
    let missing = assigned
        .iter()
        .enumerate()
        .filter(|(_, a)| a.is_none())
        .map(|(e, _)| e)
        .collect();
    (taken, matched, missing)
}

fn augment(
    e: usize,
    candidates: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &a in &candidates[e] {
        if visited[a] {
            continue;
        }
        visited[a] = true;
        let holder = owner[a];
        let free = match holder {
            None => true,
            Some(holder) => augment(holder, candidates, owner, visited),
        };
        if free {
            owner[a] = Some(e);
            return true;
        }
    }
    false
}

fn pair_near_misses(
    fixture: &Fixture,
    actual: &[ActualDiagnostic],
    missing: &[usize],
    unexpected: &[usize],
) -> Vec<NearMiss> {
    let mut paired = vec![false; unexpected.len()];
    let mut out = Vec::new();
    for (m, &e) in missing.iter().enumerate() {
        let expected = &fixture.expectations[e];
        let best = unexpected
            .iter()
            .enumerate()
            .filter(|&(u, &a)| {
                !paired[u]
                    && actual[a].segment == expected.segment
                    && actual[a].code == expected.code
            })
            .map(|(u, &a)| (expected.span.distance(&actual[a].span), u))
            .min();
        if let Some((distance, u)) = best {
            paired[u] = true;
            out.push(NearMiss {
                missing: m,
                unexpected: u,
                distance,
            });
        }
    }
    out
}

/// Renders the actual diagnostics as markers. A matched diagnostic keeps the level
/// of detail of the expectation it satisfied; an unexpected one is written with its
/// code only.
fn render_actual(
    fixture: &Fixture,
    actual: &[ActualDiagnostic],
    matched: &[(usize, usize)],
    unexpected: &[usize],
) -> Result<String, RenderError> {
    let in_range = |d: &ActualDiagnostic| {
        fixture
            .segments
            .get(d.segment)
            .is_some_and(|s| d.span.fits(s.text.len()))
    };

    let mut entries: Vec<(Span, MarkerEntry)> = Vec::new();
    for &(e, a) in matched {
        let expected = &fixture.expectations[e];
        let diagnostic = &actual[a];
        entries.push((
            fixture.global_span(diagnostic.segment, diagnostic.span),
            MarkerEntry {
                severity: expected.severity.map(|_| diagnostic.severity),
                code: diagnostic.code.clone(),
                message: expected.message.as_ref().map(|_| diagnostic.message.clone()),
            },
        ));
    }
    for &a in unexpected {
        let diagnostic = &actual[a];
        if !in_range(diagnostic) {
            continue;
        }
        entries.push((
            fixture.global_span(diagnostic.segment, diagnostic.span),
            MarkerEntry::new(diagnostic.code.clone()),
        ));
    }

    annotation::render(&fixture.annotated.stripped, entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(source: &str) -> Fixture {
        Fixture::from_source("a.src", PathBuf::from("a.src"), source.to_string()).unwrap()
    }

    #[test]
    fn exact_match_passes() {
        let f = fixture("fun f() { <!UNRESOLVED_REFERENCE!>foo<!>() }");
        let result = compare(&f, vec![ActualDiagnostic::new(0, Span::new(10, 13), "UNRESOLVED_REFERENCE")]);
        assert!(result.passed());
        assert_eq!(result.matched.len(), 1);
        assert!(!result.needs_rewrite());
    }

    #[test]
    fn shifted_range_is_missing_plus_unexpected_near_miss() {
        let f = fixture("fun f() { <!UNRESOLVED_REFERENCE!>foo<!>() }");
        let result = compare(&f, vec![ActualDiagnostic::new(0, Span::new(10, 14), "UNRESOLVED_REFERENCE")]);
        assert!(!result.passed());
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.unexpected.len(), 1);
        assert_eq!(
            result.near_misses,
            vec![NearMiss {
                missing: 0,
                unexpected: 0,
                distance: 1
            }]
        );
        assert_eq!(
            result.actual_text.as_deref().unwrap(),
            "fun f() { <!UNRESOLVED_REFERENCE!>foo(<!>) }"
        );
    }

    #[test]
    fn filtered_codes_are_ignored() {
        let f = fixture("// !DIAGNOSTICS: -UNUSED_VARIABLE\nval x = 1\n");
        let result = compare(&f, vec![ActualDiagnostic::new(0, Span::new(38, 39), "UNUSED_VARIABLE")]);
        assert!(result.passed());
    }

    #[test]
    fn duplicates_are_noted() {
        let f = fixture("<!A!>x<!> <!A!>x<!>");
        let dup = ActualDiagnostic::new(0, Span::new(0, 1), "A");
        let result = compare(&f, vec![dup.clone(), dup.clone()]);
        assert_eq!(result.duplicates, vec![dup]);
        assert_eq!(result.unexpected.len(), 1);
        assert_eq!(result.missing.len(), 1);
    }

    #[test]
    fn bare_expectation_yields_to_a_more_specific_one() {
        let f = fixture("<!A, A(\"m\")!>x<!>");
        let result = compare(
            &f,
            vec![
                ActualDiagnostic::new(0, Span::new(0, 1), "A").with_message("m"),
                ActualDiagnostic::new(0, Span::new(0, 1), "A").with_message("other"),
            ],
        );
        assert!(result.passed(), "{result:?}");
        assert_eq!(result.matched.len(), 2);
        assert_eq!(result.matched[0].1.message, "other");
        assert_eq!(result.matched[1].1.message, "m");
    }

    #[test]
    fn matched_entries_keep_expectation_detail() {
        let f = fixture("<!warning:W(\"msg\")!>x<!> y");
        let result = compare(
            &f,
            vec![
                ActualDiagnostic::new(0, Span::new(0, 1), "W")
                    .with_severity(crate::diagnostic::Severity::Warning)
                    .with_message("msg"),
                ActualDiagnostic::new(0, Span::new(2, 3), "NEW").with_message("ignored"),
            ],
        );
        assert_eq!(result.unexpected.len(), 1);
        assert_eq!(
            result.actual_text.as_deref().unwrap(),
            "<!warning:W(\"msg\")!>x<!> <!NEW!>y<!>"
        );
    }
}
