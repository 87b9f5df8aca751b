mod common;

use std::path::PathBuf;

use diagcheck::analysis::AnalysisRequest;
use diagcheck::compare::{compare, NearMiss};
use diagcheck::diagnostic::ActualDiagnostic;
use diagcheck::fixture::Fixture;
use diagcheck::span::Span;
use rstest::rstest;

fn fixture(id: &str, source: &str) -> Fixture {
    Fixture::from_source(id, PathBuf::from(id), source.to_string()).unwrap()
}

const A_SRC: &str = "fun f() { <!UNRESOLVED_REFERENCE!>fooo<!>() }\n";

#[rstest]
#[case::exact(Span::new(10, 14), true)]
#[case::one_past_end(Span::new(10, 15), false)]
#[case::one_before_start(Span::new(9, 14), false)]
fn a_src_range_must_match_exactly(#[case] reported: Span, #[case] passes: bool) {
    let f = fixture("a.src", A_SRC);
    let result = compare(&f, vec![ActualDiagnostic::new(0, reported, "UNRESOLVED_REFERENCE")]);
    assert_eq!(result.passed(), passes);
    if !passes {
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
    }
}

#[test]
fn b_src_two_codes_on_one_range_one_reported() {
    let f = fixture("b.src", "val y = <!TYPE_MISMATCH, UNRESOLVED_REFERENCE!>z<!>\n");
    let result = compare(&f, vec![ActualDiagnostic::new(0, Span::new(8, 9), "UNRESOLVED_REFERENCE")]);
    assert_eq!(result.matched.len(), 1);
    assert_eq!(result.missing.len(), 1);
    assert_eq!(result.missing[0].code, "TYPE_MISMATCH");
    assert!(result.unexpected.is_empty());
    assert!(result.near_misses.is_empty());
}

#[test]
fn zero_expectations_require_zero_diagnostics() {
    let f = fixture("clean.src", "fun f() {}\n");
    assert!(compare(&f, Vec::new()).passed());

    let result = compare(&f, vec![ActualDiagnostic::new(0, Span::new(4, 5), "ANY")]);
    assert!(!result.passed());
    assert_eq!(result.unexpected.len(), 1);
}

#[test]
fn matching_ignores_reporting_order() {
    let source = "<!A!>x<!> <!B!>y<!> <!C!>z<!>";
    let f = fixture("order.src", source);
    let diagnostics = vec![
        ActualDiagnostic::new(0, Span::new(4, 5), "C"),
        ActualDiagnostic::new(0, Span::new(0, 1), "A"),
        ActualDiagnostic::new(0, Span::new(2, 3), "B"),
    ];
    let forward = compare(&f, diagnostics.clone());
    let mut reversed = diagnostics;
    reversed.reverse();
    let backward = compare(&f, reversed);
    assert!(forward.passed());
    assert!(backward.passed());
}

#[test]
fn two_identical_actuals_against_one_expectation_leave_one_unexpected() {
    let f = fixture("dup.src", "<!A!>x<!>");
    let dup = ActualDiagnostic::new(0, Span::new(0, 1), "A");
    let result = compare(&f, vec![dup.clone(), dup.clone()]);
    assert!(!result.passed());
    assert_eq!(result.unexpected, vec![dup.clone()]);
    assert_eq!(result.duplicates, vec![dup]);
}

#[test]
fn severity_and_message_are_checked_only_when_written() {
    let f = fixture(
        "detail.src",
        "val <!warning:UNUSED_VARIABLE(\"variable 'x' is never used\")!>x<!> = 1\n",
    );
    let warning = ActualDiagnostic::new(0, Span::new(4, 5), "UNUSED_VARIABLE")
        .with_severity(diagcheck::diagnostic::Severity::Warning);
    assert!(!compare(&f, vec![warning.clone()]).passed());
    assert!(compare(&f, vec![warning.with_message("variable 'x' is never used")]).passed());
}

#[test]
fn multi_file_fixture_compares_per_segment() {
    let source = "\
// FILE: lib.src
fun helper() {}
val <!UNUSED_VARIABLE!>unused<!> = 1
// FILE: main.src
fun main() { helper() <!UNRESOLVED_REFERENCE!>missing<!>() }
";
    let f = fixture("multi.src", source);
    assert_eq!(f.segments.len(), 2);

    let actual = common::toy_front_end(&AnalysisRequest::for_fixture(&f)).unwrap();
    let result = compare(&f, actual);
    assert!(result.passed(), "{result:#?}");
    let (_, unresolved) = result
        .matched
        .iter()
        .find(|(e, _)| e.code == "UNRESOLVED_REFERENCE")
        .unwrap();
    assert_eq!(unresolved.segment, 1);
    assert_eq!(unresolved.span, Span::new(22, 29));
}

#[test]
fn diagnostics_directive_drops_filtered_codes() {
    let f = fixture(
        "filtered.src",
        "// !DIAGNOSTICS: -UNUSED_VARIABLE\nval x = <!UNRESOLVED_REFERENCE!>y<!>\n",
    );
    let actual = common::toy_front_end(&AnalysisRequest::for_fixture(&f)).unwrap();
    assert_eq!(actual.len(), 2);
    assert!(compare(&f, actual).passed());
}
