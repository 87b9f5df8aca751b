//! Runs every fixture of the checked-in corpus under `tests/corpus/` against the
//! toy front end, and checks the corpus against its registry.

mod common;

use std::path::PathBuf;

use diagcheck::annotation;
use diagcheck::completeness::check;
use diagcheck::harness::{ExitStatus, FixtureOutcome, Harness};
use diagcheck::registry::Registry;
use diagcheck::scanner::CorpusScanner;

fn corpus_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/corpus")
}

#[test]
fn every_fixture_passes() {
    let mut config = common::config(&corpus_root());
    config.registry = Some(corpus_root().join("registry.json"));
    let summary = Harness::new(config, common::toy()).run().unwrap();

    let failures: Vec<String> = summary
        .reports
        .iter()
        .filter(|r| !matches!(r.outcome, FixtureOutcome::Passed))
        .map(|r| format!("{}: {:?}", r.id, r.outcome))
        .collect();
    assert!(failures.is_empty(), "failing fixtures:\n{}", failures.join("\n"));
    assert_eq!(summary.exit_status(), ExitStatus::Success);
}

#[test]
fn all_files_present_in_registry() {
    let registry = Registry::load(&corpus_root().join("registry.json")).unwrap();
    let corpus = CorpusScanner::new(corpus_root(), "src").scan().unwrap();
    let report = check(&registry, &corpus, &[]);
    assert!(
        report.is_complete(),
        "registry is out of date, run `diagcheck registry generate`: {:?}",
        report.issues
    );
}

#[test]
fn every_fixture_round_trips_through_strip_and_reinsert() {
    let corpus = CorpusScanner::new(corpus_root(), "src").scan().unwrap();
    assert!(!corpus.is_empty());
    for fixture in &corpus {
        let source = std::fs::read_to_string(fixture.absolute()).unwrap();
        let annotated = annotation::parse(fixture.relative(), &source).unwrap();
        assert_eq!(annotated.original(), source, "{}", fixture.relative());
        assert_eq!(
            annotation::reinsert(&annotated.stripped, &annotated.markers),
            source
        );
    }
}
