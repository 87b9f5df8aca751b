//! Registry ↔ corpus drift detection ("all files present").

use std::collections::BTreeSet;

use thiserror::Error;

use crate::registry::Registry;
use crate::scanner::Corpus;

/// One disagreement between the registry and the files on disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryDrift {
    #[error("orphan fixture `{0}`: present on disk but missing from the registry")]
    OrphanFixture(String),
    #[error("stale registry entry `{0}`: no fixture file backs it")]
    StaleRegistryEntry(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletenessReport {
    /// Path prefixes the check was limited to; empty means the whole corpus.
    pub scope: Vec<String>,
    pub issues: Vec<RegistryDrift>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn orphans(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|d| match d {
            RegistryDrift::OrphanFixture(path) => Some(path.as_str()),
            RegistryDrift::StaleRegistryEntry(_) => None,
        })
    }

    pub fn stale(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().filter_map(|d| match d {
            RegistryDrift::StaleRegistryEntry(path) => Some(path.as_str()),
            RegistryDrift::OrphanFixture(_) => None,
        })
    }
}

/// Compares the registry with a fresh scan, restricted to paths starting with one
/// of `scope` (all paths when empty). Orphans are listed first, then stale entries,
/// each sorted.
pub fn check(registry: &Registry, corpus: &Corpus, scope: &[String]) -> CompletenessReport {
    let in_scope = |path: &str| scope.is_empty() || scope.iter().any(|p| path.starts_with(p.as_str()));

    let registered: BTreeSet<String> = registry
        .paths()
        .into_iter()
        .filter(|p| in_scope(p))
        .collect();
    let on_disk: BTreeSet<String> = corpus
        .iter()
        .map(|f| f.relative().to_string())
        .filter(|p| in_scope(p))
        .collect();

    let mut issues: Vec<RegistryDrift> = on_disk
        .difference(&registered)
        .cloned()
        .map(RegistryDrift::OrphanFixture)
        .collect();
    issues.extend(
        registered
            .difference(&on_disk)
            .cloned()
            .map(RegistryDrift::StaleRegistryEntry),
    );

    CompletenessReport {
        scope: scope.to_vec(),
        issues,
    }
}
