//! The persisted test registry.
//!
//! The registry lists every fixture of a corpus with its group and test identifier.
//! It is generated from a scan, never edited by hand: the stored digest covers every
//! entry, and [`Registry::load`] refuses a registry whose entries no longer match it.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{HarnessError, Result};
use crate::scanner::{Corpus, FixturePath};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryEntry {
    /// Directory segments under the corpus root.
    pub group: Vec<String>,
    pub file: String,
    pub test_id: String,
}

impl RegistryEntry {
    pub fn from_fixture(fixture: &FixturePath) -> Self {
        Self {
            group: fixture.group(),
            file: fixture.file_name().to_string(),
            test_id: fixture.test_id(),
        }
    }

    pub fn relative_path(&self) -> String {
        let mut path = self.group.join("/");
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(&self.file);
        path
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    pub root: String,
    pub extension: String,
    pub digest: String,
    pub entries: Vec<RegistryEntry>,
}

impl Registry {
    /// Builds the registry for a scanned corpus. Test identifiers that collide
    /// within one group get a numeric suffix in scan order.
    pub fn generate(corpus: &Corpus, extension: &str) -> Self {
        let mut seen: HashMap<(Vec<String>, String), usize> = HashMap::new();
        let entries: Vec<RegistryEntry> = corpus
            .iter()
            .map(|fixture| {
                let mut entry = RegistryEntry::from_fixture(fixture);
                let count = seen
                    .entry((entry.group.clone(), entry.test_id.clone()))
                    .or_insert(0);
                *count += 1;
                if *count > 1 {
                    entry.test_id = format!("{}_{}", entry.test_id, count);
                }
                entry
            })
            .collect();

        Self {
            root: corpus.root().to_string_lossy().replace('\\', "/"),
            extension: extension.to_string(),
            digest: digest(&entries),
            entries,
        }
    }

    /// Reads a registry and checks its digest.
    pub fn load(path: &Path) -> Result<Self> {
        let unreadable = |message: String| HarnessError::RegistryUnreadable {
            path: path.to_path_buf(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let registry: Registry = serde_json::from_str(&text).map_err(|e| unreadable(e.to_string()))?;

        let computed = digest(&registry.entries);
        if computed != registry.digest {
            return Err(HarnessError::RegistryTampered {
                path: path.to_path_buf(),
                recorded: registry.digest,
                computed,
            });
        }
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let write_error = |message: String| HarnessError::RegistryWrite {
            path: path.to_path_buf(),
            message,
        };
        let mut json = serde_json::to_string_pretty(self).map_err(|e| write_error(e.to_string()))?;
        json.push('\n');
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| write_error(e.to_string()))
    }

    /// Relative paths of every entry.
    pub fn paths(&self) -> BTreeSet<String> {
        self.entries.iter().map(RegistryEntry::relative_path).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase hex SHA-256 over one `"{relative_path}\t{test_id}\n"` line per entry.
pub fn digest(entries: &[RegistryEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.relative_path().as_bytes());
        hasher.update(b"\t");
        hasher.update(entry.test_id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(group: &[&str], file: &str, test_id: &str) -> RegistryEntry {
        RegistryEntry {
            group: group.iter().map(|s| s.to_string()).collect(),
            file: file.to_string(),
            test_id: test_id.to_string(),
        }
    }

    #[test]
    fn relative_path_joins_group_and_file() {
        assert_eq!(entry(&["a", "b"], "c.src", "testC").relative_path(), "a/b/c.src");
        assert_eq!(entry(&[], "top.src", "testTop").relative_path(), "top.src");
    }

    #[test]
    fn digest_of_no_entries_is_sha256_of_empty_input() {
        assert_eq!(
            digest(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_changes_with_entries() {
        let one = digest(&[entry(&[], "a.src", "testA")]);
        let two = digest(&[entry(&[], "a.src", "testA"), entry(&[], "b.src", "testB")]);
        assert_ne!(one, two);
        assert_eq!(one.len(), 64);
    }
}
