use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{HarnessError, Result};

/// A fixture file found under the corpus root.
///
/// Identified by its corpus-relative path with `/` separators on every platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixturePath {
    relative: String,
    absolute: PathBuf,
}

impl FixturePath {
    pub fn new(root: &Path, relative: impl Into<String>) -> Self {
        let relative = relative.into();
        let absolute = relative
            .split('/')
            .fold(root.to_path_buf(), |path, segment| path.join(segment));
        Self { relative, absolute }
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Directory segments leading to the file; empty for fixtures at the root.
    pub fn group(&self) -> Vec<String> {
        let mut segments: Vec<String> = self.relative.split('/').map(str::to_string).collect();
        segments.pop();
        segments
    }

    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }

    /// Test identifier derived from the file stem: `beyoundCalls.kt` becomes
    /// `testBeyoundCalls`, `unused-var_2.src` becomes `testUnusedVar_2`.
    pub fn test_id(&self) -> String {
        let name = self.file_name();
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        let mut id = String::from("test");
        for part in stem.split(|c: char| !c.is_ascii_alphanumeric()).filter(|p| !p.is_empty()) {
            if part.starts_with(|c: char| c.is_ascii_digit()) && id.len() > 4 {
                id.push('_');
            }
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                id.push(first.to_ascii_uppercase());
                id.push_str(chars.as_str());
            }
        }
        id
    }

    /// Whether the relative path starts with any of `prefixes`. An empty list
    /// matches everything.
    pub fn matches_any(&self, prefixes: &[String]) -> bool {
        prefixes.is_empty() || prefixes.iter().any(|p| self.relative.starts_with(p.as_str()))
    }
}

/// The fixtures found by one scan, in deterministic order.
///
/// A `Corpus` can be iterated any number of times and always yields the same
/// sequence.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    root: PathBuf,
    fixtures: Vec<FixturePath>,
}

impl Corpus {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FixturePath> {
        self.fixtures.iter()
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// The fixtures whose relative path starts with one of `prefixes`.
    pub fn filter_prefixes(&self, prefixes: &[String]) -> Corpus {
        Corpus {
            root: self.root.clone(),
            fixtures: self
                .fixtures
                .iter()
                .filter(|f| f.matches_any(prefixes))
                .cloned()
                .collect(),
        }
    }

    pub fn into_vec(self) -> Vec<FixturePath> {
        self.fixtures
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a FixturePath;
    type IntoIter = std::slice::Iter<'a, FixturePath>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Discovers fixture files under a corpus root.
///
/// The scan follows this flow:
/// 1. Check the root exists
/// 2. Walk every subdirectory, keeping regular files with the fixture extension
/// 3. Normalize each path to a corpus-relative, `/`-separated key
/// 4. Sort the keys byte-wise so every platform sees the same order
#[derive(Debug, Clone)]
pub struct CorpusScanner {
    root: PathBuf,
    extension: String,
}

impl CorpusScanner {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Recursively scans the root. Read-only.
    pub fn scan(&self) -> Result<Corpus> {
        if !self.root.is_dir() {
            return Err(HarnessError::CorpusNotFound {
                root: self.root.clone(),
            });
        }

        let mut fixtures = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| HarnessError::CorpusWalk {
                root: self.root.clone(),
                message: e.to_string(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.is_fixture_file(path) {
                continue;
            }

            let relative = self.relative_key(path).ok_or_else(|| HarnessError::CorpusWalk {
                root: self.root.clone(),
                message: format!("fixture path `{}` is not valid UTF-8", path.display()),
            })?;
            fixtures.push(FixturePath {
                relative,
                absolute: path.to_path_buf(),
            });
        }
        fixtures.sort();

        Ok(Corpus {
            root: self.root.clone(),
            fixtures,
        })
    }

    // =====================
    // Internal - File System Utilities
    // =====================

    /// Returns true if the path carries the fixture extension (case-sensitive).
    fn is_fixture_file(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.to_str() == Some(self.extension.as_str()))
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect();
        Some(segments?.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_follows_generator_naming() {
        let root = Path::new("corpus");
        assert_eq!(
            FixturePath::new(root, "callableReferences/beyoundCalls.kt").test_id(),
            "testBeyoundCalls"
        );
        assert_eq!(FixturePath::new(root, "unused-var_2.src").test_id(), "testUnusedVar_2");
        assert_eq!(FixturePath::new(root, "42.src").test_id(), "test42");
    }

    #[test]
    fn group_is_directory_segments() {
        let path = FixturePath::new(Path::new("corpus"), "a/b/c.src");
        assert_eq!(path.group(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(path.file_name(), "c.src");
        assert!(FixturePath::new(Path::new("corpus"), "top.src").group().is_empty());
    }

    #[test]
    fn missing_root_is_corpus_not_found() {
        let err = CorpusScanner::new("definitely/not/here", "src").scan().unwrap_err();
        assert!(matches!(err, HarnessError::CorpusNotFound { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_fixture_path_is_a_walk_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.src"), "").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.src")), "").unwrap();

        let err = CorpusScanner::new(dir.path(), "src").scan().unwrap_err();
        match err {
            HarnessError::CorpusWalk { message, .. } => assert!(message.contains("not valid UTF-8")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn prefix_filter_matches_relative_paths() {
        let path = FixturePath::new(Path::new("corpus"), "resolve/calls.src");
        assert!(path.matches_any(&[]));
        assert!(path.matches_any(&["resolve/".to_string()]));
        assert!(!path.matches_any(&["types".to_string()]));
    }
}
