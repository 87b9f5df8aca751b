//! Harness configuration and its layering.
//!
//! Settings are resolved lowest to highest: built-in defaults, then a YAML file
//! (`diagcheck.yaml`), then environment variables, then command-line flags. The CLI
//! applies the last layer; this module owns the first three.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{HarnessError, Result};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "diagcheck.yaml";

/// Forces update mode when set to `1` or `true`.
pub const ENV_UPDATE: &str = "DIAGCHECK_UPDATE";
/// Adds a fixture path prefix to the selection.
pub const ENV_FILTER: &str = "DIAGCHECK_FILTER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Compare and report.
    #[default]
    Check,
    /// Compare, then rewrite failing fixtures with the actual diagnostics.
    Update,
}

/// Everything a [`Harness`](crate::harness::Harness) run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub corpus_root: PathBuf,
    /// Fixture file extension, without the leading dot.
    pub extension: String,
    /// Registry to check completeness against. No check when `None`.
    pub registry: Option<PathBuf>,
    /// Relative path prefixes selecting fixtures; empty selects all.
    pub prefixes: Vec<String>,
    pub jobs: usize,
    pub timeout: Duration,
    pub mode: RunMode,
    pub fail_fast: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            corpus_root: PathBuf::from("tests/diagnostics"),
            extension: "src".to_string(),
            registry: None,
            prefixes: Vec::new(),
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            timeout: Duration::from_secs(30),
            mode: RunMode::Check,
            fail_fast: false,
        }
    }
}

impl HarnessConfig {
    /// Overlays the values a config file sets. Relative paths in the file are
    /// resolved against `base`, the file's directory.
    pub fn apply_file(&mut self, file: &FileConfig, base: &Path) {
        if let Some(root) = &file.corpus_root {
            self.corpus_root = base.join(root);
        }
        if let Some(extension) = &file.extension {
            self.extension = extension.trim_start_matches('.').to_string();
        }
        if let Some(registry) = &file.registry {
            self.registry = Some(base.join(registry));
        }
        if !file.prefixes.is_empty() {
            self.prefixes = file.prefixes.clone();
        }
        if let Some(jobs) = file.jobs {
            self.jobs = jobs;
        }
        if let Some(ms) = file.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(fail_fast) = file.fail_fast {
            self.fail_fast = fail_fast;
        }
    }

    /// Overlays `DIAGCHECK_UPDATE` and `DIAGCHECK_FILTER`, read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if var(ENV_UPDATE).is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            self.mode = RunMode::Update;
        }
        if let Some(prefix) = var(ENV_FILTER).filter(|p| !p.is_empty()) {
            if !self.prefixes.contains(&prefix) {
                self.prefixes.push(prefix);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(HarnessError::config("`jobs` must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(HarnessError::config("`timeout_ms` must be greater than 0"));
        }
        if self.extension.is_empty() {
            return Err(HarnessError::config("`extension` must not be empty"));
        }
        Ok(())
    }
}

/// The on-disk shape of `diagcheck.yaml`.
///
/// ```yaml
/// corpus_root: tests/diagnostics
/// extension: src
/// registry: tests/diagnostics/registry.json
/// jobs: 4
/// timeout_ms: 10000
/// analyzer: [./target/debug/frontend, --emit-json]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub corpus_root: Option<PathBuf>,
    pub extension: Option<String>,
    pub registry: Option<PathBuf>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    pub jobs: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub fail_fast: Option<bool>,
    /// Analyzer command line, program first. It runs in the config file's directory.
    pub analyzer: Option<Vec<String>>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| HarnessError::config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::config(format!("cannot read `{}`: {e}", path.display())))?;
        serde_yaml::from_str(&text)
            .map_err(|e| HarnessError::config(format!("in `{}`: {e}", path.display())))
    }

    /// Loads `explicit` if given (it must exist), otherwise `diagcheck.yaml` from
    /// `dir` when present. Returns the config together with the directory its
    /// relative paths are resolved against.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = dir.join(CONFIG_FILE);
                if !candidate.is_file() {
                    return Ok(None);
                }
                candidate
            }
        };
        let config = Self::load(&path)?;
        let base = path
            .parent()
            .map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
        Ok(Some((config, base)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = HarnessConfig::default();
        assert_eq!(config.corpus_root, PathBuf::from("tests/diagnostics"));
        assert_eq!(config.extension, "src");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.mode, RunMode::Check);
        assert!(config.jobs >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let file = FileConfig::parse(
            "corpus_root: corpus\nextension: .kt\njobs: 2\ntimeout_ms: 250\nanalyzer: [fe, --json]\n",
        )
        .unwrap();
        let mut config = HarnessConfig::default();
        config.apply_file(&file, Path::new("/work"));
        assert_eq!(config.corpus_root, PathBuf::from("/work/corpus"));
        assert_eq!(config.extension, "kt");
        assert_eq!(config.jobs, 2);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(file.analyzer, Some(vec!["fe".to_string(), "--json".to_string()]));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = FileConfig::parse("corpus: x\n").unwrap_err();
        assert!(matches!(err, HarnessError::Config { .. }));
    }

    #[test]
    fn env_layer_forces_update_and_adds_prefix() {
        let env: HashMap<&str, &str> = [(ENV_UPDATE, "1"), (ENV_FILTER, "resolve/")].into();
        let mut config = HarnessConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.mode, RunMode::Update);
        assert_eq!(config.prefixes, vec!["resolve/".to_string()]);
    }

    #[test]
    fn zero_jobs_is_invalid() {
        let config = HarnessConfig {
            jobs: 0,
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
