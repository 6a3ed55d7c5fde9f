//! Search configuration.
//!
//! Everything has sensible defaults; a YAML file only needs the keys it
//! wants to change.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

// ============================================================================
// Default Values
// ============================================================================

/// Overlay schemes whose open documents never appear in results.
pub const DEFAULT_EXCLUDED_SCHEMES: &[&str] = &["git"];

/// Scheme of unsaved documents that have no backing resource provider.
pub const DEFAULT_UNTITLED_SCHEME: &str = "untitled";

/// Language id of documents that display a previous search result.
pub const DEFAULT_SEARCH_RESULT_LANGUAGE: &str = "search-result";

/// Include glob that opts search-result documents back into a search.
pub const DEFAULT_SEARCH_RESULT_GLOB: &str = "**/*.code-search";

pub const DEFAULT_WORD_SEPARATORS: &str = "`~!@#$%^&*()-=+[{]}\\|;:'\",.<>/?";

pub const DEFAULT_PREVIEW_CHARS_PER_LINE: usize = 250;

// ============================================================================
// SearchConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Schemes skipped by the in-memory matcher (default: git)
    #[serde(default = "default_excluded_schemes")]
    pub excluded_schemes: Vec<String>,

    #[serde(default = "default_untitled_scheme")]
    pub untitled_scheme: String,

    #[serde(default = "default_search_result_language")]
    pub search_result_language: String,

    #[serde(default = "default_search_result_glob")]
    pub search_result_glob: String,

    /// Used for whole-word matching when the pattern carries no separators
    #[serde(default = "default_word_separators")]
    pub word_separators: String,

    /// Result cap applied by front ends when the user gives none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_results: Option<usize>,

    #[serde(default = "default_preview_chars_per_line")]
    pub preview_chars_per_line: usize,
}

fn default_excluded_schemes() -> Vec<String> {
    DEFAULT_EXCLUDED_SCHEMES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_untitled_scheme() -> String {
    DEFAULT_UNTITLED_SCHEME.to_string()
}

fn default_search_result_language() -> String {
    DEFAULT_SEARCH_RESULT_LANGUAGE.to_string()
}

fn default_search_result_glob() -> String {
    DEFAULT_SEARCH_RESULT_GLOB.to_string()
}

fn default_word_separators() -> String {
    DEFAULT_WORD_SEPARATORS.to_string()
}

fn default_preview_chars_per_line() -> usize {
    DEFAULT_PREVIEW_CHARS_PER_LINE
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            excluded_schemes: default_excluded_schemes(),
            untitled_scheme: default_untitled_scheme(),
            search_result_language: default_search_result_language(),
            search_result_glob: default_search_result_glob(),
            word_separators: default_word_separators(),
            default_max_results: None,
            preview_chars_per_line: DEFAULT_PREVIEW_CHARS_PER_LINE,
        }
    }
}

impl SearchConfig {
    pub fn is_excluded_scheme(&self, scheme: &str) -> bool {
        self.excluded_schemes.iter().any(|s| s == scheme)
    }
}

// ============================================================================
// ConfigStore
// ============================================================================

/// Location of the YAML configuration file.
///
/// Defaults to `~/.config/quarry/config.yaml`.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new_default() -> Self {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("quarry").join("config.yaml"),
        }
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the configuration. A missing file yields the defaults.
    pub fn load(&self) -> Result<SearchConfig> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(SearchConfig::default()),
            Ok(content) => Ok(serde_yaml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SearchConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`ConfigStore::load`], but falls back to defaults on a broken file.
    pub fn load_or_default(&self) -> SearchConfig {
        self.load().unwrap_or_else(|err| {
            warn!(
                target: "quarry.config",
                path = %self.path.display(),
                %err,
                "invalid config, using defaults"
            );
            SearchConfig::default()
        })
    }

    pub fn save(&self, config: &SearchConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(config)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert!(config.is_excluded_scheme("git"));
        assert!(!config.is_excluded_scheme("file"));
        assert_eq!(config.untitled_scheme, "untitled");
        assert_eq!(config.preview_chars_per_line, DEFAULT_PREVIEW_CHARS_PER_LINE);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SearchConfig =
            serde_yaml::from_str("excluded_schemes: [git, gitlens]\ndefault_max_results: 50\n")
                .unwrap();
        assert!(config.is_excluded_scheme("gitlens"));
        assert_eq!(config.default_max_results, Some(50));
        assert_eq!(config.search_result_glob, DEFAULT_SEARCH_RESULT_GLOB);
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.yaml"));
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), SearchConfig::default());

        let config = SearchConfig {
            default_max_results: Some(10),
            ..SearchConfig::default()
        };
        store.save(&config).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), config);
    }

    #[test]
    fn test_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "excluded_schemes: {not: [a list").unwrap();
        let store = ConfigStore::new(path);
        assert!(store.load().is_err());
        assert_eq!(store.load_or_default(), SearchConfig::default());
    }
}
