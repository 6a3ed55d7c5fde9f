//! Include/exclude glob filtering.

use crate::types::Query;
use glob::{MatchOptions, Pattern};
use std::path::Path;
use tracing::debug;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled list of glob patterns. Matches if any pattern matches.
#[derive(Debug, Clone, Default)]
pub struct GlobList {
    patterns: Vec<Pattern>,
}

impl GlobList {
    /// Compile `globs`, skipping (and logging) any that fail to parse.
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    debug!(target: "quarry.filter", glob = glob.as_ref(), %err, "ignoring invalid glob");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Match against the whole path; separator-free patterns such as
    /// `node_modules` or `*.log` also match any single path component.
    pub fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern.matches_path_with(path, MATCH_OPTIONS) {
                return true;
            }
            !pattern.as_str().contains('/')
                && path.components().any(|component| {
                    pattern.matches_with(&component.as_os_str().to_string_lossy(), MATCH_OPTIONS)
                })
        })
    }
}

/// Decide whether `fs_path` passes the query's include and exclude filters.
pub fn path_included_in_query(query: &Query, fs_path: &Path) -> bool {
    if GlobList::new(&query.exclude_pattern).matches(fs_path) {
        return false;
    }

    if query.include_pattern.is_empty() && !query.using_search_paths {
        return true;
    }

    if GlobList::new(&query.include_pattern).matches(fs_path) {
        return true;
    }

    // With search paths, the file must sit under a folder root and satisfy that
    // folder's own include pattern, if it has one.
    if query.using_search_paths {
        return query.folder_queries.iter().any(|fq| {
            let root = fq.folder.fs_path();
            match fs_path.strip_prefix(&root) {
                Ok(relative) => {
                    fq.include_pattern.is_empty()
                        || GlobList::new(&fq.include_pattern).matches(relative)
                }
                Err(_) => false,
            }
        });
    }

    false
}
