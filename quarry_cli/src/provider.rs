//! Local-disk search provider for the `file` scheme.
//!
//! Walks use the `ignore` parallel walker on a blocking task so the
//! orchestrator's runtime never blocks on the filesystem. Every walker
//! thread checks the cancellation token before each entry.

use async_trait::async_trait;
use ignore::{DirEntry, Error as IgnoreError, WalkBuilder, WalkState};
use quarry_core::error::SearchError;
use quarry_core::filter::GlobList;
use quarry_core::memory::{text_results, InMemoryDocument, OpenDocument};
use quarry_core::stream::ProgressSink;
use quarry_core::types::{FolderQuery, PatternInfo, Query, SearchComplete};
use quarry_core::{
    CancellationToken, FileMatch, ProgressMessage, ResourceId, ResourceProbe, SearchProvider,
    SearchStats,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;

pub const FILE_SCHEME: &str = "file";

const PROVIDER_NAME: &str = "local-disk";

/// Files larger than this are not searched for text.
const MAX_FILE_BYTES: u64 = 16 * 1024 * 1024;

// ============================================================================
// Walking
// ============================================================================

#[derive(Debug, Clone)]
struct FolderWalk {
    root: PathBuf,
    includes: Vec<GlobList>,
    excludes: Vec<GlobList>,
}

impl FolderWalk {
    fn new(query: &Query, folder: &FolderQuery) -> Self {
        Self {
            root: folder.folder.fs_path(),
            includes: vec![
                GlobList::new(&query.include_pattern),
                GlobList::new(&folder.include_pattern),
            ],
            excludes: vec![
                GlobList::new(&query.exclude_pattern),
                GlobList::new(&folder.exclude_pattern),
            ],
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.excludes
            .iter()
            .any(|globs| globs.matches(relative) || globs.matches(path))
    }

    fn is_included(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.includes
            .iter()
            .all(|globs| globs.is_empty() || globs.matches(relative) || globs.matches(path))
    }

    fn builder(&self) -> WalkBuilder {
        let mut walker = WalkBuilder::new(&self.root);
        walker.standard_filters(false).follow_links(false);

        // Excluded directories are never entered.
        let pruner = self.clone();
        walker.filter_entry(move |entry| entry.depth() == 0 || !pruner.is_excluded(entry.path()));
        walker
    }

    /// Files below the root that pass the filters, sorted by path, and the
    /// number of files seen.
    fn walk(&self, token: &CancellationToken) -> Result<(Vec<PathBuf>, u64), SearchError> {
        let walked = AtomicU64::new(0);
        let (file_tx, file_rx) = mpsc::channel::<PathBuf>();

        self.builder().build_parallel().run(|| {
            let sender = file_tx.clone();
            let walked = &walked;
            Box::new(move |entry: Result<DirEntry, IgnoreError>| {
                if token.is_cancelled() {
                    return WalkState::Quit;
                }
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        debug!(target: "quarry.local_disk", %err, "skipping unreadable entry");
                        return WalkState::Continue;
                    }
                };
                if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
                    return WalkState::Continue;
                }

                walked.fetch_add(1, Ordering::Relaxed);
                let path = entry.path();
                if self.is_excluded(path) || !self.is_included(path) {
                    return WalkState::Continue;
                }
                if sender.send(path.to_path_buf()).is_err() {
                    return WalkState::Quit;
                }
                WalkState::Continue
            })
        });
        drop(file_tx);

        if token.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let mut files: Vec<PathBuf> = file_rx.into_iter().collect();
        // parallel walks visit entries in no fixed order
        files.sort();
        Ok((files, walked.into_inner()))
    }
}

/// Walk every `file:` root of the query. Returns the files and the number of
/// files seen.
fn walk_query(query: &Query, token: &CancellationToken) -> Result<(Vec<PathBuf>, u64), SearchError> {
    let mut walked = 0;
    let mut files = Vec::new();
    for folder in query
        .folder_queries
        .iter()
        .filter(|fq| fq.scheme() == FILE_SCHEME)
    {
        let (found, seen) = FolderWalk::new(query, folder).walk(token)?;
        files.extend(found);
        walked += seen;
    }
    Ok((files, walked))
}

/// Run blocking filesystem work off the async runtime. A token that already
/// fired skips the job.
async fn run_blocking<F, R>(token: &CancellationToken, job: F) -> Result<R, SearchError>
where
    F: FnOnce() -> Result<R, SearchError> + Send + 'static,
    R: Send + 'static,
{
    if token.is_cancelled() {
        return Err(SearchError::Cancelled);
    }
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| SearchError::provider(format!("walk task failed: {err}")))?
}

fn relative_to_roots<'a>(path: &'a Path, roots: &[PathBuf]) -> &'a Path {
    roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
}

/// Matches the name pattern of a file query.
enum NameFilter {
    Glob(GlobList),
    Substring(String),
}

impl NameFilter {
    fn new(pattern: &str) -> Self {
        if pattern.contains(|c| matches!(c, '*' | '?' | '[')) {
            NameFilter::Glob(GlobList::new(&[pattern]))
        } else {
            NameFilter::Substring(pattern.to_lowercase())
        }
    }

    fn matches(&self, relative: &Path) -> bool {
        match self {
            NameFilter::Glob(globs) => globs.matches(relative),
            NameFilter::Substring(needle) => relative
                .to_string_lossy()
                .to_lowercase()
                .contains(needle.as_str()),
        }
    }
}

fn read_text(path: &Path) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;
    if metadata.len() > MAX_FILE_BYTES {
        debug!(target: "quarry.local_disk", path = %path.display(), "skipping large file");
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    String::from_utf8(bytes).ok()
}

fn stats(result_count: usize, start: Instant, walked: u64) -> SearchStats {
    SearchStats::new(PROVIDER_NAME, result_count)
        .with_duration_ms(start.elapsed().as_millis() as u64)
        .with_files_walked(walked)
}

fn limit_message(max_results: usize) -> ProgressMessage {
    ProgressMessage::info(format!("Search stopped after {max_results} results"))
}

/// Search file contents. Runs on a blocking task.
fn grep_query(
    query: &Query,
    pattern: &PatternInfo,
    sink: &ProgressSink,
    token: &CancellationToken,
    start: Instant,
) -> Result<SearchComplete, SearchError> {
    let (files, walked) = walk_query(query, token)?;
    let preview = query.preview_options.unwrap_or_default();
    let mut remaining = query.max_results;
    let mut results = Vec::new();
    let mut limit_hit = false;

    for path in files {
        if token.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let Some(text) = read_text(&path) else {
            continue;
        };
        let Ok(resource) = ResourceId::from_file_path(&path) else {
            continue;
        };

        let document = InMemoryDocument::new(resource.clone(), &text);
        let ask = remaining.map_or(usize::MAX, |left| left.saturating_add(1));
        let mut ranges = document.find_matches(pattern, ask);
        if ranges.is_empty() {
            continue;
        }
        if let Some(left) = remaining {
            if ranges.len() > left {
                ranges.truncate(left);
                limit_hit = true;
            }
            remaining = Some(left - ranges.len());
        }
        if ranges.is_empty() {
            break;
        }

        let file_match = FileMatch::new(resource)
            .with_results(text_results(&document, &ranges, query, preview));
        sink.report_match(file_match.clone());
        results.push(file_match);
        if limit_hit {
            break;
        }
    }

    let match_count: usize = results.iter().map(FileMatch::match_count).sum();
    debug!(
        target: "quarry.local_disk",
        files = results.len(),
        matches = match_count,
        walked,
        limit_hit,
        "text search finished"
    );

    let mut complete = SearchComplete::new(results)
        .with_limit_hit(limit_hit)
        .with_stats(stats(match_count, start, walked));
    if let (true, Some(max)) = (limit_hit, query.max_results) {
        let message = limit_message(max);
        sink.report_message(message.clone());
        complete = complete.with_message(message);
    }
    Ok(complete)
}

// ============================================================================
// LocalDiskProvider
// ============================================================================

#[derive(Debug, Clone)]
struct CachedWalk {
    roots: Vec<PathBuf>,
    files: Arc<Vec<PathBuf>>,
    walked: u64,
}

/// Provider for `file:` roots. File-name walks are cached per query cache key.
#[derive(Debug, Default)]
pub struct LocalDiskProvider {
    walks: Mutex<HashMap<String, CachedWalk>>,
}

impl LocalDiskProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached_walk(&self, key: &str, roots: &[PathBuf]) -> Option<CachedWalk> {
        self.walks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .filter(|walk| walk.roots == roots)
            .cloned()
    }

    fn store_walk(&self, key: String, walk: CachedWalk) {
        self.walks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, walk);
    }

    /// Cache keys with a stored walk, sorted.
    #[cfg(test)]
    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .walks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SearchProvider for LocalDiskProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn file_search(
        &self,
        query: &Query,
        token: &CancellationToken,
    ) -> Result<SearchComplete, SearchError> {
        let start = Instant::now();
        let roots: Vec<PathBuf> = query
            .folder_queries
            .iter()
            .map(|fq| fq.folder.fs_path())
            .collect();

        let cached = query
            .cache_key
            .as_deref()
            .and_then(|key| self.cached_walk(key, &roots));
        let cache_hit = cached.is_some();
        let walk = match cached {
            Some(walk) => walk,
            None => {
                let owned_query = query.clone();
                let owned_token = token.clone();
                let (files, walked) =
                    run_blocking(token, move || walk_query(&owned_query, &owned_token)).await?;
                let walk = CachedWalk {
                    roots,
                    files: Arc::new(files),
                    walked,
                };
                if let Some(key) = &query.cache_key {
                    self.store_walk(key.clone(), walk.clone());
                }
                walk
            }
        };
        if token.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let name_filter = query.file_pattern.as_deref().map(NameFilter::new);
        let mut results = Vec::new();
        let mut limit_hit = false;
        for path in walk.files.iter() {
            let relative = relative_to_roots(path, &walk.roots);
            if let Some(filter) = &name_filter {
                if !filter.matches(relative) {
                    continue;
                }
            }
            if query.max_results.is_some_and(|max| results.len() >= max) {
                limit_hit = true;
                break;
            }
            match ResourceId::from_file_path(path) {
                Ok(resource) => results.push(FileMatch::new(resource)),
                Err(err) => debug!(target: "quarry.local_disk", %err, "skipping path"),
            }
        }

        debug!(
            target: "quarry.local_disk",
            files = results.len(),
            walked = walk.walked,
            cache_hit,
            limit_hit,
            "file search finished"
        );
        let count = results.len();
        Ok(SearchComplete::new(results)
            .with_limit_hit(limit_hit)
            .with_stats(stats(count, start, walk.walked).with_cache_hit(cache_hit)))
    }

    async fn text_search(
        &self,
        query: &Query,
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<SearchComplete, SearchError> {
        let start = Instant::now();
        let Some(pattern) = query.content_pattern.clone() else {
            return Err(SearchError::InvalidQuery(
                "text search without a content pattern".to_string(),
            ));
        };
        let owned_query = query.clone();
        let sink = progress.clone();
        let owned_token = token.clone();
        run_blocking(token, move || {
            grep_query(&owned_query, &pattern, &sink, &owned_token, start)
        })
        .await
    }

    async fn clear_cache(&self, cache_key: &str) -> Result<(), SearchError> {
        let removed = self
            .walks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(cache_key)
            .is_some();
        debug!(target: "quarry.local_disk", cache_key, removed, "cache cleared");
        Ok(())
    }
}

/// Resource checks against the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProbe;

#[async_trait]
impl ResourceProbe for LocalProbe {
    async fn exists(&self, resource: &ResourceId) -> bool {
        resource.scheme() == FILE_SCHEME
            && tokio::fs::try_exists(resource.fs_path())
                .await
                .unwrap_or(false)
    }

    fn has_provider(&self, scheme: &str) -> bool {
        scheme == FILE_SCHEME
    }
}
