#![allow(dead_code)]

use async_trait::async_trait;
use quarry_core::error::SearchError;
use quarry_core::stream::ProgressSink;
use quarry_core::types::{Query, SearchComplete};
use quarry_core::{
    CancellationToken, FileMatch, FolderQuery, ProgressCallback, ProgressItem, ProgressMessage,
    ProviderActivation, QueryKind, ResourceId, ResourceProbe, SearchProvider, SearchStats,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn id(uri: &str) -> ResourceId {
    ResourceId::parse(uri).unwrap()
}

pub fn folder(uri: &str) -> FolderQuery {
    FolderQuery::new(id(uri))
}

/// Probe where every resource exists unless listed as missing.
#[derive(Default)]
pub struct FakeProbe {
    missing: HashSet<String>,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_missing(uris: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            missing: uris.iter().map(|u| u.to_string()).collect(),
        })
    }
}

#[async_trait]
impl ResourceProbe for FakeProbe {
    async fn exists(&self, resource: &ResourceId) -> bool {
        !self.missing.contains(&resource.to_string())
    }

    fn has_provider(&self, scheme: &str) -> bool {
        matches!(scheme, "file" | "vfs" | "git")
    }
}

/// A scripted provider that records the queries it receives.
pub struct FakeProvider {
    name: String,
    matches: Vec<FileMatch>,
    messages: Vec<ProgressMessage>,
    limit_hit: bool,
    delay: Option<Duration>,
    failure: Option<String>,
    cancels: bool,
    clear_failure: Option<String>,
    pub calls: AtomicUsize,
    pub cache_clears: AtomicUsize,
    pub queries: Mutex<Vec<Query>>,
}

impl FakeProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            matches: Vec::new(),
            messages: Vec::new(),
            limit_hit: false,
            delay: None,
            failure: None,
            cancels: false,
            clear_failure: None,
            calls: AtomicUsize::new(0),
            cache_clears: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_match(mut self, uri: &str) -> Self {
        self.matches.push(FileMatch::new(id(uri)));
        self
    }

    pub fn with_message(mut self, message: ProgressMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_limit_hit(mut self) -> Self {
        self.limit_hit = true;
        self
    }

    /// Report matches, then wait this long before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, error: &str) -> Self {
        self.failure = Some(error.to_string());
        self
    }

    /// Give up with `Cancelled` on its own, without the token firing.
    pub fn cancelling(mut self) -> Self {
        self.cancels = true;
        self
    }

    pub fn failing_clear(mut self, error: &str) -> Self {
        self.clear_failure = Some(error.to_string());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<Query> {
        self.queries.lock().unwrap().last().cloned()
    }

    async fn run(
        &self,
        query: &Query,
        progress: Option<&ProgressSink>,
        token: &CancellationToken,
    ) -> Result<SearchComplete, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());

        if let Some(sink) = progress {
            for file_match in &self.matches {
                sink.report_match(file_match.clone());
            }
            for message in &self.messages {
                sink.report_message(message.clone());
            }
        }

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = token.cancelled() => return Err(SearchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if self.cancels {
            return Err(SearchError::Cancelled);
        }
        if let Some(failure) = &self.failure {
            return Err(SearchError::provider(failure.clone()));
        }

        let mut complete = SearchComplete::new(self.matches.clone())
            .with_limit_hit(self.limit_hit)
            .with_stats(SearchStats::new(self.name.clone(), self.matches.len()));
        for message in &self.messages {
            complete = complete.with_message(message.clone());
        }
        Ok(complete)
    }
}

#[async_trait]
impl SearchProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn file_search(
        &self,
        query: &Query,
        token: &CancellationToken,
    ) -> Result<SearchComplete, SearchError> {
        self.run(query, None, token).await
    }

    async fn text_search(
        &self,
        query: &Query,
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<SearchComplete, SearchError> {
        self.run(query, Some(progress), token).await
    }

    async fn clear_cache(&self, _cache_key: &str) -> Result<(), SearchError> {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
        match &self.clear_failure {
            Some(failure) => Err(SearchError::provider(failure.clone())),
            None => Ok(()),
        }
    }
}

/// Activation that takes a while, or fails.
pub struct SlowActivation {
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl SlowActivation {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderActivation for SlowActivation {
    async fn activate(&self, _kind: QueryKind, _schemes: &[String]) -> Result<(), SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(SearchError::provider("extension host crashed"));
        }
        Ok(())
    }
}

/// Collects everything delivered through a progress callback.
#[derive(Clone, Default)]
pub struct Recorder {
    items: Arc<Mutex<Vec<ProgressItem>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> Option<ProgressCallback> {
        let items = Arc::clone(&self.items);
        let callback: ProgressCallback =
            Arc::new(move |item: ProgressItem| items.lock().unwrap().push(item));
        Some(callback)
    }

    pub fn items(&self) -> Vec<ProgressItem> {
        self.items.lock().unwrap().clone()
    }

    /// Resources of delivered matches, in delivery order.
    pub fn match_resources(&self) -> Vec<String> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                ProgressItem::Match(m) => Some(m.resource.to_string()),
                ProgressItem::Message(_) => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<ProgressMessage> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                ProgressItem::Message(m) => Some(m),
                ProgressItem::Match(_) => None,
            })
            .collect()
    }
}

pub fn resources(complete: &SearchComplete) -> Vec<String> {
    complete
        .results
        .iter()
        .map(|m| m.resource.to_string())
        .collect()
}
