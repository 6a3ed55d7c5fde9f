//! Search orchestration.
//!
//! Fans one query out to the providers registered for the schemes it
//! touches, merges their streamed progress with the in-memory results and
//! reduces the per-scheme completions into one.

use futures::future::{join_all, try_join_all, BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::host::{NoActivation, ProviderActivation, ResourceProbe};
use crate::logging::{log_progress_message, log_search_elapsed, log_suppressed};
use crate::memory::{open_document_results, DocumentSource, NoDocuments, OpenDocumentResults};
use crate::partition::{partition, schemes_in_query};
use crate::registry::{ProviderRegistration, ProviderRegistry};
use crate::stream::ProgressSink;
use crate::types::{dedup_messages, ProgressItem, Query, QueryKind, SearchComplete};
use crate::SearchProvider;

/// Receives matches and messages while a search runs.
pub type ProgressCallback = Arc<dyn Fn(ProgressItem) + Send + Sync>;

/// A text search split into its two phases.
pub struct SplitSearch {
    /// Matches from open documents, already delivered to the progress callback.
    pub immediate: SearchComplete,
    /// The provider phase. Its results never repeat a resource from `immediate`.
    pub deferred: BoxFuture<'static, Result<SearchComplete>>,
}

impl std::fmt::Debug for SplitSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitSearch")
            .field("immediate", &self.immediate)
            .finish_non_exhaustive()
    }
}

struct ServiceInner {
    registry: ProviderRegistry,
    documents: Arc<dyn DocumentSource>,
    probe: Arc<dyn ResourceProbe>,
    activation: Arc<dyn ProviderActivation>,
    config: SearchConfig,
    /// Schemes already reported as having no provider.
    warned_schemes: Mutex<HashSet<String>>,
}

/// Entry point for file-name and text searches.
#[derive(Clone)]
pub struct SearchService {
    inner: Arc<ServiceInner>,
}

pub struct SearchServiceBuilder {
    probe: Arc<dyn ResourceProbe>,
    registry: ProviderRegistry,
    documents: Arc<dyn DocumentSource>,
    activation: Arc<dyn ProviderActivation>,
    config: SearchConfig,
}

impl SearchServiceBuilder {
    pub fn new(probe: Arc<dyn ResourceProbe>) -> Self {
        Self {
            probe,
            registry: ProviderRegistry::new(),
            documents: Arc::new(NoDocuments),
            activation: Arc::new(NoActivation),
            config: SearchConfig::default(),
        }
    }

    /// Share an existing registry instead of creating a fresh one.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentSource>) -> Self {
        self.documents = documents;
        self
    }

    pub fn activation(mut self, activation: Arc<dyn ProviderActivation>) -> Self {
        self.activation = activation;
        self
    }

    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SearchService {
        SearchService {
            inner: Arc::new(ServiceInner {
                registry: self.registry,
                documents: self.documents,
                probe: self.probe,
                activation: self.activation,
                config: self.config,
                warned_schemes: Mutex::new(HashSet::new()),
            }),
        }
    }
}

impl SearchService {
    pub fn builder(probe: Arc<dyn ResourceProbe>) -> SearchServiceBuilder {
        SearchServiceBuilder::new(probe)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &SearchConfig {
        &self.inner.config
    }

    pub fn register_provider(
        &self,
        scheme: impl Into<String>,
        kind: QueryKind,
        provider: Arc<dyn SearchProvider>,
    ) -> ProviderRegistration {
        self.inner.registry.register(scheme, kind, provider)
    }

    /// Run `query`, dispatching on its kind.
    pub async fn search(
        &self,
        query: Query,
        token: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> Result<SearchComplete> {
        match query.kind() {
            QueryKind::File => self.file_search(query, token).await,
            QueryKind::Text => self.text_search(query, token, on_progress).await,
        }
    }

    pub async fn file_search(
        &self,
        query: Query,
        token: &CancellationToken,
    ) -> Result<SearchComplete> {
        query.validate()?;
        if query.is_text() {
            return Err(SearchError::InvalidQuery(
                "file search needs a file query".to_string(),
            ));
        }
        let known = Arc::new(OpenDocumentResults::default());
        self.run_providers(query, token.clone(), None, known).await
    }

    /// Run a text query to completion.
    ///
    /// Open-document matches come first in the result, followed by provider
    /// matches for every other resource.
    pub async fn text_search(
        &self,
        query: Query,
        token: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> Result<SearchComplete> {
        let SplitSearch {
            immediate,
            deferred,
        } = self.text_search_split(query, token, on_progress)?;
        let deferred = deferred.await?;

        let mut messages = immediate.messages;
        messages.extend(deferred.messages);
        let mut results = immediate.results;
        results.extend(deferred.results);

        Ok(SearchComplete {
            limit_hit: immediate.limit_hit || deferred.limit_hit,
            results,
            messages: dedup_messages(messages),
            stats: deferred.stats,
        })
    }

    /// Search open documents now and hand back the provider phase as a future.
    ///
    /// Matching documents are delivered to `on_progress` before this returns.
    pub fn text_search_split(
        &self,
        query: Query,
        token: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> Result<SplitSearch> {
        query.validate()?;
        if !query.is_text() {
            return Err(SearchError::InvalidQuery(
                "text search needs a text query".to_string(),
            ));
        }

        let known = Arc::new(open_document_results(
            &query,
            self.inner.documents.as_ref(),
            self.inner.probe.as_ref(),
            &self.inner.config,
        ));
        if let Some(callback) = &on_progress {
            if !token.is_cancelled() {
                for file_match in known.matches() {
                    callback(ProgressItem::Match(file_match.clone()));
                }
            }
        }

        let immediate = known.to_complete();
        let service = self.clone();
        let token = token.clone();
        let deferred =
            async move { service.run_providers(query, token, on_progress, known).await }.boxed();

        Ok(SplitSearch {
            immediate,
            deferred,
        })
    }

    /// Ask every file-name provider to drop its cache for `cache_key`.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn clear_cache(&self, cache_key: &str) {
        let providers = self.inner.registry.providers(QueryKind::File);
        let results = join_all(providers.iter().map(|p| p.clear_cache(cache_key))).await;
        for (provider, result) in providers.iter().zip(results) {
            if let Err(err) = result {
                warn!(
                    target: "quarry.search",
                    provider = provider.name(),
                    cache_key,
                    %err,
                    "failed to clear search cache"
                );
            }
        }
    }

    async fn run_providers(
        &self,
        query: Query,
        token: CancellationToken,
        on_progress: Option<ProgressCallback>,
        known: Arc<OpenDocumentResults>,
    ) -> Result<SearchComplete> {
        trace!(target: "quarry.search", ?query, "search");
        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SearchError::Cancelled),
            result = self.provider_phase(query, &token, on_progress.as_ref(), &known) => result,
        };

        let error = outcome.as_ref().err().map(|err| err as &dyn std::fmt::Display);
        log_search_elapsed(start.elapsed().as_millis(), error);
        outcome
    }

    async fn provider_phase(
        &self,
        mut query: Query,
        token: &CancellationToken,
        on_progress: Option<&ProgressCallback>,
        known: &OpenDocumentResults,
    ) -> Result<SearchComplete> {
        let kind = query.kind();
        let schemes = schemes_in_query(&query);
        if let Err(err) = self.inner.activation.activate(kind, &schemes).await {
            log_suppressed("provider activation", &err);
        }
        if token.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let exists = join_all(
            query
                .folder_queries
                .iter()
                .map(|fq| self.inner.probe.exists(&fq.folder)),
        )
        .await;
        let mut exists = exists.into_iter();
        query
            .folder_queries
            .retain(|_| exists.next().unwrap_or(false));

        let parts = partition(&query);
        let registry = &self.inner.registry;
        let some_scheme_has_provider = parts.iter().any(|(scheme, _)| registry.has(kind, scheme));

        let (sink, mut receiver) = ProgressSink::channel();
        let mut searches = Vec::with_capacity(parts.len());
        for (scheme, sub_query) in parts {
            if !registry.has(kind, &scheme) {
                self.warn_missing_provider(kind, &scheme, some_scheme_has_provider);
                if some_scheme_has_provider {
                    continue;
                }
            }
            let pending = registry.await_provider(kind, &scheme);
            let sink = sink.clone();
            let token = token.clone();
            searches.push(async move {
                let provider = pending.await.ok_or_else(|| {
                    SearchError::provider(format!("no search provider for scheme {scheme}"))
                })?;
                trace!(
                    target: "quarry.search",
                    %kind,
                    scheme = scheme.as_str(),
                    provider = provider.name(),
                    "dispatching sub-search"
                );
                let result = match kind {
                    QueryKind::File => provider.file_search(&sub_query, &token).await,
                    QueryKind::Text => provider.text_search(&sub_query, &sink, &token).await,
                };
                result.map_err(structured_provider_error)
            });
        }
        drop(sink);

        let dispatch = try_join_all(searches);
        tokio::pin!(dispatch);
        let completes = loop {
            tokio::select! {
                biased;
                Some(item) = receiver.recv() => deliver(item, token, on_progress, known),
                result = &mut dispatch => break result,
            }
        };
        while let Ok(item) = receiver.try_recv() {
            deliver(item, token, on_progress, known);
        }

        let completes = completes.map_err(|err| {
            trace!(target: "quarry.search", %err, "search error");
            err
        })?;
        Ok(reduce(completes, known))
    }

    fn warn_missing_provider(&self, kind: QueryKind, scheme: &str, not_waiting: bool) {
        let first_time = self
            .inner
            .warned_schemes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scheme.to_string());
        if !first_time {
            return;
        }
        if not_waiting {
            warn!(
                target: "quarry.search",
                %kind,
                scheme,
                "no search provider registered for scheme; another scheme has one, not waiting"
            );
        } else {
            warn!(
                target: "quarry.search",
                %kind,
                scheme,
                "no search provider registered for scheme, waiting"
            );
        }
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Forward one provider progress item to the caller.
fn deliver(
    item: ProgressItem,
    token: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
    known: &OpenDocumentResults,
) {
    if token.is_cancelled() {
        return;
    }
    match &item {
        ProgressItem::Match(file_match) if known.contains(&file_match.resource) => {
            trace!(
                target: "quarry.search",
                resource = %file_match.resource,
                "open document already reported, dropping provider match"
            );
            return;
        }
        ProgressItem::Match(_) => {}
        ProgressItem::Message(message) => log_progress_message(message),
    }
    if let Some(callback) = on_progress {
        callback(item);
    }
}

/// Providers across a process boundary reject with a serialized error object.
fn structured_provider_error(err: SearchError) -> SearchError {
    match err {
        SearchError::Provider {
            message,
            code: None,
        } if message.trim_start().starts_with('{') => SearchError::from_provider_payload(&message),
        other => other,
    }
}

/// Fold per-scheme completions into one.
///
/// Statistics come from the first completion only.
fn reduce(completes: Vec<SearchComplete>, known: &OpenDocumentResults) -> SearchComplete {
    let limit_hit = completes.iter().any(|c| c.limit_hit);
    let stats = completes.first().and_then(|c| c.stats.clone());
    let messages = dedup_messages(completes.iter().flat_map(|c| c.messages.iter().cloned()));
    let results = completes
        .into_iter()
        .flat_map(|c| c.results)
        .filter(|file_match| !known.contains(&file_match.resource))
        .collect();

    SearchComplete {
        limit_hit,
        results,
        messages,
        stats,
    }
}
