// src/lib.rs
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod host;
pub mod logging;
pub mod memory;
pub mod partition;
pub mod registry;
pub mod resource;
pub mod stream;
pub mod types;

use async_trait::async_trait;

use crate::error::SearchError;
use crate::stream::ProgressSink;
use crate::types::{Query, SearchComplete};

pub use crate::config::{ConfigStore, SearchConfig};
pub use crate::engine::{ProgressCallback, SearchService, SearchServiceBuilder, SplitSearch};
pub use crate::host::{NoActivation, ProviderActivation, ResourceProbe};
pub use crate::logging::{MessageType, ProgressMessage};
pub use crate::memory::{DocumentSource, InMemoryDocument, NoDocuments, OpenDocument, OpenDocuments};
pub use crate::registry::{ProviderRegistration, ProviderRegistry};
pub use crate::resource::ResourceId;
pub use crate::types::{
    FileMatch, FolderQuery, PatternInfo, PreviewOptions, ProgressItem, QueryKind, SearchStats,
    TextRange, TextSearchResult,
};
pub use tokio_util::sync::CancellationToken;

/// A backend that answers queries for one URI scheme.
///
/// A provider is registered per (kind, scheme) with a [`ProviderRegistry`].
/// Every call receives the token governing the whole search; providers
/// should stop early and return [`SearchError::Cancelled`] once it fires.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Name used in logs and statistics.
    fn name(&self) -> &str {
        "provider"
    }

    /// Run a file-name query.
    async fn file_search(
        &self,
        query: &Query,
        token: &CancellationToken,
    ) -> Result<SearchComplete, SearchError>;

    /// Run a text-content query, streaming matches and messages to `progress`
    /// as they are found.
    async fn text_search(
        &self,
        query: &Query,
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<SearchComplete, SearchError>;

    /// Drop any walk cache stored under `cache_key`.
    async fn clear_cache(&self, _cache_key: &str) -> Result<(), SearchError> {
        Ok(())
    }
}
