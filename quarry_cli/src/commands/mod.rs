pub mod config;
pub mod search;

use crate::cli::Cli;
use crate::provider::{LocalDiskProvider, LocalProbe, FILE_SCHEME};
use quarry_core::error::SearchError;
use quarry_core::{ConfigStore, QueryKind, SearchConfig, SearchService};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid search root '{0}'")]
    InvalidRoot(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CommandError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Search(err) if err.is_cancelled())
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// The config store selected by `--config` / `QUARRY_CONFIG`, or the default location.
pub fn config_store(cli: &Cli) -> ConfigStore {
    match &cli.config {
        Some(path) => ConfigStore::new(path.clone()),
        None => ConfigStore::new_default(),
    }
}

pub fn load_config(cli: &Cli) -> Result<SearchConfig> {
    config_store(cli)
        .load()
        .map_err(|err| CommandError::InvalidConfig(err.to_string()))
}

/// A search service with the local-disk provider installed for `file:` roots.
pub fn build_service(config: SearchConfig) -> SearchService {
    let provider = Arc::new(LocalDiskProvider::new());
    let service = SearchService::builder(Arc::new(LocalProbe))
        .config(config)
        .build();
    // Registrations live as long as the process.
    let _files = service.register_provider(FILE_SCHEME, QueryKind::File, provider.clone());
    let _text = service.register_provider(FILE_SCHEME, QueryKind::Text, provider);
    service
}
