// src/error.rs
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search was cancelled")]
    Cancelled,

    #[error("Provider error: {message}")]
    Provider {
        message: String,
        code: Option<String>,
    },

    #[error("Unknown search provider kind: {0}")]
    UnknownProviderKind(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Shape of a serialized provider failure.
#[derive(Debug, Deserialize)]
struct ProviderErrorPayload {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl SearchError {
    pub fn provider(message: impl Into<String>) -> Self {
        SearchError::Provider {
            message: message.into(),
            code: None,
        }
    }

    /// Rebuild a provider error from the raw text a provider rejected with.
    ///
    /// Providers living across a process boundary hand back a JSON object of the
    /// form `{"message": "...", "code": "..."}`; anything else is kept verbatim.
    pub fn from_provider_payload(raw: &str) -> Self {
        match serde_json::from_str::<ProviderErrorPayload>(raw) {
            Ok(payload) => SearchError::Provider {
                message: payload.message,
                code: payload.code,
            },
            Err(_) => SearchError::provider(raw),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchError::Cancelled)
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            SearchError::Cancelled => "cancelled",
            SearchError::Provider { .. } => "provider_error",
            SearchError::UnknownProviderKind(_) => "unknown_provider_kind",
            SearchError::InvalidQuery(_) => "invalid_query",
            SearchError::InvalidResource(_) => "invalid_resource",
            SearchError::Io(_) => "io_error",
            SearchError::SerdeJson(_) | SearchError::Yaml(_) => "parse_error",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let code = match self {
            SearchError::Provider {
                code: Some(code), ..
            } => code.clone(),
            err => err.code_str().to_string(),
        };
        let message = match self {
            SearchError::Provider { message, .. } => message.clone(),
            err => err.to_string(),
        };

        json!({
            "code": code,
            "message": message,
        })
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
