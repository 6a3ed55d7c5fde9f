use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Information,
    Warning,
}

/// A diagnostic message a provider streams alongside its matches.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub text: String,
    /// Whether the text may be rendered as markup.
    #[serde(default)]
    pub trusted: bool,
}

impl ProgressMessage {
    pub fn new(kind: MessageType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            trusted: false,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageType::Information, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageType::Warning, text)
    }

    pub fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }

    pub fn dedup_key(&self) -> (MessageType, String, bool) {
        (self.kind, self.text.clone(), self.trusted)
    }
}

/// Forward a provider message to the tracing subscriber.
pub fn log_progress_message(message: &ProgressMessage) {
    debug!(
        target: "quarry.search",
        kind = ?message.kind,
        trusted = message.trusted,
        "provider message: {}",
        message.text
    );
}

/// Log a best-effort failure that is intentionally not surfaced to the caller.
pub fn log_suppressed(operation: &str, error: &dyn std::fmt::Display) {
    warn!(target: "quarry.search", operation, %error, "ignoring failure");
}

/// Log the end-to-end time of a search.
pub fn log_search_elapsed(elapsed_ms: u128, error: Option<&dyn std::fmt::Display>) {
    let elapsed_ms = elapsed_ms as u64;
    match error {
        None => trace!(target: "quarry.search", elapsed_ms, "search completed in {elapsed_ms}ms"),
        Some(error) => trace!(
            target: "quarry.search",
            elapsed_ms,
            %error,
            "search failed after {elapsed_ms}ms"
        ),
    }
}
