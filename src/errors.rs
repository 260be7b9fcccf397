use thiserror::Error;

/// Errors surfaced by the widget core and its hosts.
/// None of these are fatal to a session; callers log them and carry on.
#[derive(Debug, Error)]
pub enum WidgetError {
    // ── Persistence ──────────────────────────────────────────────────────────
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    // ── Transport ────────────────────────────────────────────────────────────
    #[error("Failed to connect to {url}: {message}")]
    ConnectFailed { url: String, message: String },

    #[error("Channel send failed: {message}")]
    ChannelSend { message: String },

    // ── Protocol ─────────────────────────────────────────────────────────────
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WidgetError {
    pub fn storage(message: impl Into<String>) -> Self {
        WidgetError::StorageUnavailable { message: message.into() }
    }

    pub fn send(message: impl Into<String>) -> Self {
        WidgetError::ChannelSend { message: message.into() }
    }
}
