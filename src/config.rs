use std::time::Duration;

use crate::errors::WidgetError;
use crate::session::ConversationId;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8000";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
pub const DEFAULT_STORAGE_KEY: &str = "threadId";

/// Settings for one widget instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetConfig {
    pub site_id: String,
    pub server_url: String,
    pub reconnect_delay: Duration,
    pub storage_key: String,
}

impl WidgetConfig {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }

    /// Reads `CHAT_WIDGET_*` variables, falling back to the defaults.
    pub fn from_env() -> Result<Self, WidgetError> {
        let site_id = std::env::var("CHAT_WIDGET_SITE_ID")
            .map_err(|_| WidgetError::InvalidConfig("CHAT_WIDGET_SITE_ID must be set".into()))?;

        let mut config = Self::new(site_id);
        if let Ok(url) = std::env::var("CHAT_WIDGET_SERVER_URL") {
            config = config.with_server_url(url);
        }
        if let Ok(ms) = std::env::var("CHAT_WIDGET_RECONNECT_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                WidgetError::InvalidConfig(format!("CHAT_WIDGET_RECONNECT_MS is not a number: {ms}"))
            })?;
            config = config.with_reconnect_delay(Duration::from_millis(ms));
        }
        if let Ok(key) = std::env::var("CHAT_WIDGET_STORAGE_KEY") {
            config = config.with_storage_key(key);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn validate(&self) -> Result<(), WidgetError> {
        if self.site_id.trim().is_empty() {
            return Err(WidgetError::InvalidConfig("site id cannot be empty".into()));
        }
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(WidgetError::InvalidConfig(format!(
                "server url must use ws:// or wss://, got '{}'",
                self.server_url
            )));
        }
        if self.storage_key.is_empty() {
            return Err(WidgetError::InvalidConfig("storage key cannot be empty".into()));
        }
        Ok(())
    }

    /// `<server>/ws/<siteId>/<conversationId>`
    pub fn endpoint(&self, conversation_id: &ConversationId) -> String {
        format!(
            "{}/ws/{}/{}",
            self.server_url.trim_end_matches('/'),
            self.site_id,
            conversation_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WidgetConfig::new("website1");
        assert_eq!(config.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(config.storage_key, "threadId");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint() {
        let config = WidgetConfig::new("website1").with_server_url("wss://chat.example.com/");
        let id = ConversationId::from("abc-123");
        assert_eq!(config.endpoint(&id), "wss://chat.example.com/ws/website1/abc-123");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(WidgetConfig::new("  ").validate().is_err());
        assert!(WidgetConfig::new("site").with_server_url("http://x").validate().is_err());
        assert!(WidgetConfig::new("site").with_storage_key("").validate().is_err());
    }
}
