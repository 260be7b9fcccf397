use std::collections::HashMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::WidgetError;

/// Key-value persistence capability backing the conversation identity.
/// The browser shell implements it over `localStorage`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), WidgetError>;
}

/// Opaque identifier correlating every message of one chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the stored identifier, or creates and persists a new one.
pub fn load_or_create(
    store: &mut impl KeyValueStore,
    key: &str,
) -> Result<ConversationId, WidgetError> {
    if let Some(existing) = store.get(key)?.filter(|s| !s.is_empty()) {
        debug!("Reusing conversation {existing}");
        return Ok(ConversationId::from(existing));
    }

    let id = ConversationId::new_random();
    store.set(key, id.as_str())?;
    info!("Created conversation {id}");
    Ok(id)
}

/// In-memory store, used by tests and as a fallback when nothing durable exists.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), WidgetError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file_store::FileStore;

#[cfg(not(target_arch = "wasm32"))]
mod file_store {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use tracing::error;

    use super::KeyValueStore;
    use crate::errors::WidgetError;

    /// JSON object on disk; the native counterpart of browser storage.
    #[derive(Debug, Clone)]
    pub struct FileStore {
        path: PathBuf,
    }

    impl FileStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        fn read_all(&self) -> Result<HashMap<String, String>, WidgetError> {
            match std::fs::read_to_string(&self.path) {
                Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                    error!("Corrupt state file {}: {e}", self.path.display());
                    WidgetError::storage(format!("{}: {e}", self.path.display()))
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
                Err(e) => Err(WidgetError::storage(format!("{}: {e}", self.path.display()))),
            }
        }
    }

    impl KeyValueStore for FileStore {
        fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
            Ok(self.read_all()?.remove(key))
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), WidgetError> {
            let mut entries = self.read_all()?;
            entries.insert(key.to_string(), value.to_string());
            let raw = serde_json::to_string_pretty(&entries)
                .map_err(|e| WidgetError::storage(e.to_string()))?;
            std::fs::write(&self.path, raw)
                .map_err(|e| WidgetError::storage(format!("{}: {e}", self.path.display())))
        }
    }
}
