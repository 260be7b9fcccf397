use chat_widget::{KeyValueStore, WidgetError};
use web_sys::Storage;

/// `window.localStorage`, looked up on every call.
pub struct BrowserStore;

fn local_storage() -> Result<Storage, WidgetError> {
    web_sys::window()
        .ok_or_else(|| WidgetError::storage("no window"))?
        .local_storage()
        .map_err(|e| WidgetError::storage(format!("{e:?}")))?
        .ok_or_else(|| WidgetError::storage("localStorage is disabled"))
}

impl KeyValueStore for BrowserStore {
    fn get(&self, key: &str) -> Result<Option<String>, WidgetError> {
        local_storage()?
            .get_item(key)
            .map_err(|e| WidgetError::storage(format!("{e:?}")))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), WidgetError> {
        local_storage()?
            .set_item(key, value)
            .map_err(|e| WidgetError::storage(format!("{e:?}")))
    }
}
