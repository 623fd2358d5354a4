//! In-process persistence adapter.

use crate::error::{Result, StoreError};
use crate::persistence::PersistenceAdapter;
use crate::types::SerializedHistory;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Keeps each saved history as JSON text in memory.
///
/// Histories go through the full textual round trip on every save and load,
/// the same as a browser key-value store would impose. Share one instance
/// between sequences with `Arc` or `Rc`.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw text saved under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Overwrite the raw text saved under `key`.
    pub fn insert_raw(&self, key: impl Into<String>, text: impl Into<String>) {
        self.entries.lock().insert(key.into(), text.into());
    }

    /// Whether anything is saved under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of keys with saved state.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl PersistenceAdapter for MemoryPersistence {
    fn save(&self, key: &str, history: &SerializedHistory) -> Result<()> {
        let text = serde_json::to_string(history)?;
        self.entries.lock().insert(key.to_string(), text);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<SerializedHistory>> {
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(text) => serde_json::from_str(text)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
