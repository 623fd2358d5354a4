//! Durable storage for serialized histories.
//!
//! A [`PersistenceAdapter`] saves, loads and clears one opaque
//! [`SerializedHistory`] per key. Calls are synchronous; an adapter over an
//! asynchronous backend must complete the operation before returning.

mod file;
mod memory;

pub use file::{FilePersistence, FilePersistenceConfig};
pub use memory::MemoryPersistence;

use crate::error::Result;
use crate::types::SerializedHistory;
use std::rc::Rc;
use std::sync::Arc;

/// Synchronous save/load/clear of serialized history, keyed by name.
pub trait PersistenceAdapter {
    /// Persist `history` under `key`, replacing anything saved before.
    fn save(&self, key: &str, history: &SerializedHistory) -> Result<()>;

    /// Load the history saved under `key`.
    ///
    /// Returns `Ok(None)` if nothing is saved. Returns `Err` when something
    /// is saved but cannot be read back.
    fn load(&self, key: &str) -> Result<Option<SerializedHistory>>;

    /// Remove whatever is saved under `key`.
    fn clear(&self, key: &str) -> Result<()>;
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for Box<T> {
    fn save(&self, key: &str, history: &SerializedHistory) -> Result<()> {
        (**self).save(key, history)
    }

    fn load(&self, key: &str) -> Result<Option<SerializedHistory>> {
        (**self).load(key)
    }

    fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key)
    }
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for Arc<T> {
    fn save(&self, key: &str, history: &SerializedHistory) -> Result<()> {
        (**self).save(key, history)
    }

    fn load(&self, key: &str) -> Result<Option<SerializedHistory>> {
        (**self).load(key)
    }

    fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key)
    }
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for Rc<T> {
    fn save(&self, key: &str, history: &SerializedHistory) -> Result<()> {
        (**self).save(key, history)
    }

    fn load(&self, key: &str) -> Result<Option<SerializedHistory>> {
        (**self).load(key)
    }

    fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key)
    }
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for &T {
    fn save(&self, key: &str, history: &SerializedHistory) -> Result<()> {
        (**self).save(key, history)
    }

    fn load(&self, key: &str) -> Result<Option<SerializedHistory>> {
        (**self).load(key)
    }

    fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save_load_clear<A: PersistenceAdapter>(adapter: A, key: &str) {
        let history = SerializedHistory::initial();
        adapter.save(key, &history).unwrap();
        assert_eq!(adapter.load(key).unwrap(), Some(history));
        adapter.clear(key).unwrap();
        assert!(adapter.load(key).unwrap().is_none());
    }

    #[test]
    fn test_forwarding_impls() {
        let memory = MemoryPersistence::new();
        save_load_clear(&memory, "borrowed");
        save_load_clear(Box::new(MemoryPersistence::new()), "boxed");
        save_load_clear(Rc::new(MemoryPersistence::new()), "rc");
        save_load_clear(Arc::new(MemoryPersistence::new()), "arc");

        let boxed: Box<dyn PersistenceAdapter> = Box::new(MemoryPersistence::new());
        save_load_clear(&boxed, "dyn");
    }

    #[test]
    fn test_borrowed_adapter_shares_state() {
        let memory = MemoryPersistence::new();
        let borrowed = &memory;
        borrowed.save("k", &SerializedHistory::initial()).unwrap();
        assert!(memory.contains("k"));
    }
}
