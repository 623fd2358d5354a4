//! Content store implementation.

use crate::content::structural_hash;
use crate::error::{Result, StoreError};
use crate::types::{Hash, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Content-addressed value storage.
///
/// Entries are added on demand and only removed by an explicit prune. Values
/// are handed out by shared reference, so a value referenced by many versions
/// can never be mutated in place.
#[derive(Clone, Debug, Default)]
pub struct ContentStore {
    entries: HashMap<Hash, Value>,
}

impl ContentStore {
    /// Create an empty content store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted entries.
    ///
    /// Keys are trusted as-is; run [`SerializedHistory::validate`] first when
    /// the entries come from outside the process.
    ///
    /// [`SerializedHistory::validate`]: crate::types::SerializedHistory::validate
    pub fn from_entries(entries: impl IntoIterator<Item = (Hash, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Store a value, returning its hash.
    ///
    /// If a structurally equal value is already stored, this is a no-op and
    /// returns the existing hash.
    pub fn put(&mut self, value: Value) -> Hash {
        let hash = structural_hash(&value);
        self.entries.entry(hash).or_insert(value);
        hash
    }

    /// Get a value by its hash.
    pub fn get(&self, hash: &Hash) -> Result<&Value> {
        self.entries.get(hash).ok_or_else(|| {
            tracing::error!(%hash, "content store lookup failed; history references a missing value");
            StoreError::ValueNotFound(*hash)
        })
    }

    /// Check if a value is stored.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Delete an entry (for pruning).
    pub fn remove(&mut self, hash: &Hash) -> Option<Value> {
        self.entries.remove(hash)
    }

    /// Remove every entry whose hash is not in `referenced`.
    ///
    /// Returns the number of entries removed.
    pub fn retain_referenced(&mut self, referenced: &HashSet<Hash>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|hash, _| referenced.contains(hash));
        before - self.entries.len()
    }

    /// Number of distinct values stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all stored hashes.
    pub fn hashes(&self) -> impl Iterator<Item = &Hash> + '_ {
        self.entries.keys()
    }

    /// Copy the entries into a sorted map for serialization.
    pub(crate) fn to_sorted(&self) -> BTreeMap<Hash, Value> {
        self.entries
            .iter()
            .map(|(hash, value)| (*hash, value.clone()))
            .collect()
    }
}
