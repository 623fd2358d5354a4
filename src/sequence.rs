//! The versioned sequence tying content store, history and persistence
//! together.

use crate::content::ContentStore;
use crate::error::{Result, StoreError};
use crate::history::VersionHistory;
use crate::persistence::PersistenceAdapter;
use crate::types::{Hash, PruneStats, SerializedHistory, Value, Version, HASH_ALGORITHM};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;

/// An open transaction.
#[derive(Clone, Copy, Debug)]
struct Transaction {
    /// Whether the transaction's version has been committed yet.
    committed: bool,
}

/// A persistence adapter attached under a key.
struct Attached {
    adapter: Box<dyn PersistenceAdapter>,
    key: String,
}

/// A mutable ordered sequence with linear undo/redo.
///
/// Every mutator call outside a transaction commits one new version to the
/// history; inside a transaction all calls share one version. Values are
/// deduplicated through a [`ContentStore`], and the dereferenced contents of
/// the current version are kept alongside so reads never touch the store.
pub struct VersionedSequence {
    /// Content store shared by all versions.
    store: ContentStore,

    /// Version history of hash keys.
    history: VersionHistory,

    /// Dereferenced contents of `history.current()`, kept in lockstep.
    items: Vec<Value>,

    transaction: Option<Transaction>,

    persistence: Option<Attached>,
}

impl Default for VersionedSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedSequence {
    /// Create an empty sequence with an empty history.
    pub fn new() -> Self {
        Self {
            store: ContentStore::new(),
            history: VersionHistory::new(),
            items: Vec::new(),
            transaction: None,
            persistence: None,
        }
    }

    /// Build a sequence from an existing store and history.
    ///
    /// Fails with [`StoreError::ValueNotFound`] if any version references a
    /// hash the store does not hold.
    pub fn from_parts(store: ContentStore, history: VersionHistory) -> Result<Self> {
        if let Some(missing) = history
            .referenced_hashes()
            .into_iter()
            .find(|hash| !store.contains(hash))
        {
            tracing::error!(hash = %missing, "history references a value missing from the store");
            return Err(StoreError::ValueNotFound(missing));
        }

        let items = Self::materialize(&store, history.current())?;

        Ok(Self {
            store,
            history,
            items,
            transaction: None,
            persistence: None,
        })
    }

    /// Build a sequence from a serialized history after validating it.
    pub fn from_serialized(saved: SerializedHistory) -> Result<Self> {
        saved.validate()?;
        let store = ContentStore::from_entries(saved.store);
        let history = VersionHistory::from_parts(saved.versions, saved.current_index)?;
        Self::from_parts(store, history)
    }

    /// Attach a persistence adapter, consuming and returning the sequence.
    ///
    /// See [`attach_persistence`](Self::attach_persistence). Attaching
    /// restored state discards any open transaction.
    pub fn with_persistence<A>(mut self, adapter: A, name: impl Into<String>) -> Self
    where
        A: PersistenceAdapter + 'static,
    {
        self.attach(Box::new(adapter), name.into());
        self
    }

    /// Attach a persistence adapter under `name`.
    ///
    /// If the adapter holds a non-empty saved history for `name`, it replaces
    /// the in-memory store and history wholesale and `true` is returned.
    /// Otherwise the current state is saved and `false` is returned. Saved
    /// data that cannot be read or fails validation is logged and treated as
    /// no prior state.
    pub fn attach_persistence<A>(&mut self, adapter: A, name: impl Into<String>) -> Result<bool>
    where
        A: PersistenceAdapter + 'static,
    {
        self.ensure_no_transaction("attach persistence")?;
        Ok(self.attach(Box::new(adapter), name.into()))
    }

    fn attach(&mut self, adapter: Box<dyn PersistenceAdapter>, key: String) -> bool {
        let restored = match adapter.load(&key) {
            Ok(Some(saved)) if saved.is_initial() => false,
            Ok(Some(saved)) => match Self::from_serialized(saved) {
                Ok(loaded) => {
                    self.store = loaded.store;
                    self.history = loaded.history;
                    self.items = loaded.items;
                    self.transaction = None;
                    tracing::info!(
                        key = %key,
                        len = self.items.len(),
                        undo_depth = self.history.undo_depth(),
                        redo_depth = self.history.redo_depth(),
                        "restored persisted history"
                    );
                    true
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "discarding invalid persisted history");
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to load persisted history");
                false
            }
        };

        self.persistence = Some(Attached { adapter, key });
        if !restored {
            self.persist();
        }
        restored
    }

    /// Remove the saved history through the attached adapter and detach it.
    ///
    /// In-memory state is untouched. Does nothing if no adapter is attached.
    pub fn clear_persistence(&mut self) -> Result<()> {
        if let Some(attached) = &self.persistence {
            attached.adapter.clear(&attached.key)?;
            tracing::info!(key = %attached.key, "cleared persisted history");
        }
        self.persistence = None;
        Ok(())
    }

    /// Whether a persistence adapter is attached.
    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Key the attached adapter saves under.
    pub fn persistence_key(&self) -> Option<&str> {
        self.persistence.as_ref().map(|a| a.key.as_str())
    }

    // --- Mutators ---

    /// Append items. Returns the new length.
    pub fn push(&mut self, items: impl IntoIterator<Item = Value>) -> usize {
        let len = self.items.len();
        self.splice_at(len, 0, items.into_iter().collect());
        self.items.len()
    }

    /// Remove and return the last item.
    pub fn pop(&mut self) -> Option<Value> {
        self.begin_mutation();
        self.history.current_mut().pop();
        let item = self.items.pop();
        self.finish_mutation();
        item
    }

    /// Remove and return the first item.
    pub fn shift(&mut self) -> Option<Value> {
        if self.items.is_empty() {
            self.begin_mutation();
            self.finish_mutation();
            return None;
        }
        self.splice_at(0, 1, Vec::new()).into_iter().next()
    }

    /// Prepend items, keeping their order. Returns the new length.
    pub fn unshift(&mut self, items: impl IntoIterator<Item = Value>) -> usize {
        self.splice_at(0, 0, items.into_iter().collect());
        self.items.len()
    }

    /// Remove `delete_count` items starting at `start` and insert `items`
    /// in their place. Returns the removed items.
    ///
    /// A negative `start` counts back from the end. `start` is clamped to the
    /// sequence bounds and `delete_count` to the items available; `None`
    /// removes everything from `start` on.
    pub fn splice(
        &mut self,
        start: isize,
        delete_count: Option<usize>,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let len = self.items.len();
        let start = if start < 0 {
            len.saturating_sub(start.unsigned_abs())
        } else {
            (start as usize).min(len)
        };
        let available = len - start;
        let delete_count = delete_count.map_or(available, |n| n.min(available));

        self.splice_at(start, delete_count, items.into_iter().collect())
    }

    /// Reverse the sequence in place.
    pub fn reverse(&mut self) {
        self.begin_mutation();
        self.history.current_mut().reverse();
        self.items.reverse();
        self.finish_mutation();
    }

    /// Stable sort with a caller-supplied comparator over values.
    ///
    /// Hash keys carry no order, so the values are sorted and the committed
    /// version's keys are rearranged to match.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        self.begin_mutation();

        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.sort_by(|&a, &b| compare(&self.items[a], &self.items[b]));

        let keys = self.history.current_mut();
        let sorted_keys: Version = order.iter().map(|&i| keys[i]).collect();
        *keys = sorted_keys;

        let mut slots: Vec<Option<Value>> =
            std::mem::take(&mut self.items).into_iter().map(Some).collect();
        self.items = order.iter().filter_map(|&i| slots[i].take()).collect();

        self.finish_mutation();
    }

    /// Empty the sequence. The previous contents stay reachable by undo.
    pub fn clear(&mut self) {
        self.begin_mutation();
        self.history.current_mut().clear();
        self.items.clear();
        self.finish_mutation();
    }

    fn splice_at(&mut self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        self.begin_mutation();

        let end = start + delete_count;
        let hashes: Vec<Hash> = items
            .iter()
            .map(|item| self.store.put(item.clone()))
            .collect();
        self.history.current_mut().splice(start..end, hashes);
        let removed: Vec<Value> = self.items.splice(start..end, items).collect();

        self.finish_mutation();
        removed
    }

    /// Start a new version unless the open transaction already has one.
    fn begin_mutation(&mut self) {
        match self.transaction.as_mut() {
            Some(tx) if tx.committed => return,
            Some(tx) => tx.committed = true,
            None => {}
        }
        let version = self.history.current().clone();
        self.history.commit(version);
    }

    fn finish_mutation(&mut self) {
        debug_assert_eq!(self.history.current().len(), self.items.len());
        if self.transaction.is_none() {
            self.persist();
        }
    }

    // --- Transactions ---

    /// Open a transaction: the following mutator calls commit one version.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(StoreError::NestedTransaction);
        }
        self.transaction = Some(Transaction { committed: false });
        tracing::debug!("transaction opened");
        Ok(())
    }

    /// Close the open transaction and persist its version.
    pub fn end_transaction(&mut self) -> Result<()> {
        let tx = self.transaction.take().ok_or(StoreError::NoTransaction)?;
        tracing::debug!(committed = tx.committed, "transaction closed");
        if tx.committed {
            self.persist();
        }
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn ensure_no_transaction(&self, operation: &str) -> Result<()> {
        if self.transaction.is_some() {
            return Err(StoreError::Transaction(format!(
                "cannot {} while a transaction is open",
                operation
            )));
        }
        Ok(())
    }

    // --- History ---

    pub fn can_undo(&self, n: usize) -> bool {
        self.history.can_undo(n)
    }

    pub fn can_redo(&self, n: usize) -> bool {
        self.history.can_redo(n)
    }

    /// Step back `n` versions.
    ///
    /// Returns `Ok(false)` without changing anything if fewer than `n` steps
    /// can be undone.
    pub fn undo(&mut self, n: usize) -> Result<bool> {
        self.ensure_no_transaction("undo")?;
        if !self.history.can_undo(n) {
            return Ok(false);
        }
        let target = self.history.current_index() - n;
        self.items = Self::materialize(&self.store, &self.history.versions()[target])?;
        self.history.undo(n);
        tracing::debug!(steps = n, index = target, "undo");
        self.persist();
        Ok(true)
    }

    /// Step forward `n` versions.
    ///
    /// Returns `Ok(false)` without changing anything if fewer than `n` steps
    /// can be redone.
    pub fn redo(&mut self, n: usize) -> Result<bool> {
        self.ensure_no_transaction("redo")?;
        if !self.history.can_redo(n) {
            return Ok(false);
        }
        let target = self.history.current_index() + n;
        self.items = Self::materialize(&self.store, &self.history.versions()[target])?;
        self.history.redo(n);
        tracing::debug!(steps = n, index = target, "redo");
        self.persist();
        Ok(true)
    }

    /// Number of steps that can be undone.
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    /// Number of steps that can be redone.
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    /// Discard all history except the current contents and drop values no
    /// longer referenced.
    ///
    /// Afterwards a single undo step (back to empty) remains if the sequence
    /// is non-empty.
    pub fn prune(&mut self) -> Result<PruneStats> {
        self.ensure_no_transaction("prune")?;

        let versions_removed = self.history.collapse();
        let values_removed = self
            .store
            .retain_referenced(&self.history.referenced_hashes());

        tracing::info!(versions_removed, values_removed, "pruned history");
        self.persist();

        Ok(PruneStats {
            versions_removed,
            values_removed,
        })
    }

    // --- Accessors ---

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&Value> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&Value> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// The current contents.
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.clone()
    }

    /// The backing content store.
    pub fn content_store(&self) -> &ContentStore {
        &self.store
    }

    /// The backing version history.
    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    /// Serialize the full store, history and position.
    pub fn snapshot(&self) -> SerializedHistory {
        SerializedHistory {
            algorithm: HASH_ALGORITHM.to_string(),
            store: self.store.to_sorted(),
            versions: self.history.versions().to_vec(),
            current_index: self.history.current_index(),
        }
    }

    // --- Internal ---

    fn materialize(store: &ContentStore, version: &Version) -> Result<Vec<Value>> {
        version
            .iter()
            .map(|hash| store.get(hash).cloned())
            .collect()
    }

    /// Save the current state if an adapter is attached. Best effort.
    fn persist(&self) {
        if let Some(attached) = &self.persistence {
            if let Err(e) = attached.adapter.save(&attached.key, &self.snapshot()) {
                tracing::warn!(key = %attached.key, error = %e, "failed to persist history");
            }
        }
    }
}

impl Index<usize> for VersionedSequence {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a VersionedSequence {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl fmt::Debug for VersionedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedSequence")
            .field("items", &self.items)
            .field("undo_depth", &self.history.undo_depth())
            .field("redo_depth", &self.history.redo_depth())
            .field("stored_values", &self.store.len())
            .field("in_transaction", &self.transaction.is_some())
            .field("persistence_key", &self.persistence_key())
            .finish()
    }
}
