//! Version history implementation.

use crate::error::{Result, StoreError};
use crate::types::{Hash, Version};
use std::collections::HashSet;

/// Ordered list of versions plus a pointer to the current one.
///
/// `versions[0]` is always the empty version and the current index always
/// points at an existing version.
#[derive(Clone, Debug)]
pub struct VersionHistory {
    versions: Vec<Version>,
    current: usize,
}

impl Default for VersionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionHistory {
    /// Create a history holding only the empty version.
    pub fn new() -> Self {
        Self {
            versions: vec![Vec::new()],
            current: 0,
        }
    }

    /// Rebuild a history from persisted parts.
    pub fn from_parts(versions: Vec<Version>, current: usize) -> Result<Self> {
        match versions.first() {
            None => return Err(StoreError::InvalidFormat("history has no versions".into())),
            Some(first) if !first.is_empty() => {
                return Err(StoreError::InvalidFormat(
                    "first version must be empty".into(),
                ))
            }
            Some(_) => {}
        }
        if current >= versions.len() {
            return Err(StoreError::InvalidFormat(format!(
                "current index {} out of range ({} versions)",
                current,
                versions.len()
            )));
        }
        Ok(Self { versions, current })
    }

    /// The current version.
    pub fn current(&self) -> &Version {
        &self.versions[self.current]
    }

    /// Mutable access to the current version, used to apply a mutator to
    /// the version that was just committed.
    pub(crate) fn current_mut(&mut self) -> &mut Version {
        &mut self.versions[self.current]
    }

    /// Index of the current version.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// All versions, oldest first.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Number of versions held, including the initial empty one.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Always `false`: a history holds at least the empty version.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Truncate the redo future, append `version` and make it current.
    pub fn commit(&mut self, version: Version) {
        let discarded = self.versions.len() - self.current - 1;
        self.versions.truncate(self.current + 1);
        self.versions.push(version);
        self.current += 1;
        tracing::debug!(index = self.current, discarded, "committed version");
    }

    pub fn can_undo(&self, n: usize) -> bool {
        n <= self.current
    }

    pub fn can_redo(&self, n: usize) -> bool {
        self.current
            .checked_add(n)
            .map_or(false, |target| target < self.versions.len())
    }

    /// Step back `n` versions. Returns `None` without moving if that is not
    /// possible.
    pub fn undo(&mut self, n: usize) -> Option<&Version> {
        if !self.can_undo(n) {
            return None;
        }
        self.current -= n;
        Some(self.current())
    }

    /// Step forward `n` versions. Returns `None` without moving if that is
    /// not possible.
    pub fn redo(&mut self, n: usize) -> Option<&Version> {
        if !self.can_redo(n) {
            return None;
        }
        self.current += n;
        Some(self.current())
    }

    /// Number of steps that can be undone.
    pub fn undo_depth(&self) -> usize {
        self.current
    }

    /// Number of steps that can be redone.
    pub fn redo_depth(&self) -> usize {
        self.versions.len() - self.current - 1
    }

    /// Every hash referenced by any retained version.
    pub fn referenced_hashes(&self) -> HashSet<Hash> {
        self.versions.iter().flatten().copied().collect()
    }

    /// Drop all history except the current version.
    ///
    /// Returns the number of versions removed.
    pub fn collapse(&mut self) -> usize {
        let before = self.versions.len();
        let current = std::mem::take(&mut self.versions[self.current]);
        self.versions = vec![Vec::new()];
        if !current.is_empty() {
            self.versions.push(current);
        }
        self.current = self.versions.len() - 1;
        before - self.versions.len()
    }
}
