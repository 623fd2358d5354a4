//! Core types for the versioned store.

use crate::content::structural_hash;
use crate::error::{Result, StoreError};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A JSON-like datum held by the store.
///
/// Acyclic by construction; treated as immutable once stored.
pub type Value = serde_json::Value;

/// The logical sequence contents at one point in time.
pub type Version = Vec<Hash>;

/// Identifier of the hash algorithm used to key the content store.
///
/// Persisted hashes are never recomputed on load, so a history written with a
/// different algorithm is rejected rather than silently reinterpreted.
pub const HASH_ALGORITHM: &str = "sha256-structural-v1";

/// Content hash for stored values (SHA-256 over a structural encoding).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct HexVisitor;

        impl<'de> Visitor<'de> for HexVisitor {
            type Value = Hash;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64 character hex string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Hash, E> {
                Hash::from_hex(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// Encoding used for persisted history payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Encoding {
    /// Textual JSON (the canonical form).
    #[default]
    Json,
    MessagePack,
}

impl Encoding {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Encoding::Json => 0,
            Encoding::MessagePack => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Encoding::Json),
            1 => Some(Encoding::MessagePack),
            _ => None,
        }
    }

    /// Encode a history with this encoding.
    pub fn encode(self, history: &SerializedHistory) -> Result<Vec<u8>> {
        match self {
            Encoding::Json => Ok(serde_json::to_vec(history)?),
            Encoding::MessagePack => Ok(rmp_serde::to_vec_named(history)?),
        }
    }

    /// Decode a history previously written with this encoding.
    pub fn decode(self, bytes: &[u8]) -> Result<SerializedHistory> {
        match self {
            Encoding::Json => serde_json::from_slice(bytes)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            Encoding::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
        }
    }
}

/// Everything needed to rebuild a sequence: store, versions and position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedHistory {
    /// Hash algorithm the store keys were computed with.
    pub algorithm: String,

    /// Content store entries.
    pub store: BTreeMap<Hash, Value>,

    /// All versions, oldest first. `versions[0]` is always empty.
    pub versions: Vec<Version>,

    /// Index of the current version.
    #[serde(rename = "currentIndex")]
    pub current_index: usize,
}

impl SerializedHistory {
    /// The history of a freshly constructed sequence.
    pub fn initial() -> Self {
        Self {
            algorithm: HASH_ALGORITHM.to_string(),
            store: BTreeMap::new(),
            versions: vec![Vec::new()],
            current_index: 0,
        }
    }

    /// Whether this history holds nothing beyond the initial empty version.
    pub fn is_initial(&self) -> bool {
        self.versions.len() <= 1
    }

    /// Check structural consistency before the history is trusted.
    ///
    /// Every stored value must re-hash to its key and every version must
    /// reference only stored hashes.
    pub fn validate(&self) -> Result<()> {
        if self.algorithm != HASH_ALGORITHM {
            return Err(StoreError::AlgorithmMismatch {
                expected: HASH_ALGORITHM.to_string(),
                got: self.algorithm.clone(),
            });
        }

        match self.versions.first() {
            None => return Err(StoreError::InvalidFormat("history has no versions".into())),
            Some(first) if !first.is_empty() => {
                return Err(StoreError::InvalidFormat(
                    "first version must be empty".into(),
                ))
            }
            Some(_) => {}
        }

        if self.current_index >= self.versions.len() {
            return Err(StoreError::InvalidFormat(format!(
                "current index {} out of range ({} versions)",
                self.current_index,
                self.versions.len()
            )));
        }

        for (hash, value) in &self.store {
            let computed = structural_hash(value);
            if computed != *hash {
                return Err(StoreError::HashMismatch {
                    expected: *hash,
                    got: computed,
                });
            }
        }

        for (index, version) in self.versions.iter().enumerate() {
            if let Some(missing) = version.iter().find(|h| !self.store.contains_key(h)) {
                return Err(StoreError::Corruption(format!(
                    "version {} references unknown value {}",
                    index, missing
                )));
            }
        }

        Ok(())
    }
}

/// Outcome of pruning history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Versions discarded from the history.
    pub versions_removed: usize,
    /// Content store entries no longer referenced and removed.
    pub values_removed: usize,
}
