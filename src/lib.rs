//! # Versioned Store
//!
//! A mutable ordered sequence with transparent undo/redo, backed by a
//! content-addressed value store and optional durable history.
//!
//! ## Core Concepts
//!
//! - **Values**: JSON-like data, deduplicated by structural hash
//! - **Versions**: Point-in-time snapshots stored as ordered lists of hashes
//! - **History**: A linear undo stack; mutating after an undo drops the redo future
//! - **Transactions**: Batches of mutator calls collapsed into one undo step
//! - **Persistence**: Pluggable adapters that save and restore the full history
//!
//! ## Example
//!
//! ```ignore
//! use versioned_store::{FilePersistence, FilePersistenceConfig, VersionedSequence};
//! use serde_json::json;
//!
//! let persistence = FilePersistence::open_or_create(FilePersistenceConfig {
//!     path: "./history".into(),
//!     ..Default::default()
//! })?;
//!
//! let mut playlist = VersionedSequence::new().with_persistence(persistence, "queue");
//! playlist.push([json!({"title": "Intro"}), json!({"title": "Outro"})]);
//!
//! playlist.begin_transaction()?;
//! playlist.reverse();
//! playlist.pop();
//! playlist.end_transaction()?;
//!
//! // One step back restores both tracks in their original order.
//! playlist.undo(1)?;
//! ```

pub mod content;
pub mod error;
pub mod history;
pub mod persistence;
pub mod sequence;
pub mod types;

// Re-exports
pub use content::{structural_hash, ContentStore};
pub use error::{Result, StoreError};
pub use history::VersionHistory;
pub use persistence::{FilePersistence, FilePersistenceConfig, MemoryPersistence, PersistenceAdapter};
pub use sequence::VersionedSequence;
pub use types::*;
