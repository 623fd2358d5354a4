//! Content-addressed value storage.
//!
//! Values are keyed by a structural SHA-256 hash, so structurally equal
//! values share one entry no matter how many versions reference them.

mod hasher;
mod store;

pub use hasher::structural_hash;
pub use store::ContentStore;
