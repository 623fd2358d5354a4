//! Linear version history.
//!
//! Committing after an undo discards the redo future; only one redoable
//! future exists at a time.

mod versions;

pub use versions::VersionHistory;
