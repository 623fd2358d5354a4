//! Scaling tests with long histories and heavily duplicated values.
//!
//! Measures the operations whose cost grows with history size:
//! - Building a long history one commit at a time
//! - Walking the whole history back and forth
//! - Saving and restoring through file persistence
//! - Pruning

use serde_json::json;
use std::time::Instant;
use tempfile::TempDir;
use versioned_store::{Encoding, FilePersistence, FilePersistenceConfig, Value, VersionedSequence};

const STEP_COUNT: usize = 2_000;

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn report_with_count(&self, count: usize) {
        let ms = self.start.elapsed().as_secs_f64() * 1000.0;
        let per_item = if count > 0 { ms / count as f64 } else { 0.0 };
        println!(
            "  {} took {:.2}ms ({} items, {:.4}ms/item)",
            self.name, ms, count, per_item
        );
    }
}

/// Only 50 distinct tracks, pushed over and over.
fn track(i: usize) -> Value {
    json!({"title": format!("Track {}", i % 50), "plays": i % 50})
}

fn build(steps: usize) -> VersionedSequence {
    let mut seq = VersionedSequence::new();
    for i in 0..steps {
        seq.push([track(i)]);
    }
    seq
}

#[test]
fn test_long_history_walk() {
    let timer = Timer::new("build");
    let mut seq = build(STEP_COUNT);
    timer.report_with_count(STEP_COUNT);

    assert_eq!(seq.len(), STEP_COUNT);
    assert_eq!(seq.undo_depth(), STEP_COUNT);
    assert_eq!(seq.content_store().len(), 50);

    let timer = Timer::new("undo each step");
    while seq.undo(1).unwrap() {}
    timer.report_with_count(STEP_COUNT);
    assert!(seq.is_empty());

    let timer = Timer::new("redo in one jump");
    assert!(seq.redo(STEP_COUNT).unwrap());
    timer.report_with_count(STEP_COUNT);
    assert_eq!(seq.len(), STEP_COUNT);
    assert_eq!(seq[STEP_COUNT - 1], track(STEP_COUNT - 1));
}

#[test]
fn test_large_transaction() {
    let mut seq = build(100);

    seq.begin_transaction().unwrap();
    for i in 0..STEP_COUNT {
        if i % 3 == 0 {
            seq.shift();
        }
        seq.push([track(i)]);
    }
    seq.reverse();
    seq.end_transaction().unwrap();

    assert_eq!(seq.undo_depth(), 101);
    seq.undo(1).unwrap();
    assert_eq!(seq.len(), 100);
    assert_eq!(seq[0], track(0));
}

#[test]
fn test_persisted_history_restore() {
    let dir = TempDir::new().unwrap();
    let config = FilePersistenceConfig {
        path: dir.path().join("history"),
        create_if_missing: true,
        encoding: Encoding::MessagePack,
    };

    let seq = build(500);
    let expected = seq.to_vec();

    let timer = Timer::new("attach and save");
    let persistence = FilePersistence::open_or_create(config.clone()).unwrap();
    let mut seq = seq.with_persistence(persistence, "long");
    timer.report_with_count(500);

    let stats = seq.prune().unwrap();
    assert_eq!(stats.versions_removed, 499);
    assert_eq!(stats.values_removed, 0);
    drop(seq);

    let timer = Timer::new("restore");
    let restored = VersionedSequence::new()
        .with_persistence(FilePersistence::open_or_create(config).unwrap(), "long");
    timer.report_with_count(500);

    assert_eq!(restored.to_vec(), expected);
    assert_eq!(restored.undo_depth(), 1);
}
