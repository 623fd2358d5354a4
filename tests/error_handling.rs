//! Error handling and edge case tests.

use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use versioned_store::{
    structural_hash, ContentStore, Encoding, FilePersistence, FilePersistenceConfig,
    MemoryPersistence, PersistenceAdapter, Result, SerializedHistory, StoreError, VersionHistory,
    VersionedSequence,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config(dir: &TempDir) -> FilePersistenceConfig {
    FilePersistenceConfig {
        path: dir.path().join("history"),
        create_if_missing: true,
        encoding: Encoding::Json,
    }
}

/// An adapter whose backing storage is unavailable.
struct FailingPersistence;

impl PersistenceAdapter for FailingPersistence {
    fn save(&self, _key: &str, _history: &SerializedHistory) -> Result<()> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "quota exceeded",
        )))
    }

    fn load(&self, _key: &str) -> Result<Option<SerializedHistory>> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "storage unavailable",
        )))
    }

    fn clear(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

// --- Transaction Errors ---

#[test]
fn test_nested_transaction_fails_fast() {
    let mut seq = VersionedSequence::new();
    seq.begin_transaction().unwrap();
    seq.push([json!(1)]);

    let result = seq.begin_transaction();
    assert!(matches!(result, Err(StoreError::NestedTransaction)));

    // The outer transaction is still usable
    seq.push([json!(2)]);
    seq.end_transaction().unwrap();
    seq.undo(1).unwrap();
    assert!(seq.is_empty());
}

#[test]
fn test_end_without_begin() {
    let mut seq = VersionedSequence::new();
    assert!(matches!(seq.end_transaction(), Err(StoreError::NoTransaction)));
}

#[test]
fn test_attach_inside_transaction() {
    let mut seq = VersionedSequence::new();
    seq.begin_transaction().unwrap();
    let result = seq.attach_persistence(MemoryPersistence::new(), "queue");
    assert!(matches!(result, Err(StoreError::Transaction(_))));
    assert!(!seq.is_persistent());
}

// --- Index Errors ---

#[test]
fn test_out_of_range_splice_never_fails() {
    let mut seq = VersionedSequence::new();
    assert!(seq.splice(5, Some(3), []).is_empty());
    assert!(seq.splice(-5, None, [json!("x")]).is_empty());
    assert_eq!(seq.as_slice(), &[json!("x")]);
    assert!(seq.splice(isize::MIN, Some(usize::MAX), []).len() == 1);
    assert!(seq.is_empty());
}

#[test]
fn test_get_out_of_range() {
    let mut seq = VersionedSequence::new();
    seq.push([json!(1)]);
    assert!(seq.get(1).is_none());
}

// --- Content Store Faults ---

#[test]
fn test_missing_value_is_reported() {
    init_logging();
    let mut history = VersionHistory::new();
    history.commit(vec![structural_hash(&json!("lost"))]);

    let result = VersionedSequence::from_parts(ContentStore::new(), history);
    assert!(matches!(result, Err(StoreError::ValueNotFound(_))));
}

// --- Persistence Errors ---

#[test]
fn test_failing_adapter_is_best_effort() {
    init_logging();
    let mut seq = VersionedSequence::new().with_persistence(FailingPersistence, "queue");
    seq.push([json!("still works")]);
    seq.undo(1).unwrap();
    seq.redo(1).unwrap();
    assert_eq!(seq.as_slice(), &[json!("still works")]);
}

#[test]
fn test_malformed_json_falls_back() {
    init_logging();
    let persistence = Arc::new(MemoryPersistence::new());
    persistence.insert_raw("queue", "[[[ definitely not a history");

    let seq = VersionedSequence::new().with_persistence(Arc::clone(&persistence), "queue");
    assert!(seq.is_empty());
    assert_eq!(seq.undo_depth(), 0);
}

#[test]
fn test_inconsistent_history_falls_back() {
    init_logging();
    let persistence = Arc::new(MemoryPersistence::new());
    let text = json!({
        "algorithm": versioned_store::HASH_ALGORITHM,
        "store": {},
        "versions": [[], [structural_hash(&json!("missing")).to_hex()]],
        "currentIndex": 1
    })
    .to_string();
    persistence.insert_raw("queue", text);

    let mut seq = VersionedSequence::new();
    let restored = seq
        .attach_persistence(Arc::clone(&persistence), "queue")
        .unwrap();

    assert!(!restored);
    assert!(seq.is_empty());
    assert_eq!(seq.undo_depth(), 0);
}

#[test]
fn test_foreign_hash_algorithm_is_rejected() {
    init_logging();
    let persistence = Arc::new(MemoryPersistence::new());
    let mut source = VersionedSequence::new();
    source.push([json!("a")]);
    let mut saved = source.snapshot();
    saved.algorithm = "concat-v0".to_string();
    persistence.save("queue", &saved).unwrap();

    let seq = VersionedSequence::new().with_persistence(Arc::clone(&persistence), "queue");
    assert!(seq.is_empty());
    assert!(matches!(
        saved.validate(),
        Err(StoreError::AlgorithmMismatch { .. })
    ));
}

#[test]
fn test_corrupt_file_falls_back() {
    init_logging();
    let dir = TempDir::new().unwrap();
    {
        let persistence = FilePersistence::create(test_config(&dir)).unwrap();
        let path = persistence.history_path("queue");
        let mut seq = VersionedSequence::new().with_persistence(persistence, "queue");
        seq.push([json!("a"), json!("b")]);
        drop(seq);

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        fs::write(&path, bytes).unwrap();
    }

    let persistence = FilePersistence::open(test_config(&dir)).unwrap();
    let seq = VersionedSequence::new().with_persistence(persistence, "queue");
    assert!(seq.is_empty());
}

#[test]
fn test_open_nonexistent_directory() {
    let dir = TempDir::new().unwrap();

    let result = FilePersistence::open_or_create(FilePersistenceConfig {
        path: dir.path().join("nonexistent"),
        create_if_missing: false,
        encoding: Encoding::Json,
    });

    assert!(matches!(result, Err(StoreError::NotInitialized)));
}

#[test]
fn test_concurrent_directory_access() {
    let dir = TempDir::new().unwrap();
    let _first = FilePersistence::create(test_config(&dir)).unwrap();

    // Second adapter should fail with lock error
    let result = FilePersistence::open(test_config(&dir));
    assert!(matches!(result, Err(StoreError::Locked)));
}

#[test]
fn test_directory_without_manifest() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("history")).unwrap();

    let result = FilePersistence::open(test_config(&dir));
    assert!(matches!(result, Err(StoreError::Io(_))));
}

// --- Values ---

#[test]
fn test_unicode_and_nested_values() {
    let persistence = Arc::new(MemoryPersistence::new());
    let value = json!({
        "title": "Für Elise ♫",
        "credits": [{"role": "composer", "name": "Beethoven"}, null],
        "meta": {"bpm": 72.5, "explicit": false, "tags": []}
    });
    {
        let mut seq =
            VersionedSequence::new().with_persistence(Arc::clone(&persistence), "ünïcode");
        seq.push([value.clone()]);
    }

    let seq = VersionedSequence::new().with_persistence(Arc::clone(&persistence), "ünïcode");
    assert_eq!(seq.as_slice(), &[value]);
}
