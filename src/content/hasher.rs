//! Structural hashing of values.
//!
//! Each value is fed to SHA-256 as a tagged, length-prefixed encoding. Map
//! entries are visited in sorted key order, so key insertion order never
//! affects the hash. Tags keep `null`, `[]` and `{}` apart,
//! and keep integers apart from floats.

use crate::types::{Hash, Value};
use serde_json::Number;
use sha2::{Digest, Sha256};

/// Domain tag prepended to every value encoding.
const DOMAIN: &[u8] = b"versioned-store-value-v1:";

const TAG_NULL: u8 = b'n';
const TAG_FALSE: u8 = b'f';
const TAG_TRUE: u8 = b't';
const TAG_INT: u8 = b'i';
const TAG_FLOAT: u8 = b'd';
const TAG_STRING: u8 = b's';
const TAG_ARRAY: u8 = b'a';
const TAG_OBJECT: u8 = b'o';

/// Compute the structural hash of a value.
pub fn structural_hash(value: &Value) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);
    feed(&mut hasher, value);
    Hash(hasher.finalize().into())
}

fn feed(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([TAG_NULL]),
        Value::Bool(false) => hasher.update([TAG_FALSE]),
        Value::Bool(true) => hasher.update([TAG_TRUE]),
        Value::Number(n) => feed_number(hasher, n),
        Value::String(s) => feed_str(hasher, s),
        Value::Array(items) => {
            hasher.update([TAG_ARRAY]);
            feed_len(hasher, items.len());
            for item in items {
                feed(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update([TAG_OBJECT]);
            feed_len(hasher, map.len());
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                feed_str(hasher, key);
                feed(hasher, item);
            }
        }
    }
}

fn feed_number(hasher: &mut Sha256, n: &Number) {
    // Integers and floats never share a hash, so equal hashes imply equal
    // `Value`s. Floats are keyed by their exact bits.
    if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
        hasher.update([TAG_FLOAT]);
        hasher.update(f.to_bits().to_be_bytes());
        return;
    }

    let i = match (n.as_u64(), n.as_i64()) {
        (Some(u), _) => u as i128,
        (None, Some(i)) => i as i128,
        (None, None) => 0,
    };
    hasher.update([TAG_INT]);
    hasher.update(i.to_be_bytes());
}

fn feed_str(hasher: &mut Sha256, s: &str) {
    hasher.update([TAG_STRING]);
    feed_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn feed_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}
