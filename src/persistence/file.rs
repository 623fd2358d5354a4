//! Directory-backed persistence adapter.
//!
//! Each key is stored in its own file, named by the hex SHA-256 of the key
//! bytes. The key itself travels inside the frame:
//!
//! ```text
//! magic "VSH\0" | format version u8 | encoding u8 | key len u32 LE | key
//!   | payload len u64 LE | payload | crc32 LE (over key and payload)
//! ```

use crate::error::{Result, StoreError};
use crate::persistence::PersistenceAdapter;
use crate::types::{Encoding, SerializedHistory};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the directory manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"VSD\0";

/// Magic bytes for history files.
const HISTORY_MAGIC: &[u8; 4] = b"VSH\0";

/// Current history file format version.
const HISTORY_VERSION: u8 = 2;

/// Fixed prefix: magic, version, encoding tag, key length.
const PREFIX_LEN: usize = 4 + 1 + 1 + 4;

/// Smallest possible frame: empty key, empty payload.
const MIN_FRAME_LEN: usize = PREFIX_LEN + 8 + 4;

const HISTORY_EXTENSION: &str = "hist";

/// File persistence configuration.
#[derive(Clone, Debug)]
pub struct FilePersistenceConfig {
    /// Directory holding one file per key.
    pub path: PathBuf,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Encoding used for new saves. Loads accept either encoding.
    pub encoding: Encoding,
}

impl Default for FilePersistenceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./history"),
            create_if_missing: true,
            encoding: Encoding::Json,
        }
    }
}

/// Stores histories as checksummed files in a locked directory.
pub struct FilePersistence {
    config: FilePersistenceConfig,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl FilePersistence {
    /// Open an existing persistence directory or create a new one.
    pub fn open_or_create(config: FilePersistenceConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new persistence directory.
    pub fn create(config: FilePersistenceConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        Ok(Self {
            config,
            _lock_file: lock_file,
        })
    }

    /// Open an existing persistence directory.
    pub fn open(config: FilePersistenceConfig) -> Result<Self> {
        if !config.path.exists() {
            return Err(StoreError::NotInitialized);
        }
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        Ok(Self {
            config,
            _lock_file: lock_file,
        })
    }

    /// Directory this adapter writes to.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Encoding used for saves.
    pub fn encoding(&self) -> Encoding {
        self.config.encoding
    }

    /// Path of the file backing `key`.
    ///
    /// The name is a digest of the key, so it has the same length for every
    /// key and never contains path separators.
    pub fn history_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.config
            .path
            .join(format!("{}.{}", hex::encode(digest), HISTORY_EXTENSION))
    }

    /// List the keys that have saved state.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.config.path)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(HISTORY_EXTENSION) {
                continue;
            }
            match fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|bytes| Frame::parse(&bytes).map(|frame| frame.key.to_owned()))
            {
                Ok(key) => keys.push(key),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable history file");
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn encode_frame(&self, key: &str, history: &SerializedHistory) -> Result<Vec<u8>> {
        let payload = self.config.encoding.encode(history)?;
        let key_len = u32::try_from(key.len())
            .map_err(|_| StoreError::Serialization(format!("key too long ({} bytes)", key.len())))?;

        let mut checksum = crc32fast::Hasher::new();
        checksum.update(key.as_bytes());
        checksum.update(&payload);

        let mut frame = Vec::with_capacity(MIN_FRAME_LEN + key.len() + payload.len());
        frame.extend_from_slice(HISTORY_MAGIC);
        frame.push(HISTORY_VERSION);
        frame.push(self.config.encoding.tag());
        frame.extend_from_slice(&key_len.to_le_bytes());
        frame.extend_from_slice(key.as_bytes());
        frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&checksum.finalize().to_le_bytes());
        Ok(frame)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(MANIFEST_MAGIC)?;
        file.write_all(&[HISTORY_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MANIFEST_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid manifest magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != HISTORY_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported manifest version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;
        Ok(lock_file)
    }
}

/// A checked view of one history file.
struct Frame<'a> {
    encoding: Encoding,
    key: &'a str,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Check magic, version, lengths and checksum.
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(StoreError::Corruption(format!(
                "history file truncated ({} bytes)",
                bytes.len()
            )));
        }

        if &bytes[0..4] != HISTORY_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid history magic".into()));
        }

        if bytes[4] != HISTORY_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported history version: {}",
                bytes[4]
            )));
        }

        let encoding = Encoding::from_tag(bytes[5]).ok_or_else(|| {
            StoreError::InvalidFormat(format!("Unknown history encoding: {}", bytes[5]))
        })?;

        let mut key_len_bytes = [0u8; 4];
        key_len_bytes.copy_from_slice(&bytes[6..PREFIX_LEN]);
        let key_len = u32::from_le_bytes(key_len_bytes) as usize;

        let key_end = PREFIX_LEN + key_len;
        let len_end = key_end + 8;
        if len_end + 4 > bytes.len() {
            return Err(StoreError::Corruption(format!(
                "history key length {} does not fit file size {}",
                key_len,
                bytes.len()
            )));
        }
        let key_bytes = &bytes[PREFIX_LEN..key_end];

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[key_end..len_end]);
        let payload_len = u64::from_le_bytes(len_bytes) as usize;

        let expected_len = len_end.checked_add(payload_len).and_then(|n| n.checked_add(4));
        if expected_len != Some(bytes.len()) {
            return Err(StoreError::Corruption(format!(
                "history payload length {} does not match file size {}",
                payload_len,
                bytes.len()
            )));
        }

        let payload = &bytes[len_end..len_end + payload_len];
        let mut checksum_bytes = [0u8; 4];
        checksum_bytes.copy_from_slice(&bytes[len_end + payload_len..]);
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let mut checksum = crc32fast::Hasher::new();
        checksum.update(key_bytes);
        checksum.update(payload);
        let computed_checksum = checksum.finalize();

        if stored_checksum != computed_checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        let key = std::str::from_utf8(key_bytes)
            .map_err(|_| StoreError::Corruption("history key is not UTF-8".into()))?;

        Ok(Self {
            encoding,
            key,
            payload,
        })
    }
}

impl PersistenceAdapter for FilePersistence {
    fn save(&self, key: &str, history: &SerializedHistory) -> Result<()> {
        let frame = self.encode_frame(key, history)?;
        let path = self.history_path(key);
        let tmp_path = path.with_extension("tmp");

        let mut file = File::create(&tmp_path)?;
        file.write_all(&frame)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<SerializedHistory>> {
        let path = self.history_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let frame = Frame::parse(&bytes)?;
        if frame.key != key {
            return Err(StoreError::Corruption(format!(
                "history file {} holds key {:?}, expected {:?}",
                path.display(),
                frame.key,
                key
            )));
        }
        frame.encoding.decode(frame.payload).map(Some)
    }

    fn clear(&self, key: &str) -> Result<()> {
        let path = self.history_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
