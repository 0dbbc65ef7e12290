//! Durable key-value storage for store snapshots.
//!
//! Values are JSON text. Two keys are used: [`TASKS_KEY`] for the task
//! collection and [`SESSION_KEY`] for the signed-in user.
//!
//! Stores never write storage directly from the reducer. They emit an effect
//! that goes through a [`SnapshotWriter`], which drops any snapshot older than
//! the last one written, so effects finishing out of order cannot roll the
//! persisted state back.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Storage key of the persisted task collection
pub const TASKS_KEY: &str = "todos";

/// Storage key of the persisted session
pub const SESSION_KEY: &str = "currentUser";

/// Errors from the key-value storage
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("storage I/O failed for key {key:?}: {source}")]
    Io {
        /// Key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded or decoded
    #[error("storage value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Keys are restricted to ASCII letters, digits, `-` and `_`
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

/// Synchronous string key-value storage
pub trait KeyValueStorage: Send + Sync {
    /// Returns the value stored under `key`, if any
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`; removing a missing key succeeds
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage holding one raw value
    #[must_use]
    pub fn with_entry(key: &str, value: impl Into<String>) -> Self {
        let storage = Self::new();
        storage
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
        storage
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Storage backed by one `<key>.json` file per key in a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Opens (and creates if needed) the storage directory
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value)
            .and_then(|()| std::fs::rename(&staging, &path))
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Reads and decodes the JSON value under `key`
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] when the stored text is not a valid `T`,
/// or the backend's error when it cannot be read.
pub fn load_json<T: DeserializeOwned>(
    storage: &dyn KeyValueStorage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    storage
        .get(key)?
        .map(|raw| serde_json::from_str(&raw).map_err(StorageError::from))
        .transpose()
}

/// Revision-ordered writer for one storage key
///
/// Each write carries the revision of the state it was taken from. A write
/// or clear with a revision not newer than the last applied one is skipped.
pub struct SnapshotWriter {
    storage: Arc<dyn KeyValueStorage>,
    key: &'static str,
    last_revision: Mutex<Option<u64>>,
}

impl SnapshotWriter {
    /// Creates a writer for `key`
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: &'static str) -> Self {
        Self {
            storage,
            key,
            last_revision: Mutex::new(None),
        }
    }

    /// Key this writer owns
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Serializes `value` and stores it; returns false if the snapshot was stale
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if encoding or the backend write fails.
    pub fn write<T: Serialize + ?Sized>(&self, revision: u64, value: &T) -> Result<bool, StorageError> {
        let mut last = self.last_revision.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|last| revision <= last) {
            tracing::debug!(key = self.key, revision, "Skipping stale snapshot");
            return Ok(false);
        }
        let json = serde_json::to_string(value)?;
        self.storage.set(self.key, &json)?;
        *last = Some(revision);
        tracing::trace!(key = self.key, revision, bytes = json.len(), "Snapshot written");
        Ok(true)
    }

    /// Removes the key; returns false if a newer snapshot was already written
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend removal fails.
    pub fn clear(&self, revision: u64) -> Result<bool, StorageError> {
        let mut last = self.last_revision.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|last| revision <= last) {
            tracing::debug!(key = self.key, revision, "Skipping stale clear");
            return Ok(false);
        }
        self.storage.remove(self.key)?;
        *last = Some(revision);
        tracing::trace!(key = self.key, revision, "Snapshot cleared");
        Ok(true)
    }
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter")
            .field("key", &self.key)
            .field("last_revision", &*self.last_revision.lock().unwrap_or_else(PoisonError::into_inner))
            .finish_non_exhaustive()
    }
}
