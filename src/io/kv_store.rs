//! Key/value persistence boundary
//!
//! String- and long-valued entries under a fixed namespace. A missing key is
//! "absent", never an error. Two implementations:
//! - `MemoryKvStore` - in-process map, for tests and ephemeral hosts
//! - `FileKvStore` - one JSON document per namespace, rewritten atomically

use crate::domain::error::SessionError;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A single stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Long(i64),
    Text(String),
}

/// Key/value persistence used by the session store
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_long(&self, key: &str) -> Option<i64>;
    fn put_string(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn put_long(&self, key: &str, value: i64) -> Result<(), SessionError>;
    /// Remove all given keys in one write
    fn remove_all(&self, keys: &[&str]) -> Result<(), SessionError>;
}

fn text_of(value: Option<&StoredValue>) -> Option<String> {
    match value {
        Some(StoredValue::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn long_of(value: Option<&StoredValue>) -> Option<i64> {
    match value {
        Some(StoredValue::Long(v)) => Some(*v),
        _ => None,
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<FxHashMap<String, StoredValue>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get_string(&self, key: &str) -> Option<String> {
        text_of(self.entries.lock().get(key))
    }

    fn get_long(&self, key: &str) -> Option<i64> {
        long_of(self.entries.lock().get(key))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries.lock().insert(key.to_string(), StoredValue::Text(value.to_string()));
        Ok(())
    }

    fn put_long(&self, key: &str, value: i64) -> Result<(), SessionError> {
        self.entries.lock().insert(key.to_string(), StoredValue::Long(value));
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), SessionError> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// File-backed store
///
/// The whole namespace is cached in memory and written through on every
/// mutation via write-to-temp + rename, so readers never see a partial file.
pub struct FileKvStore {
    path: PathBuf,
    entries: Mutex<FxHashMap<String, StoredValue>>,
}

impl FileKvStore {
    /// Open (or lazily create) the namespace file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => FxHashMap::default(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                SessionError::Storage(format!("corrupt store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FxHashMap::default(),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        debug!(path = %path.display(), keys = %entries.len(), "kv_store_opened");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &FxHashMap<String, StoredValue>) -> Result<(), SessionError> {
        let storage_err = |e: std::io::Error| {
            warn!(path = %self.path.display(), error = %e, "kv_store_write_failed");
            SessionError::Storage(format!("failed to write {}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(storage_err)?;
            }
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(storage_err)?;
        fs::rename(&tmp, &self.path).map_err(storage_err)?;

        debug!(path = %self.path.display(), keys = %entries.len(), "kv_store_written");
        Ok(())
    }

    fn mutate<F>(&self, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut FxHashMap<String, StoredValue>),
    {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        f(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get_string(&self, key: &str) -> Option<String> {
        text_of(self.entries.lock().get(key))
    }

    fn get_long(&self, key: &str) -> Option<i64> {
        long_of(self.entries.lock().get(key))
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), StoredValue::Text(value.to_string()));
        })
    }

    fn put_long(&self, key: &str, value: i64) -> Result<(), SessionError> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), StoredValue::Long(value));
        })
    }

    fn remove_all(&self, keys: &[&str]) -> Result<(), SessionError> {
        self.mutate(|entries| {
            for key in keys {
                entries.remove(*key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get_string("a"), None);
        store.put_string("a", "hello").unwrap();
        store.put_long("b", 42).unwrap();
        assert_eq!(store.get_string("a").as_deref(), Some("hello"));
        assert_eq!(store.get_long("b"), Some(42));
        // Wrong type reads as absent
        assert_eq!(store.get_long("a"), None);
        assert_eq!(store.get_string("b"), None);
    }

    #[test]
    fn test_memory_store_remove_all() {
        let store = MemoryKvStore::new();
        store.put_string("a", "x").unwrap();
        store.put_long("b", 1).unwrap();
        store.remove_all(&["a", "b", "missing"]).unwrap();
        assert_eq!(store.get_string("a"), None);
        assert_eq!(store.get_long("b"), None);
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ns.json");

        let store = FileKvStore::open(&path).unwrap();
        store.put_string("session-location-json", "{\"location_id\":\"A\"}").unwrap();
        store.put_long("session-start-epoch-millis", 1_700_000_000_000).unwrap();
        assert!(path.exists());

        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(
            reopened.get_string("session-location-json").as_deref(),
            Some("{\"location_id\":\"A\"}")
        );
        assert_eq!(reopened.get_long("session-start-epoch-millis"), Some(1_700_000_000_000));
    }

    #[test]
    fn test_file_store_remove_all_single_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ns.json");

        let store = FileKvStore::open(&path).unwrap();
        store.put_string("a", "x").unwrap();
        store.put_long("b", 7).unwrap();
        store.remove_all(&["a", "b"]).unwrap();

        let reopened = FileKvStore::open(&path).unwrap();
        assert_eq!(reopened.get_string("a"), None);
        assert_eq!(reopened.get_long("b"), None);
        assert!(!dir.path().join("ns.json.tmp").exists());
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.get_string("anything"), None);
    }

    #[test]
    fn test_file_store_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ns.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(FileKvStore::open(&path), Err(SessionError::Storage(_))));
    }
}
