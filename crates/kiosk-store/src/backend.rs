//! Durable key-value backends.
//!
//! Values are opaque strings (JSON in practice). Keys are flat: the per-user
//! layer above composes them as `{collection}_{userId}`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

/// Trait for durable string storage.
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a value. `Ok(None)` when the key was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory backend for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// File-backed store: one `<key>.json` file per key under a data directory.
///
/// Key characters outside `[A-Za-z0-9_.~-]` are percent-encoded in the file
/// name, so any user id maps to a distinct, valid file.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Replace atomically.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("cart_u1").unwrap(), None);

        store.set("cart_u1", r#"{"a":{"M":1}}"#).unwrap();
        assert_eq!(
            store.get("cart_u1").unwrap().as_deref(),
            Some(r#"{"a":{"M":1}}"#)
        );

        store.set("cart_u1", "{}").unwrap();
        assert_eq!(store.get("cart_u1").unwrap().as_deref(), Some("{}"));

        store.remove("cart_u1").unwrap();
        store.remove("cart_u1").unwrap();
        assert_eq!(store.get("cart_u1").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        exercise(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("data"));
        exercise(&store);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        FileStore::new(dir.path()).set("users", "[]").unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.get("users").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("cart_u-1.x"), "cart_u-1.x");
        assert_eq!(encode_key("orders_a/b c"), "orders_a%2Fb%20c");
        assert_ne!(encode_key("cart_a/b"), encode_key("cart_a%2Fb"));
    }

    #[test]
    fn test_file_store_keys_with_odd_characters() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.set("cart_a/b c", "{}").unwrap();
        store.set("cart_a%2Fb", "[]").unwrap();

        assert_eq!(store.path_for("cart_a/b c").parent(), Some(dir.path()));
        assert_eq!(store.get("cart_a/b c").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.get("cart_a%2Fb").unwrap().as_deref(), Some("[]"));
    }
}
