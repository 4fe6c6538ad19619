//! Key-value persistence backends for cache entries
//!
//! The cache only needs string get/set/remove by key. `MemoryStore` keeps
//! entries for the lifetime of the process; `FileStore` writes one JSON file
//! per key into an XDG-compliant cache directory so entries survive restarts.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// String key-value storage used to persist cache entries
pub trait KeyValueStore: Send + Sync {
    /// Returns the raw value stored under `key`, if any
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Removes `key`; removing a missing key is not an error
    fn remove(&self, key: &str);

    /// Lists every stored key
    fn keys(&self) -> Vec<String>;
}

/// In-process storage backed by a map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

/// Stores each entry as a file in a cache directory
///
/// Keys are usually URLs of any length, so a file is named after the SHA-256
/// digest of its key and records the key next to the stored value. Files that
/// do not carry a key matching their name are ignored.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

/// On-disk layout of one `FileStore` file
#[derive(Debug, Serialize, Deserialize)]
struct StoredFile {
    key: String,
    data: String,
}

impl FileStore {
    /// Creates a FileStore in the XDG cache directory
    ///
    /// Uses `~/.cache/cachefetch/` on Linux, or the platform equivalent.
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "cachefetch")?;
        let cache_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { cache_dir })
    }

    /// Creates a FileStore with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// Returns the path to the file holding `key`
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(key)))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    fn read_file(path: &Path) -> Option<StoredFile> {
        let raw = fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.cache_path(key);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<StoredFile>(&raw) {
            Ok(stored) if stored.key == key => Some(stored.data),
            // Unreadable file: hand it up so the cache treats it as corrupt
            _ => Some(raw),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.ensure_dir()?;
        let stored = StoredFile {
            key: key.to_string(),
            data: value.to_string(),
        };
        fs::write(self.cache_path(key), serde_json::to_string(&stored)?)
    }

    fn remove(&self, key: &str) {
        if let Err(err) = fs::remove_file(self.cache_path(key)) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(key, error = %err, "failed to remove cache file");
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".json")?.to_string();
                let stored = Self::read_file(&entry.path())?;
                (file_stem(&stored.key) == stem).then_some(stored.key)
            })
            .collect()
    }
}

/// Hex SHA-256 digest of `key`; fixed length whatever the key
fn file_stem(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get("a").is_none());

        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("2"));
        assert_eq!(store.keys(), vec!["a".to_string()]);

        store.remove("a");
        store.remove("a");
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_file_store_writes_one_file_per_key() {
        let (store, temp_dir) = create_test_store();

        store.set("https://example.com/users/1", "{}").expect("Write should succeed");

        let files: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(store.get("https://example.com/users/1").as_deref(), Some("{}"));
    }

    #[test]
    fn test_file_store_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get("nonexistent_key").is_none());
    }

    #[test]
    fn test_file_store_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = FileStore::with_dir(nested_path.clone());

        store.set("users/1", "{}").expect("Write should succeed");

        assert!(nested_path.exists(), "Nested directory should be created");
    }

    #[test]
    fn test_file_store_lists_keys_and_skips_foreign_files() {
        let (store, temp_dir) = create_test_store();
        store.set("users/1", "{}").unwrap();
        store.set("users/2", "{}").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "hi").unwrap();
        fs::write(temp_dir.path().join("zz.json"), "{}").unwrap();

        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["users/1".to_string(), "users/2".to_string()]);
    }

    #[test]
    fn test_file_store_remove_missing_key_is_quiet() {
        let (store, _temp_dir) = create_test_store();
        store.remove("never-written");
        assert!(store.keys().is_empty());
    }

    fn long_url_key() -> String {
        let tags: Vec<String> = (0..40).map(|i| format!("tag{i}=rust")).collect();
        format!("https://jsonplaceholder.typicode.com/posts?{}", tags.join("&"))
    }

    #[test]
    fn test_file_store_round_trips_long_url_keys() {
        let (store, temp_dir) = create_test_store();
        let key = long_url_key();
        assert!(key.len() > 255);

        store.set(&key, r#"{"ok":true}"#).expect("Long keys should be writable");

        assert_eq!(store.get(&key).as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(store.keys(), vec![key.clone()]);

        let name = fs::read_dir(temp_dir.path()).unwrap().next().unwrap().unwrap().file_name();
        assert_eq!(name.to_str().unwrap().len(), 64 + ".json".len());

        store.remove(&key);
        assert!(store.get(&key).is_none());
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_file_stem_is_fixed_length_and_distinct() {
        assert_eq!(file_stem("users/1").len(), 64);
        assert_eq!(file_stem(&long_url_key()).len(), 64);
        assert_ne!(file_stem("users/1"), file_stem("users/2"));
    }

    #[test]
    fn test_file_store_hands_back_unreadable_file_contents() {
        let (store, _temp_dir) = create_test_store();
        fs::write(store.cache_path("users/1"), "garbage").unwrap();

        assert_eq!(store.get("users/1").as_deref(), Some("garbage"));
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir().to_string_lossy();
            assert!(path_str.contains("cachefetch"), "Cache path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
