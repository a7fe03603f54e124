use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::warn;

use super::entry::CacheEntry;
use super::store::{CacheStore, DEFAULT_TTL};
use crate::error::Error;
use crate::lock;

/// Key under which every entry of this library lives in the file.
const ROOT_KEY: &str = "_tether";

/// Durable store backed by a single JSON file.
///
/// All entries are multiplexed under one root key, so the file can be shared
/// with other data. Each operation is a read-modify-write of the whole
/// document performed under a lock. I/O failures after construction are
/// logged and behave like cache misses.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    default_ttl: Duration,
    guard: Mutex<()>,
}

impl FileStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheUnavailable`] if the parent directory does not
    /// exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Err(Error::CacheUnavailable(format!(
                "{} is not a directory",
                parent.display()
            )));
        }
        if path.is_dir() {
            return Err(Error::CacheUnavailable(format!(
                "{} is a directory",
                path.display()
            )));
        }

        Ok(Self {
            path,
            default_ttl: DEFAULT_TTL,
            guard: Mutex::new(()),
        })
    }

    /// Opens the store in the platform cache directory under `app`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheUnavailable`] if the platform has no cache
    /// directory or it cannot be created.
    pub fn in_cache_dir(app: &str) -> Result<Self, Error> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| Error::CacheUnavailable("no platform cache directory".to_string()))?
            .join(app);
        fs::create_dir_all(&dir).map_err(|e| Error::CacheUnavailable(e.to_string()))?;
        Self::open(dir.join("cache.json"))
    }

    #[must_use]
    pub fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Map<String, Value> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read cache file");
                return Map::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "ignoring malformed cache file");
                Map::new()
            }
        }
    }

    fn write_document(&self, doc: Map<String, Value>) {
        let result = serde_json::to_string(&Value::Object(doc))
            .map_err(io::Error::other)
            .and_then(|text| fs::write(&self.path, text));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to write cache file");
        }
    }

    fn entries(doc: &Map<String, Value>) -> BTreeMap<String, CacheEntry> {
        doc.get(ROOT_KEY)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    fn update<R>(&self, f: impl FnOnce(&mut BTreeMap<String, CacheEntry>) -> R) -> R {
        let _guard = lock(&self.guard);
        let mut doc = self.read_document();
        let mut entries = Self::entries(&doc);
        let result = f(&mut entries);
        self.write_entries(doc, &entries);
        result
    }

    fn write_entries(&self, mut doc: Map<String, Value>, entries: &BTreeMap<String, CacheEntry>) {
        match serde_json::to_value(entries) {
            Ok(value) => {
                doc.insert(ROOT_KEY.to_string(), value);
                self.write_document(doc);
            }
            Err(e) => warn!(error = %e, "failed to encode cache entries"),
        }
    }
}

impl CacheStore for FileStore {
    fn get_item(&self, key: &str) -> Option<Value> {
        let _guard = lock(&self.guard);
        let doc = self.read_document();
        let mut entries = Self::entries(&doc);

        if let Some(value) = entries.get(key)?.live_value() {
            return Some(value.clone());
        }
        entries.remove(key);
        self.write_entries(doc, &entries);
        None
    }

    fn set_item(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl));
        self.update(|entries| {
            entries.insert(key.to_string(), entry);
        });
    }

    fn remove_item(&self, key: &str) {
        self.update(|entries| {
            entries.remove(key);
        });
    }

    fn clear(&self) {
        let _guard = lock(&self.guard);
        let mut doc = self.read_document();
        if doc.remove(ROOT_KEY).is_some() {
            self.write_document(doc);
        }
    }

    fn keys(&self) -> Vec<String> {
        let _guard = lock(&self.guard);
        Self::entries(&self.read_document()).into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread::{self, sleep};

    #[test]
    fn test_open_missing_directory_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = FileStore::open(dir.path().join("missing").join("cache.json"))
            .expect_err("missing parent should fail");
        assert!(matches!(err, Error::CacheUnavailable(_)));
    }

    #[test]
    fn test_open_directory_path_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = FileStore::open(dir.path()).expect_err("directory path should fail");
        assert!(matches!(err, Error::CacheUnavailable(_)));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");

        let store = FileStore::open(&path).expect("open store");
        store.set_item("k", json!({"data": [1, 2]}), None);
        drop(store);

        let store = FileStore::open(&path).expect("reopen store");
        assert_eq!(store.get_item("k"), Some(json!({"data": [1, 2]})));
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_entries_live_under_root_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        fs::write(&path, r#"{"other": true}"#).expect("seed file");

        let store = FileStore::open(&path).expect("open store");
        store.set_item("k", json!(1), None);

        let doc: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read file")).expect("json");
        assert_eq!(doc["other"], json!(true));
        assert_eq!(doc[ROOT_KEY]["k"]["value"], json!(1));

        store.clear();
        let doc: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read file")).expect("json");
        assert_eq!(doc, json!({"other": true}));
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path().join("cache.json"))
            .expect("open store")
            .with_default_ttl(Duration::from_millis(5));

        store.set_item("k", json!(1), None);
        sleep(Duration::from_millis(20));

        assert_eq!(store.get_item("k"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_eviction_never_drops_a_concurrent_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FileStore::open(dir.path().join("cache.json")).expect("open store"));
        store.set_item("k", json!("expired"), Some(Duration::ZERO));
        sleep(Duration::from_millis(5));

        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let _ = store.get_item("k");
                }
            })
        };
        for i in 0..50 {
            store.set_item("k", json!(i), Some(Duration::from_secs(60)));
        }
        reader.join().expect("reader thread");

        assert_eq!(store.get_item("k"), Some(json!(49)));
    }

    #[test]
    fn test_malformed_file_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").expect("seed file");

        let store = FileStore::open(&path).expect("open store");
        assert_eq!(store.get_item("k"), None);
        store.set_item("k", json!(2), None);
        assert_eq!(store.get_item("k"), Some(json!(2)));
    }
}
