use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;

use super::entry::CacheEntry;

/// Default time-to-live for stored entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Persistence backend for cached resource snapshots.
///
/// Every operation runs to completion without yielding, so a read never
/// observes a half-written entry.
pub trait CacheStore: Send + Sync {
    /// Returns the value stored under `key` if it has not expired.
    ///
    /// Expired entries are evicted on read.
    fn get_item(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key` for `ttl`, or the store's default TTL.
    fn set_item(&self, key: &str, value: Value, ttl: Option<Duration>);

    fn remove_item(&self, key: &str);

    /// Removes every entry owned by this store.
    fn clear(&self);

    fn keys(&self) -> Vec<String>;

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store that lives as long as the process.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<Value> {
        if let Some(value) = self
            .entries
            .get(key)
            .and_then(|entry| entry.live_value().cloned())
        {
            return Some(value);
        }
        self.entries
            .remove_if(key, |_, entry| entry.live_value().is_none());
        None
    }

    fn set_item(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl));
        self.entries.insert(key.to_string(), entry);
    }

    fn remove_item(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Store that drops everything. Used when caching is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl CacheStore for NullStore {
    fn get_item(&self, _key: &str) -> Option<Value> {
        None
    }

    fn set_item(&self, _key: &str, _value: Value, _ttl: Option<Duration>) {}

    fn remove_item(&self, _key: &str) {}

    fn clear(&self) {}

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    #[test]
    fn test_memory_round_trip() {
        let store = MemoryStore::new();
        store.set_item("a", json!({"data": 1}), None);
        assert_eq!(store.get_item("a"), Some(json!({"data": 1})));
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_memory_expired_entry_is_evicted() {
        let store = MemoryStore::new();
        store.set_item("a", json!(1), Some(Duration::from_millis(5)));
        sleep(Duration::from_millis(20));

        assert_eq!(store.get_item("a"), None);
        assert!(store.is_empty(), "expired entry should be evicted on read");
    }

    #[test]
    fn test_memory_default_ttl() {
        let store = MemoryStore::with_default_ttl(Duration::from_millis(5));
        store.set_item("a", json!(1), None);
        sleep(Duration::from_millis(20));
        assert_eq!(store.get_item("a"), None);
    }

    #[test]
    fn test_memory_remove_and_clear() {
        let store = MemoryStore::new();
        store.set_item("a", json!(1), None);
        store.set_item("b", json!(2), None);

        store.remove_item("a");
        assert_eq!(store.get_item("a"), None);
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_null_store_drops_everything() {
        let store = NullStore;
        store.set_item("a", json!(1), None);
        assert_eq!(store.get_item("a"), None);
        assert!(store.keys().is_empty());
        assert_eq!(store.len(), 0);
    }
}
