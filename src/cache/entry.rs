use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored value with its absolute expiration time.
///
/// This is the persisted layout: `{ "expiration": <epoch millis>, "value": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub expiration: i64,
    pub value: Value,
}

impl CacheEntry {
    /// Creates an entry that expires `ttl` from now.
    #[must_use]
    pub fn new(value: Value, ttl: Duration) -> Self {
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            expiration: now_millis().saturating_add(ttl),
            value,
        }
    }

    /// Checks if this entry is past its expiration.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        now_millis() > self.expiration
    }

    /// Returns the value if the entry is still usable.
    ///
    /// Expired entries and entries holding `null` are treated as absent.
    #[must_use]
    pub fn live_value(&self) -> Option<&Value> {
        (!self.is_expired() && !self.value.is_null()).then_some(&self.value)
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;

    #[test]
    fn test_new_entry() {
        let entry = CacheEntry::new(json!(42), Duration::from_secs(60));
        assert_eq!(entry.value, json!(42));
        assert!(!entry.is_expired());
        assert_eq!(entry.live_value(), Some(&json!(42)));
    }

    #[test]
    fn test_entry_expires() {
        let entry = CacheEntry::new(json!(42), Duration::from_millis(5));
        sleep(Duration::from_millis(20));
        assert!(entry.is_expired());
        assert_eq!(entry.live_value(), None);
    }

    #[test]
    fn test_null_value_is_absent() {
        let entry = CacheEntry::new(Value::Null, Duration::from_secs(60));
        assert_eq!(entry.live_value(), None);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new(json!(1), Duration::MAX);
        assert_eq!(entry.expiration, i64::MAX);
    }

    #[test]
    fn test_persisted_layout() {
        let entry = CacheEntry {
            expiration: 1_700_000_000_000,
            value: json!({"data": [1]}),
        };
        assert_eq!(
            serde_json::to_value(&entry).expect("entry serializes"),
            json!({"expiration": 1_700_000_000_000_i64, "value": {"data": [1]}})
        );
    }
}
