use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Observable state of a resource.
///
/// This is also the value written to the cache and shipped in SSR state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub last_loaded: Option<DateTime<Utc>>,
}

/// Coarse lifecycle position derived from a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Error,
}

impl Phase {
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl Snapshot {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        if self.loading {
            Phase::Loading
        } else if self.error.is_some() {
            Phase::Error
        } else if self.status.is_some() || self.data.is_some() {
            Phase::Success
        } else {
            Phase::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase() {
        let mut snapshot = Snapshot::default();
        assert_eq!(snapshot.phase(), Phase::Idle);

        snapshot.loading = true;
        assert_eq!(snapshot.phase(), Phase::Loading);
        assert!(!snapshot.phase().is_settled());

        snapshot.loading = false;
        snapshot.status = Some(200);
        assert_eq!(snapshot.phase(), Phase::Success);

        snapshot.error = Some(json!(true));
        assert_eq!(snapshot.phase(), Phase::Error);
        assert!(snapshot.phase().is_settled());
    }

    #[test]
    fn test_serialized_field_names() {
        let snapshot = Snapshot {
            status: Some(200),
            data: Some(json!([1])),
            ..Snapshot::default()
        };
        let value = serde_json::to_value(&snapshot).expect("snapshot serializes");
        assert_eq!(value["status"], json!(200));
        assert_eq!(value["data"], json!([1]));
        assert!(value.get("lastLoaded").is_some());

        let back: Snapshot = serde_json::from_value(json!({"data": [1]})).expect("partial");
        assert_eq!(back.data, Some(json!([1])));
        assert!(!back.loading);
    }
}
