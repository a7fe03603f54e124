//! Resource caching.
//!
//! A [`Cache`] binds a [`Strategy`] to a [`CacheStore`]. The strategy decides
//! how a stored [`Snapshot`] interacts with a live fetch:
//!
//! - **`Stale`**: the stored snapshot is shown immediately and the fetch still
//!   runs in the background, overwriting it on completion
//! - **`CacheFirst`**: a stored snapshot satisfies the read, no fetch happens
//! - **`NetworkFirst`**: the fetch runs; the stored snapshot is only used
//!   while offline or after the fetch failed
//!
//! Entries are keyed by `(url, params, body, method)` and scoped by an owner
//! id so two components declaring the same request do not collide.

mod entry;
mod file;
mod store;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::Error;
use crate::request::RequestDescriptor;
use crate::resource::{Resource, Snapshot};

pub use entry::CacheEntry;
pub use file::FileStore;
pub use store::{CacheStore, DEFAULT_TTL, MemoryStore, NullStore};

/// Policy deciding when a cached value is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Stale,
    CacheFirst,
    NetworkFirst,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stale" => Ok(Self::Stale),
            "cache-first" => Ok(Self::CacheFirst),
            "network-first" => Ok(Self::NetworkFirst),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// Outcome of [`Cache::assign_cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Nothing usable was cached; fetch from the network.
    Miss,
    /// The cached snapshot was merged and satisfies the read.
    Satisfied,
    /// The cached snapshot was merged as a placeholder; keep fetching.
    Placeholder,
}

/// Shared online/offline flag consulted by [`Strategy::NetworkFirst`].
#[derive(Debug, Clone)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::Release);
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A store bound to a strategy and an owner scope.
///
/// Clones share the underlying store.
#[derive(Clone)]
pub struct Cache {
    strategy: Strategy,
    store: Arc<dyn CacheStore>,
    owner: String,
    connectivity: Connectivity,
}

impl Cache {
    #[must_use]
    pub fn new(strategy: Strategy, store: impl CacheStore + 'static) -> Self {
        Self::with_store(strategy, Arc::new(store))
    }

    #[must_use]
    pub fn with_store(strategy: Strategy, store: Arc<dyn CacheStore>) -> Self {
        Self {
            strategy,
            store,
            owner: "r".to_string(),
            connectivity: Connectivity::default(),
        }
    }

    /// Returns a copy using `strategy`, sharing the same store.
    #[must_use]
    pub fn with_strategy(&self, strategy: Strategy) -> Self {
        Self {
            strategy,
            ..self.clone()
        }
    }

    /// Returns a copy whose keys are scoped to `owner`.
    #[must_use]
    pub fn scoped(&self, owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Derives the store key for `request`.
    #[must_use]
    pub fn key(&self, request: &RequestDescriptor) -> String {
        let encode = |v: Option<&serde_json::Value>| v.map(ToString::to_string).unwrap_or_default();
        let raw = [
            request.url.clone(),
            encode(request.params()),
            encode(request.body()),
            request.method.as_str().to_string(),
        ]
        .join("|");
        format!("$_tether_{}_{}", self.owner, STANDARD.encode(raw))
    }

    /// Looks up the snapshot stored for `resource`.
    #[must_use]
    pub fn get(&self, resource: &Resource) -> Option<Snapshot> {
        let key = self.key(resource.descriptor()?);
        let value = self.store.get_item(&key)?;
        match serde_json::from_value(value) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cache entry");
                self.store.remove_item(&key);
                None
            }
        }
    }

    /// Stores `value`, or the resource's current snapshot, for `resource`.
    pub fn set(&self, resource: &Resource, value: Option<Snapshot>) {
        let Some(request) = resource.descriptor() else {
            return;
        };
        let snapshot = value.unwrap_or_else(|| resource.snapshot());
        match serde_json::to_value(&snapshot) {
            Ok(value) => self.store.set_item(&self.key(request), value, None),
            Err(e) => warn!(url = %request.url, error = %e, "failed to encode snapshot"),
        }
    }

    /// Merges a cached snapshot onto `resource` according to the strategy.
    ///
    /// Uses `value` when given, otherwise looks the snapshot up in the store.
    pub fn assign_cache(&self, resource: &Resource, value: Option<Snapshot>) -> Assignment {
        let Some(snapshot) = value.or_else(|| self.get(resource)) else {
            return Assignment::Miss;
        };

        let assignment = match self.strategy {
            Strategy::CacheFirst => Assignment::Satisfied,
            Strategy::NetworkFirst
                if !self.connectivity.is_online() || resource.error().is_some() =>
            {
                Assignment::Satisfied
            }
            Strategy::NetworkFirst => return Assignment::Miss,
            Strategy::Stale => Assignment::Placeholder,
        };

        trace!(strategy = ?self.strategy, ?assignment, "assigning cached snapshot");
        resource.assign(snapshot);
        assignment
    }

    /// Removes every entry from the store.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("strategy", &self.strategy)
            .field("owner", &self.owner)
            .field("entries", &self.store.len())
            .field("online", &self.connectivity.is_online())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use serde_json::json;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("stale".parse::<Strategy>(), Ok(Strategy::Stale));
        assert_eq!("cache-first".parse::<Strategy>(), Ok(Strategy::CacheFirst));
        assert_eq!(
            "network-first".parse::<Strategy>(),
            Ok(Strategy::NetworkFirst)
        );
        assert!(matches!(
            "lru".parse::<Strategy>(),
            Err(Error::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_key_depends_on_request_and_owner() {
        let cache = Cache::new(Strategy::Stale, MemoryStore::new());
        let get = RequestDescriptor::new("/items", Method::Get);
        let paged = get.clone().with_payload(Some(json!({"page": 2})));
        let post = RequestDescriptor::new("/items", Method::Post);

        assert_eq!(cache.key(&get), cache.key(&get.clone()));
        assert_ne!(cache.key(&get), cache.key(&paged));
        assert_ne!(cache.key(&get), cache.key(&post));
        assert_ne!(cache.key(&get), cache.scoped("7").key(&get));
        assert!(cache.key(&get).starts_with("$_tether_r_"));
    }

    #[test]
    fn test_scoped_and_strategy_share_store() {
        let cache = Cache::new(Strategy::Stale, MemoryStore::new());
        let other = cache.scoped("1").with_strategy(Strategy::CacheFirst);
        other.store().set_item("x", json!(1), None);

        assert_eq!(cache.store().len(), 1);
        assert_eq!(other.strategy(), Strategy::CacheFirst);
        assert_eq!(other.owner(), "1");
        assert_eq!(cache.owner(), "r");
    }

    #[test]
    fn test_connectivity_is_shared() {
        let connectivity = Connectivity::default();
        let cache = Cache::new(Strategy::NetworkFirst, NullStore)
            .with_connectivity(connectivity.clone());
        assert!(cache.connectivity().is_online());
        connectivity.set_online(false);
        assert!(!cache.connectivity().is_online());
    }
}
