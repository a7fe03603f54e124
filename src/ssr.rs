//! Server-side prefetch.
//!
//! On the server, [`prefetch`] loads every eligible resource of the rendered
//! components and collects their snapshots into an [`SsrState`]. The state is
//! serialized into the page; on the client each component hands its slice to
//! [`Coordinator::hydrate`] before mounting, so hydrated resources are not
//! fetched a second time.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use std::sync::Arc;
//! use tether::client::mock::{MockClient, MockReply};
//! use tether::coordinator::Coordinator;
//! use tether::prelude::*;
//! use tether::ssr;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tether::Error> {
//! let client = MockClient::new();
//! client.reply(Method::Get, "/items", MockReply::ok(json!([1, 2])));
//! let options = Options::default()
//!     .with_client(Arc::new(client))
//!     .with_server(true);
//!
//! let page = Coordinator::builder(options.clone()).resource("items", "/items").build()?;
//! let state = ssr::prefetch(&[&page], options.ssr_prefetch_timeout).await;
//! let json = serde_json::to_string(&state).expect("state serializes");
//!
//! let restored: ssr::SsrState = serde_json::from_str(&json).expect("state deserializes");
//! assert_eq!(restored.component(0).and_then(|c| c["items"].data.clone()), Some(json!([1, 2])));
//! # Ok(())
//! # }
//! ```
//!
//! [`Coordinator::hydrate`]: crate::coordinator::Coordinator::hydrate

use std::collections::BTreeMap;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SsrPrefetch;
use crate::coordinator::Coordinator;
use crate::lock;
use crate::resource::{Resource, Snapshot};

/// Prefetched snapshots, indexed by component then resource name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SsrState(pub Vec<BTreeMap<String, Snapshot>>);

impl SsrState {
    /// Snapshots of the component at `index`.
    #[must_use]
    pub fn component(&self, index: usize) -> Option<&BTreeMap<String, Snapshot>> {
        self.0.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn eligible(resource: &Resource) -> bool {
    !resource.is_placeholder()
        && resource.prefetch()
        && resource.ssr_prefetch() != SsrPrefetch::Disabled
}

/// Prefetches every eligible resource of `components` concurrently.
///
/// A resource is eligible when it prefetches and its SSR policy is not
/// [`SsrPrefetch::Disabled`]. Failed loads are logged and recorded like
/// successful ones. When `timeout` elapses first, every load still in flight
/// is cancelled and the snapshots collected so far are returned.
pub async fn prefetch(components: &[&Coordinator], timeout: Duration) -> SsrState {
    let state = Arc::new(Mutex::new(vec![BTreeMap::new(); components.len()]));
    let mut in_flight = Vec::new();
    let mut loads = Vec::new();

    for (index, coordinator) in components.iter().enumerate() {
        for (name, resource) in coordinator.resources() {
            if !eligible(&resource) {
                continue;
            }
            in_flight.push(resource.clone());

            let state = state.clone();
            loads.push(async move {
                if let Err(e) = resource.execute().await {
                    warn!(component = index, resource = %name, error = %e, "ssr prefetch failed");
                }
                resource.mark_ssr_prefetched();
                if let Some(component) = lock(&state).get_mut(index) {
                    component.insert(name, resource.snapshot());
                }
            });
        }
    }

    debug!(resources = loads.len(), "ssr prefetch started");
    if tokio::time::timeout(timeout, join_all(loads)).await.is_err() {
        warn!(timeout_ms = timeout.as_millis(), "ssr prefetch timed out");
        for resource in in_flight {
            resource.cancel(false);
        }
    }

    let components = mem::take(&mut *lock(&state));
    SsrState(components)
}
