//! # Tether - reactive HTTP resource bindings
//!
//! Tether binds named HTTP requests ("resources") to UI components and exposes
//! their loading, data and error state. It is built for Elm-architecture style
//! runtimes on top of [tokio](https://tokio.rs/): the host runtime drives the
//! lifecycle hooks and receives results as [`Command`](command::Command)s.
//!
//! ## Architecture
//!
//! 1. **Cache store**: pluggable persistence ([`MemoryStore`](cache::MemoryStore),
//!    [`FileStore`](cache::FileStore), [`NullStore`](cache::NullStore))
//! 2. **Cache strategy**: [`Cache`](cache::Cache) decides whether a stored
//!    snapshot replaces, precedes or backs up a network fetch
//! 3. **Resource**: [`Resource`](resource::Resource) owns one request, its
//!    state machine, debounced reloads, polling and cancellation
//! 4. **Coordinator**: [`Coordinator`](coordinator::Coordinator) groups named
//!    resources, re-derives reactive ones and cancels them in bulk
//! 5. **SSR**: [`ssr::prefetch`] fills resources on the server and
//!    [`Coordinator::hydrate`](coordinator::Coordinator::hydrate) hands the
//!    result to the client
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use std::sync::Arc;
//! use tether::client::mock::{MockClient, MockReply};
//! use tether::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tether::Error> {
//! let client = MockClient::new();
//! client.reply(Method::Get, "/items", MockReply::ok(json!([1, 2, 3])));
//!
//! let options = Options::default().with_client(Arc::new(client));
//! let items = Resource::from_spec("/items", &options)?;
//!
//! let data = items.execute().await?;
//! assert_eq!(data, Some(json!([1, 2, 3])));
//! assert!(!items.loading());
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cache;
pub mod client;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod prelude;
pub mod request;
pub mod resource;
pub mod ssr;

pub use error::{Error, ErrorKind, Result};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// Every critical section in the crate leaves its data consistent before any
/// call that could panic, so a poisoned lock is safe to reuse.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
