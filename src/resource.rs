//! HTTP resources and their lifecycle.
//!
//! A [`Resource`] owns one [`RequestDescriptor`] and the observable state of
//! its latest call. It moves through `idle → loading → success | error`,
//! consults its [`Cache`] before going to the network, and notifies listeners
//! registered with [`Resource::on`].
//!
//! Resources are cheap handles; clones share state. A placeholder resource
//! (see [`Resource::placeholder`]) stands in for a reactive declaration that
//! currently resolves to nothing: it never loads and every accessor is empty.
//!
//! # Example
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
//! client.reply(Method::Post, "/users", MockReply::ok(json!({"id": 7})));
//!
//! let options = Options::default().with_client(Arc::new(client));
//! let users = Resource::from_spec(ResourceOptions::new("/users").method("post"), &options)?;
//!
//! users.on(Event::Success, |r| println!("created: {:?}", r.data()));
//! let created = users.send(Some(json!({"name": "ada"}))).await?;
//! assert_eq!(created, Some(json!({"id": 7})));
//! # Ok(())
//! # }
//! ```

mod debounce;
mod events;
mod interval;
mod state;

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::cache::{Assignment, Cache, Strategy};
use crate::client::{HttpClient, Response, TransportError};
use crate::config::{Options, ResourceOptions, SsrPrefetch, Transformer};
use crate::error::{Error, ErrorKind, Result};
use crate::lock;
use crate::request::{Method, RequestDescriptor};

use debounce::{Debouncer, Slot};
use interval::Poller;

pub use events::{Event, Listener};
pub use state::{Phase, Snapshot};

use events::EventBus;

/// Declarative input accepted by [`Resource::from_spec`].
#[derive(Debug, Clone)]
pub enum ResourceSpec {
    Url(String),
    Options(ResourceOptions),
    /// An already built resource, used as is.
    Resource(Resource),
}

impl From<&str> for ResourceSpec {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for ResourceSpec {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<ResourceOptions> for ResourceSpec {
    fn from(options: ResourceOptions) -> Self {
        Self::Options(options)
    }
}

impl From<Resource> for ResourceSpec {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

/// Handle to a resource. Clones share state.
#[derive(Clone)]
pub struct Resource {
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    Real(Arc<Inner>),
    Placeholder,
}

pub(crate) struct Inner {
    descriptor: RequestDescriptor,
    client: Arc<dyn HttpClient>,
    cache: Option<Cache>,
    transformer: Transformer,
    prefetch: bool,
    ssr_prefetch: SsrPrefetch,
    keep_data: bool,
    server: bool,
    interval: Option<Duration>,
    state: Mutex<State>,
    events: EventBus,
    debouncer: Debouncer,
    poller: Mutex<Option<Poller>>,
}

struct State {
    snapshot: Snapshot,
    cache_hit: bool,
    ssr_prefetched: bool,
    token: CancellationToken,
    /// Incremented per issued request; only the latest may clear `loading`.
    generation: u64,
}

impl Resource {
    /// Builds a resource from a URL, a [`ResourceOptions`] or an existing
    /// resource.
    ///
    /// Polling configured through `interval` starts immediately when a tokio
    /// runtime is available, otherwise on [`Coordinator::mount`].
    ///
    /// # Errors
    ///
    /// - [`Error::BadMethod`] for an unsupported method
    /// - [`Error::CacheMisconfigured`] for a cache override without a base cache
    /// - [`Error::ClientUnavailable`] when no client can be obtained
    ///
    /// [`Coordinator::mount`]: crate::coordinator::Coordinator::mount
    pub fn from_spec(spec: impl Into<ResourceSpec>, options: &Options) -> Result<Self> {
        match spec.into() {
            ResourceSpec::Url(url) => Self::build(ResourceOptions::new(url), options),
            ResourceSpec::Options(resource_options) => Self::build(resource_options, options),
            ResourceSpec::Resource(resource) => Ok(resource),
        }
    }

    /// Builds a resource from a JSON declaration: a URL string or an options
    /// object.
    ///
    /// # Errors
    ///
    /// [`Error::NullDescriptor`] for `null`, [`Error::InvalidOptions`] for any
    /// other non-string, non-object value or a malformed object, plus the
    /// errors of [`Resource::from_spec`].
    pub fn from_value(value: &Value, options: &Options) -> Result<Self> {
        match value {
            Value::Null => Err(Error::NullDescriptor),
            Value::String(url) => Self::from_spec(url.as_str(), options),
            Value::Object(_) => {
                let resource_options: ResourceOptions = serde_json::from_value(value.clone())
                    .map_err(|e| Error::InvalidOptions(e.to_string()))?;
                Self::from_spec(resource_options, options)
            }
            other => Err(Error::InvalidOptions(format!(
                "expected a URL or an options object, got {other}"
            ))),
        }
    }

    /// Returns an inert resource.
    #[must_use]
    pub const fn placeholder() -> Self {
        Self {
            kind: Kind::Placeholder,
        }
    }

    pub(crate) const fn from_inner(inner: Arc<Inner>) -> Self {
        Self {
            kind: Kind::Real(inner),
        }
    }

    fn build(resource_options: ResourceOptions, options: &Options) -> Result<Self> {
        let ResourceOptions {
            url,
            method,
            params,
            headers,
            timeout,
            debounce,
            interval,
            prefetch,
            ssr_prefetch,
            keep_data,
            cache,
            transformer,
            listeners,
            client,
        } = resource_options;

        let method: Method = match method {
            Some(m) => m.parse()?,
            None => Method::default(),
        };

        let cache = match (cache, &options.cache) {
            (Some(_), None) => return Err(Error::CacheMisconfigured(url)),
            (Some(over), Some(base)) => Some(
                over.strategy
                    .map_or_else(|| base.clone(), |s| base.with_strategy(s)),
            ),
            (None, base) => base.clone(),
        };

        let client = match client {
            Some(client) => client,
            None => options.client()?,
        };

        let mut all_headers = options.headers.clone();
        all_headers.extend(headers);

        let descriptor = RequestDescriptor::new(url, method)
            .with_payload(params)
            .with_headers(all_headers)
            .with_timeout(timeout.or(options.timeout));

        let inner = Inner {
            descriptor,
            client,
            cache,
            transformer: transformer.unwrap_or_else(|| options.transformer.clone()),
            prefetch: prefetch.unwrap_or(options.prefetch).applies_to(method),
            ssr_prefetch: ssr_prefetch.unwrap_or(options.ssr_prefetch),
            keep_data: keep_data.unwrap_or(options.keep_data),
            server: options.server,
            interval: interval.or(options.interval),
            state: Mutex::new(State {
                snapshot: Snapshot::default(),
                cache_hit: false,
                ssr_prefetched: false,
                token: CancellationToken::new(),
                generation: 0,
            }),
            events: EventBus::default(),
            debouncer: Debouncer::new(debounce.unwrap_or(options.debounce)),
            poller: Mutex::new(None),
        };

        for (event, listener) in listeners {
            inner.events.on(event, listener);
        }

        let resource = Self::from_inner(Arc::new(inner));
        if let Some(period) = resource.interval() {
            if Handle::try_current().is_ok() {
                resource.start_interval(period);
            }
        }
        Ok(resource)
    }

    fn inner(&self) -> Option<&Arc<Inner>> {
        match &self.kind {
            Kind::Real(inner) => Some(inner),
            Kind::Placeholder => None,
        }
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Option<T> {
        self.inner().map(|inner| f(&lock(&inner.state)))
    }

    fn write(&self, f: impl FnOnce(&mut State)) {
        if let Some(inner) = self.inner() {
            f(&mut lock(&inner.state));
        }
    }

    // --- lifecycle ---

    /// Loads the resource, consulting the cache unless `force` is set.
    ///
    /// On a tokio runtime the request is spawned before this returns, so it
    /// settles whether or not the returned future is awaited. Outside a
    /// runtime it runs when the future is polled, and dropping the future
    /// unpolled clears `loading`. `extra` is merged into the declared params
    /// or body for this call only.
    pub fn fetch(&self, force: bool, extra: Option<Value>) -> BoxFuture<'static, Result<Option<Value>>> {
        let Some(inner) = self.inner() else {
            return future::ready(Err(Error::NotAvailable)).boxed();
        };

        let mut refresh_in_background = false;
        if !force {
            if let Some(cache) = &inner.cache {
                match cache.assign_cache(self, None) {
                    Assignment::Satisfied => {
                        self.write(|s| s.cache_hit = true);
                        trace!(url = %inner.descriptor.url, "served from cache");
                        return future::ready(Ok(self.data())).boxed();
                    }
                    Assignment::Placeholder => {
                        self.write(|s| s.cache_hit = true);
                        trace!(url = %inner.descriptor.url, "served stale cache entry");
                        refresh_in_background = true;
                    }
                    Assignment::Miss => {}
                }
            }
        }

        let request = inner.descriptor.merged(extra);
        let (token, generation) = {
            let mut state = lock(&inner.state);
            state.generation += 1;
            state.snapshot.loading = true;
            (state.token.clone(), state.generation)
        };

        debug!(url = %request.url, method = %request.method, "fetching resource");
        self.emit(Event::Loading);

        let guard = LoadingGuard::new(self.clone(), generation);
        let response = inner.client.request(request, token.clone());
        let resource = self.clone();
        let settle = async move {
            let result = response.await;
            guard.disarm();
            resource.settle(result, &token, generation)
        };

        let runtime = Handle::try_current();
        if refresh_in_background {
            let cached = self.data();
            match runtime {
                Ok(handle) => {
                    let url = inner.descriptor.url.clone();
                    handle.spawn(async move {
                        if let Err(e) = settle.await {
                            warn!(url = %url, error = %e, "background refresh failed");
                        }
                    });
                }
                Err(_) => warn!(url = %inner.descriptor.url, "no runtime for background refresh"),
            }
            return future::ready(Ok(cached)).boxed();
        }

        match runtime {
            Ok(handle) => {
                let task = handle.spawn(settle);
                async move {
                    task.await
                        .unwrap_or_else(|e| Err(Error::Aborted(e.to_string())))
                }
                .boxed()
            }
            Err(_) => settle.boxed(),
        }
    }

    fn settle(
        &self,
        result: Result<Response, TransportError>,
        token: &CancellationToken,
        generation: u64,
    ) -> Result<Option<Value>> {
        let Some(inner) = self.inner() else {
            return Err(Error::NotAvailable);
        };

        if token.is_cancelled() {
            self.write(|s| {
                if s.generation == generation {
                    s.snapshot.loading = false;
                }
            });
            debug!(url = %inner.descriptor.url, "discarding cancelled response");
            self.emit(Event::Cancel);
            return Err(Error::Cancelled);
        }

        match result {
            Ok(response) => {
                let Response {
                    status,
                    data,
                    headers,
                } = response;
                let data = match data {
                    Value::Null => None,
                    body => Some((inner.transformer.response)(body)),
                };

                self.write(|s| {
                    if s.generation == generation {
                        s.snapshot.loading = false;
                    }
                    s.cache_hit = false;
                    s.snapshot.error = None;
                    s.snapshot.status = Some(status);
                    s.snapshot.headers = Some(headers);
                    s.snapshot.data = data.clone();
                    s.snapshot.last_loaded = Some(Utc::now());
                });
                if let Some(cache) = &inner.cache {
                    cache.set(self, None);
                }

                debug!(url = %inner.descriptor.url, status, "resource loaded");
                self.emit(Event::Success);
                Ok(data)
            }
            Err(e) => self.fail(inner, e, generation),
        }
    }

    fn fail(&self, inner: &Inner, e: TransportError, generation: u64) -> Result<Option<Value>> {
        let (status, headers, error) = match e.response() {
            Some(response) => {
                let error = match &response.data {
                    Value::Null => Value::Bool(true),
                    body => (inner.transformer.error)(body.clone()),
                };
                (response.status, response.headers.clone(), error)
            }
            None => (0, BTreeMap::new(), Value::Bool(true)),
        };

        self.write(|s| {
            if s.generation == generation {
                s.snapshot.loading = false;
            }
            s.snapshot.data = None;
            s.snapshot.status = Some(status);
            s.snapshot.headers = Some(headers);
            s.snapshot.error = Some(error);
        });

        if let Some(cache) = &inner.cache {
            if cache.strategy() == Strategy::NetworkFirst
                && cache.assign_cache(self, None) == Assignment::Satisfied
            {
                self.write(|s| s.cache_hit = true);
                debug!(url = %inner.descriptor.url, status, "request failed, serving cached copy");
                return Ok(self.data());
            }
        }

        let error = match e {
            TransportError::Status(response) => Error::Response {
                status: response.status,
                body: response.data,
            },
            TransportError::NoResponse(message) => Error::Network(message),
            TransportError::Timeout => Error::Timeout,
            TransportError::Cancelled => Error::Cancelled,
        };
        let event = match error.kind() {
            ErrorKind::Timeout => Event::Timeout,
            ErrorKind::Cancelled => Event::Cancel,
            _ => Event::Error,
        };

        debug!(url = %inner.descriptor.url, status, error = %error, "resource failed");
        self.emit(event);
        Err(error)
    }

    /// Debounced [`fetch`](Self::fetch).
    ///
    /// The first call in a quiet period starts a fetch on the current tokio
    /// runtime; it runs whether or not the returned future is awaited. Calls
    /// within the debounce window of the previous call share that fetch's
    /// outcome.
    pub fn reload(&self, force: bool) -> BoxFuture<'static, Result<Option<Value>>> {
        let Some(inner) = self.inner() else {
            return future::ready(Err(Error::NotAvailable)).boxed();
        };
        let Ok(handle) = Handle::try_current() else {
            return future::ready(Err(Error::Aborted("no tokio runtime".to_string()))).boxed();
        };

        match inner.debouncer.acquire() {
            Slot::Join(pending) => {
                trace!(url = %inner.descriptor.url, "reload joined pending call");
                pending.boxed()
            }
            Slot::Lead(pending, tx) => {
                let fetch = self.fetch(force, None);
                handle.spawn(async move {
                    // The receiver is gone once every caller dropped its future.
                    let _ = tx.send(fetch.await);
                });
                pending.boxed()
            }
        }
    }

    /// Forced fetch, skipping cache and debounce.
    pub fn execute(&self) -> BoxFuture<'static, Result<Option<Value>>> {
        self.send(None)
    }

    /// Forced fetch with `extra` merged into the payload.
    ///
    /// Like [`reload`](Self::reload), the call runs on the current runtime
    /// even if the returned future is dropped.
    pub fn send(&self, extra: Option<Value>) -> BoxFuture<'static, Result<Option<Value>>> {
        if self.is_placeholder() {
            return future::ready(Err(Error::NotAvailable)).boxed();
        }
        if Handle::try_current().is_err() {
            return future::ready(Err(Error::Aborted("no tokio runtime".to_string()))).boxed();
        }
        self.fetch(true, extra)
    }

    /// Stops polling and aborts the in-flight request.
    ///
    /// With `unload`, the current data is dropped as well. The resource stays
    /// usable: later fetches run under a fresh cancellation token.
    pub fn cancel(&self, unload: bool) {
        let Some(inner) = self.inner() else {
            return;
        };
        self.stop_interval();

        let previous = {
            let mut state = lock(&inner.state);
            if unload {
                state.snapshot.data = None;
            }
            mem::replace(&mut state.token, CancellationToken::new())
        };
        previous.cancel();
        inner.debouncer.reset();
        debug!(url = %inner.descriptor.url, unload, "resource cancelled");
    }

    /// Same as `cancel(false)`.
    pub fn stop(&self) {
        self.cancel(false);
    }

    /// Reloads the resource every `period`, replacing any previous poller.
    ///
    /// Does nothing for placeholders, in server context, for a zero period,
    /// or outside a tokio runtime.
    pub fn start_interval(&self, period: Duration) {
        let Some(inner) = self.inner() else {
            return;
        };
        if inner.server {
            debug!(url = %inner.descriptor.url, "polling disabled in server context");
            return;
        }
        if period.is_zero() {
            warn!(url = %inner.descriptor.url, "ignoring zero polling period");
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(url = %inner.descriptor.url, "no runtime to poll on");
            return;
        };

        let poller = Poller::spawn(&handle, period, Arc::downgrade(inner));
        let previous = lock(&inner.poller).replace(poller);
        drop(previous);
        debug!(url = %inner.descriptor.url, period_ms = period.as_millis(), "polling started");
    }

    /// Stops polling. The in-flight request, if any, is left alone.
    pub fn stop_interval(&self) {
        let Some(inner) = self.inner() else {
            return;
        };
        let previous = lock(&inner.poller).take();
        if let Some(poller) = previous {
            debug!(url = %inner.descriptor.url, period_ms = poller.period().as_millis(), "polling stopped");
        }
    }

    // --- events ---

    /// Registers `listener` for `event`. Listeners run in registration order.
    pub fn on(&self, event: Event, listener: impl Fn(&Self) + Send + Sync + 'static) {
        if let Some(inner) = self.inner() {
            inner.events.on(event, Arc::new(listener));
        }
    }

    /// Runs the listeners registered for `event`.
    pub fn emit(&self, event: Event) {
        if let Some(inner) = self.inner() {
            inner.events.emit(event, self);
        }
    }

    // --- accessors ---

    #[must_use]
    pub fn loading(&self) -> bool {
        self.read(|s| s.snapshot.loading).unwrap_or(false)
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.read(|s| s.snapshot.status).flatten()
    }

    #[must_use]
    pub fn data(&self) -> Option<Value> {
        self.read(|s| s.snapshot.data.clone()).flatten()
    }

    #[must_use]
    pub fn headers(&self) -> Option<BTreeMap<String, String>> {
        self.read(|s| s.snapshot.headers.clone()).flatten()
    }

    #[must_use]
    pub fn error(&self) -> Option<Value> {
        self.read(|s| s.snapshot.error.clone()).flatten()
    }

    #[must_use]
    pub fn last_loaded(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.snapshot.last_loaded).flatten()
    }

    /// Whether the current data came from the cache.
    #[must_use]
    pub fn cache_hit(&self) -> bool {
        self.read(|s| s.cache_hit).unwrap_or(false)
    }

    #[must_use]
    pub fn ssr_prefetched(&self) -> bool {
        self.read(|s| s.ssr_prefetched).unwrap_or(false)
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.read(|s| s.snapshot.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.snapshot().phase()
    }

    /// Whether the resource loads when its component mounts.
    #[must_use]
    pub fn prefetch(&self) -> bool {
        self.inner().is_some_and(|inner| inner.prefetch)
    }

    #[must_use]
    pub fn ssr_prefetch(&self) -> SsrPrefetch {
        self.inner()
            .map_or(SsrPrefetch::Disabled, |inner| inner.ssr_prefetch)
    }

    #[must_use]
    pub fn keep_data(&self) -> bool {
        self.inner().is_some_and(|inner| inner.keep_data)
    }

    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.inner().and_then(|inner| inner.interval)
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.inner()
            .is_some_and(|inner| lock(&inner.poller).is_some())
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.inner()
            .map_or(Duration::ZERO, |inner| inner.debouncer.window())
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&RequestDescriptor> {
        self.inner().map(|inner| &inner.descriptor)
    }

    #[must_use]
    pub fn cache(&self) -> Option<&Cache> {
        self.inner().and_then(|inner| inner.cache.as_ref())
    }

    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self.kind, Kind::Placeholder)
    }

    /// Whether both handles point at the same resource.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (Kind::Real(a), Kind::Real(b)) => Arc::ptr_eq(a, b),
            (Kind::Placeholder, Kind::Placeholder) => true,
            _ => false,
        }
    }

    // --- state transfer ---

    /// Replaces the observable state with `snapshot`, keeping `loading`.
    pub(crate) fn assign(&self, snapshot: Snapshot) {
        self.write(|s| {
            let loading = s.snapshot.loading;
            s.snapshot = Snapshot {
                loading,
                ..snapshot
            };
        });
    }

    /// Adopts server-prefetched state.
    pub(crate) fn hydrate(&self, snapshot: &Snapshot) {
        self.write(|s| {
            s.snapshot.data.clone_from(&snapshot.data);
            s.snapshot.status = snapshot.status;
            s.snapshot.headers.clone_from(&snapshot.headers);
            s.snapshot.last_loaded = snapshot.last_loaded;
            s.ssr_prefetched = true;
        });
    }

    pub(crate) fn mark_ssr_prefetched(&self) {
        self.write(|s| s.ssr_prefetched = true);
    }

    /// Takes over state from the resource this one replaces.
    ///
    /// `last_loaded` always carries over; data, status, headers and error only
    /// when `previous` keeps data.
    pub(crate) fn carry_from(&self, previous: &Self) {
        let snapshot = previous.snapshot();
        let keep_data = previous.keep_data();
        self.write(|s| {
            if keep_data {
                s.snapshot.data = snapshot.data;
                s.snapshot.status = snapshot.status;
                s.snapshot.headers = snapshot.headers;
                s.snapshot.error = snapshot.error;
            }
            s.snapshot.last_loaded = snapshot.last_loaded;
        });
    }
}

/// Clears `loading` for its generation if a fetch is dropped before it settles.
struct LoadingGuard {
    resource: Resource,
    generation: u64,
    armed: bool,
}

impl LoadingGuard {
    fn new(resource: Resource, generation: u64) -> Self {
        Self {
            resource,
            generation,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let generation = self.generation;
        self.resource.write(|s| {
            if s.generation == generation {
                s.snapshot.loading = false;
            }
        });
        trace!("fetch dropped before settling");
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner() {
            None => f.write_str("Resource::Placeholder"),
            Some(inner) => f
                .debug_struct("Resource")
                .field("method", &inner.descriptor.method)
                .field("url", &inner.descriptor.url)
                .field("phase", &self.phase())
                .field("cache_hit", &self.cache_hit())
                .field("polling", &self.is_polling())
                .field("listeners", &inner.events.len())
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::client::mock::{MockClient, MockReply};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn options(client: &MockClient) -> Options {
        Options::default().with_client(Arc::new(client.clone()))
    }

    #[test]
    fn test_from_value_variants() {
        let client = MockClient::new();
        let options = options(&client);

        assert_eq!(
            Resource::from_value(&Value::Null, &options).map(|_| ()),
            Err(Error::NullDescriptor)
        );
        assert!(matches!(
            Resource::from_value(&json!(3), &options),
            Err(Error::InvalidOptions(_))
        ));

        let r = Resource::from_value(&json!("/a"), &options).expect("url declaration");
        assert_eq!(r.descriptor().map(|d| d.url.as_str()), Some("/a"));

        let r = Resource::from_value(
            &json!({"url": "/b", "method": "delete", "params": {"id": 1}}),
            &options,
        )
        .expect("object declaration");
        let descriptor = r.descriptor().expect("real resource");
        assert_eq!(descriptor.method, Method::Delete);
        assert_eq!(descriptor.body(), Some(&json!({"id": 1})));
        assert!(!r.prefetch(), "only GET prefetches by default");
    }

    #[test]
    fn test_bad_method_is_rejected() {
        let client = MockClient::new();
        let err = Resource::from_spec(ResourceOptions::new("/a").method("fetch"), &options(&client))
            .map(|_| ())
            .expect_err("unknown method");
        assert!(matches!(err, Error::BadMethod(_)));
    }

    #[test]
    fn test_cache_override_requires_base_cache() {
        let client = MockClient::new();
        let spec = ResourceOptions::new("/a").cache_strategy(Strategy::CacheFirst);
        assert!(matches!(
            Resource::from_spec(spec.clone(), &options(&client)),
            Err(Error::CacheMisconfigured(_))
        ));

        let with_cache = options(&client).with_cache(Cache::new(Strategy::Stale, MemoryStore::new()));
        let r = Resource::from_spec(spec, &with_cache).expect("override applies");
        assert_eq!(r.cache().map(Cache::strategy), Some(Strategy::CacheFirst));
    }

    #[test]
    fn test_headers_and_timeout_merge_with_defaults() {
        let client = MockClient::new();
        let options = options(&client)
            .with_header("accept", "application/json")
            .with_header("x-token", "global")
            .with_timeout(Duration::from_secs(5));
        let r = Resource::from_spec(ResourceOptions::new("/a").header("x-token", "local"), &options)
            .expect("resource");

        let descriptor = r.descriptor().expect("real resource");
        assert_eq!(descriptor.headers["accept"], "application/json");
        assert_eq!(descriptor.headers["x-token"], "local");
        assert_eq!(descriptor.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_existing_resource_is_reused() {
        let client = MockClient::new();
        let r = Resource::from_spec("/a", &options(&client)).expect("resource");
        let same = Resource::from_spec(r.clone(), &options(&client)).expect("resource");
        assert!(r.ptr_eq(&same));
    }

    #[tokio::test]
    async fn test_placeholder_is_inert() {
        let r = Resource::placeholder();
        assert!(r.is_placeholder());
        assert!(!r.loading());
        assert_eq!(r.status(), None);
        assert_eq!(r.data(), None);
        assert_eq!(r.fetch(false, None).await, Err(Error::NotAvailable));
        assert_eq!(r.reload(false).await, Err(Error::NotAvailable));
        assert_eq!(r.execute().await, Err(Error::NotAvailable));
        r.cancel(true);
        r.start_interval(Duration::from_secs(1));
        assert!(!r.is_polling());
    }

    #[tokio::test]
    async fn test_success_updates_state_and_emits() {
        let client = MockClient::new();
        client.reply(
            Method::Get,
            "/items",
            MockReply::ok(json!([1, 2, 3])).with_header("etag", "v1"),
        );
        let r = Resource::from_spec("/items", &options(&client)).expect("resource");

        let events = Arc::new(Mutex::new(Vec::new()));
        for event in [Event::Loading, Event::Success, Event::Error] {
            let events = events.clone();
            r.on(event, move |res| lock(&events).push((event, res.loading())));
        }

        assert_eq!(r.execute().await, Ok(Some(json!([1, 2, 3]))));
        assert_eq!(r.data(), Some(json!([1, 2, 3])));
        assert_eq!(r.status(), Some(200));
        assert_eq!(r.error(), None);
        assert!(!r.loading());
        assert!(r.last_loaded().is_some());
        assert_eq!(r.headers().and_then(|h| h.get("etag").cloned()), Some("v1".to_string()));
        assert_eq!(
            *lock(&events),
            vec![(Event::Loading, true), (Event::Success, false)]
        );
    }

    #[tokio::test]
    async fn test_error_response_is_transformed() {
        let client = MockClient::new();
        client.reply(Method::Get, "/a", MockReply::status(422, json!({"msg": "bad"})));
        let options = options(&client).with_transformer(Transformer::new(
            |v| v,
            |v| v.get("msg").cloned().unwrap_or(Value::Null),
        ));
        let r = Resource::from_spec("/a", &options).expect("resource");

        let err = r.execute().await.expect_err("request fails");
        assert_eq!(
            err,
            Error::Response {
                status: 422,
                body: json!({"msg": "bad"})
            }
        );
        assert_eq!(r.status(), Some(422));
        assert_eq!(r.error(), Some(json!("bad")));
        assert_eq!(r.data(), None);
        assert_eq!(r.phase(), Phase::Error);
    }

    #[tokio::test]
    async fn test_no_response_and_timeout() {
        let client = MockClient::new();
        client.reply(Method::Get, "/down", MockReply::no_response("connection refused"));
        client.reply(Method::Get, "/slow", MockReply::timeout());
        let options = options(&client);

        let down = Resource::from_spec("/down", &options).expect("resource");
        assert!(matches!(down.execute().await, Err(Error::Network(_))));
        assert_eq!(down.status(), Some(0));
        assert_eq!(down.error(), Some(json!(true)));
        assert_eq!(down.headers(), Some(BTreeMap::new()));

        let slow = Resource::from_spec("/slow", &options).expect("resource");
        let timeouts = Arc::new(AtomicUsize::new(0));
        let counter = timeouts.clone();
        slow.on(Event::Timeout, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let err = slow.execute().await.expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_merges_extra_payload() {
        let client = MockClient::new();
        client.reply(Method::Post, "/users", MockReply::ok(json!({"ok": true})));
        let r = Resource::from_spec(
            ResourceOptions::new("/users")
                .method("POST")
                .params(json!({"role": "admin", "name": "x"})),
            &options(&client),
        )
        .expect("resource");

        r.send(Some(json!({"name": "ada"}))).await.expect("sent");
        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].body(), Some(&json!({"role": "admin", "name": "ada"})));
    }

    #[tokio::test]
    async fn test_null_body_yields_no_data() {
        let client = MockClient::new();
        client.reply(Method::Delete, "/a", MockReply::ok(Value::Null));
        let r = Resource::from_spec(ResourceOptions::new("/a").method("delete"), &options(&client))
            .expect("resource");
        assert_eq!(r.execute().await, Ok(None));
        assert_eq!(r.status(), Some(200));
    }

    #[tokio::test]
    async fn test_carry_from_respects_keep_data() {
        let client = MockClient::new();
        client.reply(Method::Get, "/a", MockReply::ok(json!(1)));
        let options = options(&client);

        let old = Resource::from_spec(ResourceOptions::new("/a").keep_data(true), &options)
            .expect("resource");
        old.execute().await.expect("loaded");

        let next = Resource::from_spec("/b", &options).expect("resource");
        next.carry_from(&old);
        assert_eq!(next.data(), Some(json!(1)));
        assert_eq!(next.last_loaded(), old.last_loaded());

        let dropped = Resource::from_spec("/a", &options).expect("resource");
        dropped.execute().await.expect("loaded");
        let next = Resource::from_spec("/b", &options).expect("resource");
        next.carry_from(&dropped);
        assert_eq!(next.data(), None);
        assert!(next.last_loaded().is_some());
    }

    #[test]
    fn test_fetch_dropped_outside_runtime_clears_loading() {
        let client = MockClient::new();
        client.reply(Method::Get, "/a", MockReply::ok(json!(1)));
        let r = Resource::from_spec("/a", &options(&client)).expect("resource");

        let pending = r.fetch(false, None);
        assert!(r.loading());
        drop(pending);
        assert!(!r.loading());
        assert_eq!(r.data(), None);
    }

    #[test]
    fn test_hydrate_marks_prefetched() {
        let client = MockClient::new();
        let r = Resource::from_spec("/a", &options(&client)).expect("resource");
        r.hydrate(&Snapshot {
            status: Some(200),
            data: Some(json!({"x": 1})),
            error: Some(json!("ignored")),
            ..Snapshot::default()
        });
        assert!(r.ssr_prefetched());
        assert_eq!(r.data(), Some(json!({"x": 1})));
        assert_eq!(r.error(), None);
    }
}
