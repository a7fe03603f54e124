use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::cache::{Cache, Strategy};
use crate::client::HttpClient;
use crate::error::Error;
use crate::request::Method;
use crate::resource::{Event, Listener, Resource};

/// Default debounce window for [`Resource::reload`].
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(80);

/// Default upper bound for the whole server-side prefetch pass.
pub const DEFAULT_SSR_PREFETCH_TIMEOUT: Duration = Duration::from_millis(4000);

/// Which resources fetch eagerly when their component mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefetch {
    Always,
    Never,
    /// Only resources declared with this method.
    Method(Method),
}

impl Prefetch {
    #[must_use]
    pub fn applies_to(self, method: Method) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Method(m) => m == method,
        }
    }
}

impl Default for Prefetch {
    fn default() -> Self {
        Self::Method(Method::Get)
    }
}

impl<'de> Deserialize<'de> for Prefetch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Method(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(Self::Always),
            Repr::Flag(false) => Ok(Self::Never),
            Repr::Method(m) => m
                .parse()
                .map(Self::Method)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Whether a resource takes part in server-side prefetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SsrPrefetch {
    #[default]
    Enabled,
    Disabled,
    /// Prefetch on the server and fetch again after mounting on the client.
    Override,
}

impl<'de> Deserialize<'de> for SsrPrefetch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(Self::Enabled),
            Repr::Flag(false) => Ok(Self::Disabled),
            Repr::Name(name) if name.eq_ignore_ascii_case("override") => Ok(Self::Override),
            Repr::Name(name) => Err(serde::de::Error::custom(format!(
                "unknown ssrPrefetch policy: {name}"
            ))),
        }
    }
}

pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Post-processing applied to response bodies and error bodies.
#[derive(Clone)]
pub struct Transformer {
    pub response: TransformFn,
    pub error: TransformFn,
}

impl Transformer {
    #[must_use]
    pub fn new(
        response: impl Fn(Value) -> Value + Send + Sync + 'static,
        error: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            response: Arc::new(response),
            error: Arc::new(error),
        }
    }

    /// Uses the same function for responses and errors.
    #[must_use]
    pub fn both(f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        let f: TransformFn = Arc::new(f);
        Self {
            response: f.clone(),
            error: f,
        }
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::both(|v| v)
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformer").finish_non_exhaustive()
    }
}

/// Options shared by every resource of a coordinator.
///
/// Per-resource [`ResourceOptions`] override these field by field.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tether::cache::{Cache, MemoryStore, Strategy};
/// use tether::config::{Options, Prefetch};
///
/// let options = Options::default()
///     .with_cache(Cache::new(Strategy::CacheFirst, MemoryStore::new()))
///     .with_debounce(Duration::from_millis(200))
///     .with_prefetch(Prefetch::Always);
/// ```
#[derive(Clone)]
pub struct Options {
    /// HTTP client; the reqwest transport is used when absent.
    pub client: Option<Arc<dyn HttpClient>>,
    pub cache: Option<Cache>,
    pub debounce: Duration,
    pub prefetch: Prefetch,
    pub ssr_prefetch: SsrPrefetch,
    pub ssr_prefetch_timeout: Duration,
    pub transformer: Transformer,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Polling period applied to every resource.
    pub interval: Option<Duration>,
    pub timeout: Option<Duration>,
    /// Carry data across reactive redefinitions.
    pub keep_data: bool,
    /// Running in a server (non-interactive) context. Disables polling.
    pub server: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            client: None,
            cache: None,
            debounce: DEFAULT_DEBOUNCE,
            prefetch: Prefetch::default(),
            ssr_prefetch: SsrPrefetch::default(),
            ssr_prefetch_timeout: DEFAULT_SSR_PREFETCH_TIMEOUT,
            transformer: Transformer::default(),
            headers: BTreeMap::new(),
            interval: None,
            timeout: None,
            keep_data: false,
            server: false,
        }
    }
}

impl Options {
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }

    #[must_use]
    pub fn with_ssr_prefetch(mut self, ssr_prefetch: SsrPrefetch) -> Self {
        self.ssr_prefetch = ssr_prefetch;
        self
    }

    #[must_use]
    pub fn with_ssr_prefetch_timeout(mut self, timeout: Duration) -> Self {
        self.ssr_prefetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = transformer;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_keep_data(mut self, keep_data: bool) -> Self {
        self.keep_data = keep_data;
        self
    }

    #[must_use]
    pub fn with_server(mut self, server: bool) -> Self {
        self.server = server;
        self
    }

    /// Returns the configured client, or builds the default transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientUnavailable`] when no client is configured and
    /// the default transport cannot be built.
    pub fn client(&self) -> Result<Arc<dyn HttpClient>, Error> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        default_client()
    }
}

#[cfg(feature = "reqwest")]
fn default_client() -> Result<Arc<dyn HttpClient>, Error> {
    Ok(Arc::new(crate::client::ReqwestClient::new()?))
}

#[cfg(not(feature = "reqwest"))]
fn default_client() -> Result<Arc<dyn HttpClient>, Error> {
    Err(Error::ClientUnavailable(
        "no client configured and the `reqwest` feature is disabled".to_string(),
    ))
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("client", &self.client.as_ref().map(|_| "dyn HttpClient"))
            .field("cache", &self.cache)
            .field("debounce", &self.debounce)
            .field("prefetch", &self.prefetch)
            .field("ssr_prefetch", &self.ssr_prefetch)
            .field("ssr_prefetch_timeout", &self.ssr_prefetch_timeout)
            .field("headers", &self.headers)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("keep_data", &self.keep_data)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Per-resource cache override. Only the strategy can be changed; the store
/// always comes from [`Options::cache`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheOverride {
    pub strategy: Option<Strategy>,
}

/// Declarative description of one resource.
///
/// Deserializes from the JSON options bag (`url`, `method`, `params`,
/// `headers`, `timeout`, `debounce`, `interval`, `prefetch`, `ssrPrefetch`,
/// `keepData`, `cache`); durations are given in milliseconds. Transformers,
/// listeners and a dedicated client can only be set from code.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "millis")]
    pub timeout: Option<Duration>,
    #[serde(default, deserialize_with = "millis")]
    pub debounce: Option<Duration>,
    #[serde(default, deserialize_with = "millis")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub prefetch: Option<Prefetch>,
    #[serde(default)]
    pub ssr_prefetch: Option<SsrPrefetch>,
    #[serde(default)]
    pub keep_data: Option<bool>,
    #[serde(default)]
    pub cache: Option<CacheOverride>,
    #[serde(skip)]
    pub transformer: Option<Transformer>,
    #[serde(skip)]
    pub listeners: Vec<(Event, Listener)>,
    #[serde(skip)]
    pub client: Option<Arc<dyn HttpClient>>,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

impl ResourceOptions {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub fn prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    #[must_use]
    pub fn ssr_prefetch(mut self, ssr_prefetch: SsrPrefetch) -> Self {
        self.ssr_prefetch = Some(ssr_prefetch);
        self
    }

    #[must_use]
    pub fn keep_data(mut self, keep_data: bool) -> Self {
        self.keep_data = Some(keep_data);
        self
    }

    #[must_use]
    pub fn cache_strategy(mut self, strategy: Strategy) -> Self {
        self.cache = Some(CacheOverride {
            strategy: Some(strategy),
        });
        self
    }

    #[must_use]
    pub fn transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Registers a listener that is attached when the resource is built.
    #[must_use]
    pub fn on(
        mut self,
        event: Event,
        listener: impl Fn(&Resource) + Send + Sync + 'static,
    ) -> Self {
        self.listeners.push((event, Arc::new(listener)));
        self
    }

    #[must_use]
    pub fn client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }
}

impl fmt::Debug for ResourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("debounce", &self.debounce)
            .field("interval", &self.interval)
            .field("prefetch", &self.prefetch)
            .field("ssr_prefetch", &self.ssr_prefetch)
            .field("keep_data", &self.keep_data)
            .field("cache", &self.cache)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
