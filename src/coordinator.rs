//! Named resource collections.
//!
//! A [`Coordinator`] owns the resources one component declares. Static
//! declarations are built once; reactive declarations are closures re-run
//! whenever the host reports that something they read has changed.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//! use tether::client::mock::{MockClient, MockReply};
//! use tether::coordinator::Coordinator;
//! use tether::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tether::Error> {
//! let client = MockClient::new();
//! client.reply(Method::Get, "/users", MockReply::ok(json!([{"id": 1}])));
//! client.reply(Method::Get, "/users/1", MockReply::ok(json!({"id": 1})));
//!
//! let selected = Arc::new(Mutex::new(None::<u32>));
//! let current = selected.clone();
//!
//! let coordinator = Coordinator::builder(Options::default().with_client(Arc::new(client)))
//!     .resource("users", "/users")
//!     .reactive("user", move || {
//!         let id = (*current.lock().ok()?)?;
//!         Some(format!("/users/{id}").into())
//!     })
//!     .build()?;
//!
//! assert!(coordinator.get("user")?.is_placeholder());
//!
//! *selected.lock().unwrap() = Some(1);
//! coordinator.notify_dependency_changed("user")?;
//! assert_eq!(coordinator.get("user")?.descriptor().map(|d| d.url.as_str()), Some("/users/1"));
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::client::HttpClient;
use crate::command::Command;
use crate::config::{Options, SsrPrefetch};
use crate::error::{Error, Result};
use crate::lock;
use crate::resource::{Resource, ResourceSpec, Snapshot};

/// A closure deriving a resource from the current application state.
///
/// Returning `None` installs a placeholder.
pub type ReactiveFn = Arc<dyn Fn() -> Option<ResourceSpec> + Send + Sync>;

/// Message produced by [`Coordinator::mount`]: the resource name and the
/// outcome of its initial load.
pub type Prefetched = (String, Result<Option<Value>>);

enum Declaration {
    Static(ResourceSpec),
    Json(Value),
    Reactive(ReactiveFn),
}

/// Collects declarations for a [`Coordinator`].
pub struct CoordinatorBuilder {
    options: Options,
    owner: Option<String>,
    declarations: Vec<(String, Declaration)>,
}

impl CoordinatorBuilder {
    /// Declares a resource built once from `spec`.
    #[must_use]
    pub fn resource(mut self, name: impl Into<String>, spec: impl Into<ResourceSpec>) -> Self {
        self.declarations
            .push((name.into(), Declaration::Static(spec.into())));
        self
    }

    /// Declares a resource from JSON: a URL string or an options object.
    #[must_use]
    pub fn resource_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.declarations.push((name.into(), Declaration::Json(value)));
        self
    }

    /// Declares a resource re-derived from `f` on every dependency change.
    #[must_use]
    pub fn reactive(
        mut self,
        name: impl Into<String>,
        f: impl Fn() -> Option<ResourceSpec> + Send + Sync + 'static,
    ) -> Self {
        self.declarations
            .push((name.into(), Declaration::Reactive(Arc::new(f))));
        self
    }

    /// Scopes cache keys to `owner`, so equal requests of different
    /// components do not share entries.
    #[must_use]
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Builds every static declaration.
    ///
    /// # Errors
    ///
    /// [`Error::ReservedName`] for a name starting with `$`,
    /// [`Error::InvalidOptions`] for a duplicate name, and any construction
    /// error of [`Resource::from_spec`] or [`Resource::from_value`].
    pub fn build(self) -> Result<Coordinator> {
        let mut options = self.options;
        if let Some(owner) = self.owner {
            options.cache = options.cache.map(|cache| cache.scoped(owner));
        }
        // Share one default transport across every resource.
        if options.client.is_none() {
            options.client = options.client().ok();
        }

        let mut resources = BTreeMap::new();
        let mut reactive = BTreeMap::new();
        for (name, declaration) in self.declarations {
            if name.starts_with('$') {
                return Err(Error::ReservedName(name));
            }
            if resources.contains_key(&name) {
                return Err(Error::InvalidOptions(format!("duplicate resource name: {name}")));
            }

            let resource = match declaration {
                Declaration::Static(spec) => Resource::from_spec(spec, &options)?,
                Declaration::Json(value) => Resource::from_value(&value, &options)?,
                Declaration::Reactive(f) => {
                    reactive.insert(name.clone(), f);
                    Resource::placeholder()
                }
            };
            resources.insert(name, resource);
        }

        Ok(Coordinator {
            options,
            resources: Mutex::new(resources),
            reactive,
        })
    }
}

/// The resources of one component.
pub struct Coordinator {
    options: Options,
    resources: Mutex<BTreeMap<String, Resource>>,
    reactive: BTreeMap<String, ReactiveFn>,
}

impl Coordinator {
    #[must_use]
    pub fn builder(options: Options) -> CoordinatorBuilder {
        CoordinatorBuilder {
            options,
            owner: None,
            declarations: Vec::new(),
        }
    }

    /// Looks up a resource by name.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownResource`] if no resource is declared under `name`.
    pub fn get(&self, name: &str) -> Result<Resource> {
        lock(&self.resources)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownResource(name.to_string()))
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        lock(&self.resources).keys().cloned().collect()
    }

    /// Current resources by name.
    #[must_use]
    pub fn resources(&self) -> BTreeMap<String, Resource> {
        lock(&self.resources).clone()
    }

    /// True while any resource is loading.
    #[must_use]
    pub fn loading(&self) -> bool {
        lock(&self.resources).values().any(Resource::loading)
    }

    /// The HTTP client shared by the resources.
    ///
    /// # Errors
    ///
    /// [`Error::ClientUnavailable`] when no client can be obtained.
    pub fn client(&self) -> Result<Arc<dyn HttpClient>> {
        self.options.client()
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    pub fn cancel_all(&self) {
        for resource in self.resources().values() {
            resource.cancel(false);
        }
    }

    /// Signals that a value read by the reactive declaration `name` changed.
    ///
    /// # Errors
    ///
    /// See [`update_reactive_resource`](Self::update_reactive_resource).
    pub fn notify_dependency_changed(&self, name: &str) -> Result<()> {
        self.update_reactive_resource(name)
    }

    /// Re-derives the reactive resource `name` and reloads it if it
    /// prefetches.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownResource`] if `name` is not a reactive declaration,
    /// or the construction error of the derived resource. On error the
    /// previous resource stays installed.
    pub fn update_reactive_resource(&self, name: &str) -> Result<()> {
        let next = self.rederive(name)?;
        if next.prefetch() {
            drop(next.reload(false));
        }
        Ok(())
    }

    /// Re-derives every reactive resource.
    ///
    /// # Errors
    ///
    /// The first error of [`update_reactive_resource`](Self::update_reactive_resource);
    /// the remaining declarations are still updated.
    pub fn update_reactive_resources(&self) -> Result<()> {
        let mut first_error = None;
        for name in self.reactive.keys() {
            if let Err(e) = self.update_reactive_resource(name) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn rederive(&self, name: &str) -> Result<Resource> {
        let f = self
            .reactive
            .get(name)
            .ok_or_else(|| Error::UnknownResource(name.to_string()))?;

        let previous = self.get(name)?;
        let next = match f() {
            Some(spec) => Resource::from_spec(spec, &self.options)?,
            None => Resource::placeholder(),
        };
        if next.ptr_eq(&previous) {
            return Ok(next);
        }

        previous.stop_interval();
        next.carry_from(&previous);
        lock(&self.resources).insert(name.to_string(), next.clone());
        debug!(resource = %name, placeholder = next.is_placeholder(), "reactive resource updated");
        Ok(next)
    }

    /// Lifecycle hook for when the component mounts.
    ///
    /// Resolves reactive declarations, starts configured polling and loads
    /// every prefetching resource, except those already filled by server-side
    /// prefetch (unless their policy is [`SsrPrefetch::Override`]).
    ///
    /// The loads start immediately; the returned command yields one
    /// [`Prefetched`] message per load as it settles.
    ///
    /// # Errors
    ///
    /// The first error of re-deriving a reactive declaration.
    pub fn mount(&self) -> Result<Command<Prefetched>> {
        let mut first_error = None;
        for name in self.reactive.keys() {
            if let Err(e) = self.rederive(name) {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut loads = Vec::new();
        for (name, resource) in self.resources() {
            if let Some(period) = resource.interval() {
                if !resource.is_polling() {
                    resource.start_interval(period);
                }
            }

            let hydrated =
                resource.ssr_prefetched() && resource.ssr_prefetch() != SsrPrefetch::Override;
            if resource.prefetch() && !hydrated {
                let load = resource.reload(false);
                loads.push(Command::perform(load, move |outcome| (name, outcome)));
            }
        }
        Ok(Command::batch(loads))
    }

    /// Lifecycle hook for when the component unmounts.
    pub fn unmount(&self) {
        self.cancel_all();
    }

    /// Adopts state prefetched on the server.
    ///
    /// Only snapshots carrying data are applied.
    pub fn hydrate(&self, snapshots: &BTreeMap<String, Snapshot>) {
        let resources = self.resources();
        for (name, snapshot) in snapshots {
            if snapshot.data.is_none() {
                continue;
            }
            if let Some(resource) = resources.get(name) {
                resource.hydrate(snapshot);
            }
        }
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("resources", &self.names())
            .field("reactive", &self.reactive.keys().collect::<Vec<_>>())
            .field("loading", &self.loading())
            .finish_non_exhaustive()
    }
}
