//! Prelude module for convenient imports.
//!
//! ```
//! use tether::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Resource`], [`Event`], [`Snapshot`] - A resource and its observable state
//! - [`Coordinator`] - Named resources of one component
//! - [`Options`], [`ResourceOptions`] - Configuration
//! - [`Cache`], [`Strategy`] - Caching
//! - [`Command`] - Effects handed to the host runtime
//! - [`Method`] - HTTP methods

pub use crate::cache::{Cache, MemoryStore, Strategy};
pub use crate::command::Command;
pub use crate::config::{Options, Prefetch, ResourceOptions, SsrPrefetch, Transformer};
pub use crate::coordinator::Coordinator;
pub use crate::error::{Error, Result};
pub use crate::request::Method;
pub use crate::resource::{Event, Resource, ResourceSpec, Snapshot};
