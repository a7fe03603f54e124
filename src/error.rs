//! Error types shared by every part of the crate.

use serde_json::Value;
use thiserror::Error;

/// Error type for resource construction, caching and fetch operations.
///
/// Errors are `Clone` because a debounced reload hands the same outcome to
/// every caller that joined the burst.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Cannot create resource from `null`")]
    NullDescriptor,

    #[error("Bad method requested: {0}")]
    BadMethod(String),

    #[error("Resource name `{0}` is reserved")]
    ReservedName(String),

    #[error("Cache misconfigured: {0}")]
    CacheMisconfigured(String),

    #[error("Unknown cache strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid resource options: {0}")]
    InvalidOptions(String),

    #[error("HTTP client unavailable: {0}")]
    ClientUnavailable(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}")]
    Response { status: u16, body: Value },

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Resource is not available")]
    NotAvailable,

    #[error("Fetch task aborted: {0}")]
    Aborted(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while building a resource, cache or coordinator.
    Construction,
    /// No response was received.
    Network,
    /// The server answered with a failure status.
    Response,
    Timeout,
    Cancelled,
    /// The resource or cache backend cannot serve the request at all.
    Unavailable,
}

impl Error {
    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NullDescriptor
            | Self::BadMethod(_)
            | Self::ReservedName(_)
            | Self::CacheMisconfigured(_)
            | Self::UnknownStrategy(_)
            | Self::InvalidOptions(_)
            | Self::ClientUnavailable(_)
            | Self::UnknownResource(_) => ErrorKind::Construction,
            Self::Network(_) | Self::Aborted(_) => ErrorKind::Network,
            Self::Response { .. } => ErrorKind::Response,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::CacheUnavailable(_) | Self::NotAvailable => ErrorKind::Unavailable,
        }
    }

    /// Returns `true` if the error came from a cancelled request.
    #[must_use]
    pub const fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the error came from a timed out request.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
