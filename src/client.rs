//! HTTP client capability.
//!
//! Resources never perform transport themselves. They hand a
//! [`RequestDescriptor`] and a [`CancellationToken`] to an [`HttpClient`] and
//! interpret the [`Response`] or [`TransportError`] that comes back.
//!
//! Two implementations ship with the crate:
//!
//! - [`ReqwestClient`] (feature `reqwest`, on by default) for real traffic
//! - [`mock::MockClient`] with scripted replies for tests

pub mod mock;
#[cfg(feature = "reqwest")]
mod reqwest_client;

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::request::RequestDescriptor;

#[cfg(feature = "reqwest")]
pub use reqwest_client::ReqwestClient;

/// A response received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub data: Value,
    pub headers: BTreeMap<String, String>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            headers: BTreeMap::new(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Failure reported by a transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The server answered, but with a failure status.
    #[error("Request failed with status {}", .0.status)]
    Status(Response),

    #[error("No response: {0}")]
    NoResponse(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Returns `true` if the request was cancelled through its token.
    #[must_use]
    pub const fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The failed response, if the server sent one.
    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Self::Status(res) => Some(res),
            _ => None,
        }
    }
}

/// Transport capability used by resources.
///
/// Implementations must stop work and resolve with
/// [`TransportError::Cancelled`] once `cancel` fires, and must enforce
/// [`RequestDescriptor::timeout`] themselves.
pub trait HttpClient: Send + Sync {
    fn request(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Response, TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_success_range() {
        assert!(Response::new(200, json!(null)).is_success());
        assert!(Response::new(204, json!(null)).is_success());
        assert!(!Response::new(304, json!(null)).is_success());
        assert!(!Response::new(500, json!(null)).is_success());
    }

    #[test]
    fn test_transport_error_classification() {
        assert!(TransportError::Cancelled.is_cancel());
        assert!(!TransportError::Timeout.is_cancel());

        let err = TransportError::Status(Response::new(404, json!("gone")));
        assert_eq!(err.response().map(|r| r.status), Some(404));
        assert_eq!(err.to_string(), "Request failed with status 404");
        assert!(TransportError::NoResponse("reset".into()).response().is_none());
    }
}
