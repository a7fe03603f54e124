//! Scripted HTTP client for testing.
//!
//! [`MockClient`] answers requests from a routing table instead of the
//! network, enabling deterministic tests of resources and coordinators
//! without real I/O.
//!
//! # Basic Usage
//!
//! ```
//! use serde_json::json;
//! use tether::client::mock::{MockClient, MockReply};
//! use tether::request::Method;
//!
//! let mock = MockClient::new();
//! mock.reply(Method::Get, "/items", MockReply::ok(json!([1, 2, 3])));
//! mock.reply(Method::Post, "/items", MockReply::status(422, json!({"error": "invalid"})));
//!
//! assert_eq!(mock.call_count(), 0);
//! ```
//!
//! # Reply Queues
//!
//! Replies registered for the same route are served in order. The last reply
//! stays in place and answers every further request, so a single
//! registration behaves like a fixed endpoint.
//!
//! Replies can carry a delay, which is observed with `tokio::time::sleep` and
//! therefore honors paused test clocks. A cancelled token resolves a delayed
//! reply with [`TransportError::Cancelled`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{HttpClient, Response, TransportError};
use crate::lock;
use crate::request::{Method, RequestDescriptor};

/// A canned reply for [`MockClient`].
#[derive(Debug, Clone)]
pub struct MockReply {
    outcome: Result<Response, TransportError>,
    delay: Duration,
}

impl MockReply {
    /// A `200 OK` reply carrying `data`.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self::status(200, data)
    }

    /// A reply with the given status. Non-2xx statuses produce
    /// [`TransportError::Status`].
    #[must_use]
    pub fn status(status: u16, data: Value) -> Self {
        let response = Response::new(status, data);
        let outcome = if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status(response))
        };
        Self {
            outcome,
            delay: Duration::ZERO,
        }
    }

    /// A reply that never reached the server.
    #[must_use]
    pub fn no_response(message: impl Into<String>) -> Self {
        Self::error(TransportError::NoResponse(message.into()))
    }

    /// A reply that timed out in transport.
    #[must_use]
    pub fn timeout() -> Self {
        Self::error(TransportError::Timeout)
    }

    #[must_use]
    pub const fn error(error: TransportError) -> Self {
        Self {
            outcome: Err(error),
            delay: Duration::ZERO,
        }
    }

    /// Delays the reply.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Adds a response header (ignored for replies without a response).
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let response = match &mut self.outcome {
            Ok(res) | Err(TransportError::Status(res)) => Some(res),
            Err(_) => None,
        };
        if let Some(res) = response {
            res.headers.insert(name.into(), value.into());
        }
        self
    }
}

#[derive(Debug)]
struct Route {
    method: Method,
    url: String,
    replies: VecDeque<MockReply>,
}

#[derive(Debug, Default)]
struct Inner {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RequestDescriptor>>,
}

/// An [`HttpClient`] that serves scripted replies and records every request.
///
/// Clones share the same routing table and call log, so one clone can be
/// handed to the code under test while the test inspects another.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    inner: Arc<Inner>,
}

impl MockClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for `method url`.
    pub fn reply(&self, method: Method, url: impl Into<String>, reply: MockReply) {
        let url = url.into();
        let mut routes = lock(&self.inner.routes);
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == method && r.url == url)
        {
            route.replies.push_back(reply);
        } else {
            routes.push(Route {
                method,
                url,
                replies: VecDeque::from([reply]),
            });
        }
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.inner.calls).len()
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RequestDescriptor> {
        lock(&self.inner.calls).clone()
    }

    fn next_reply(&self, request: &RequestDescriptor) -> MockReply {
        let mut routes = lock(&self.inner.routes);
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && r.url == request.url);

        match route {
            Some(route) if route.replies.len() > 1 => route
                .replies
                .pop_front()
                .unwrap_or_else(|| unrouted(request)),
            Some(route) => route
                .replies
                .front()
                .cloned()
                .unwrap_or_else(|| unrouted(request)),
            None => unrouted(request),
        }
    }
}

fn unrouted(request: &RequestDescriptor) -> MockReply {
    MockReply::no_response(format!("no route for {} {}", request.method, request.url))
}

impl HttpClient for MockClient {
    fn request(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Response, TransportError>> {
        let reply = self.next_reply(&request);
        lock(&self.inner.calls).push(request);

        async move {
            if !reply.delay.is_zero() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(TransportError::Cancelled),
                    () = tokio::time::sleep(reply.delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            reply.outcome
        }
        .boxed()
    }
}
