use std::collections::BTreeMap;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{HttpClient, Response, TransportError};
use crate::error::Error;
use crate::request::{Method, RequestDescriptor};

/// [`HttpClient`] backed by [`reqwest`].
///
/// `GET` payloads are sent as a query string, other payloads as a JSON body.
/// Response bodies are decoded as JSON, falling back to a JSON string when the
/// body is not valid JSON.
///
/// # Example
///
/// ```no_run
/// use tether::client::ReqwestClient;
///
/// let client = ReqwestClient::new()?.with_base_url("https://api.example.com");
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl ReqwestClient {
    /// Builds a client with reqwest's default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientUnavailable`] if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::ClientUnavailable(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Wraps an already configured reqwest client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Resolves relative resource URLs against `base_url`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn resolve(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    url.trim_start_matches('/')
                )
            }
            _ => url.to_string(),
        }
    }
}

impl HttpClient for ReqwestClient {
    fn request(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Response, TransportError>> {
        let url = self.resolve(&request.url);
        let mut builder = self.client.request(method(request.method), &url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(params) = request.params() {
            builder = builder.query(params);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        async move {
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                res = builder.send() => res.map_err(classify)?,
            };

            let status = response.status().as_u16();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let text = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                res = response.text() => res.map_err(classify)?,
            };

            let response = Response {
                status,
                data: decode(&text),
                headers,
            };

            if response.is_success() {
                Ok(response)
            } else {
                Err(TransportError::Status(response))
            }
        }
        .boxed()
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::NoResponse(err.to_string())
    }
}

fn decode(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_relative_urls() {
        let client = ReqwestClient::with_client(reqwest::Client::new())
            .with_base_url("https://api.example.com/");
        assert_eq!(client.resolve("/items"), "https://api.example.com/items");
        assert_eq!(client.resolve("items"), "https://api.example.com/items");
        assert_eq!(
            client.resolve("http://other.example.com/x"),
            "http://other.example.com/x"
        );
    }

    #[test]
    fn test_resolve_without_base() {
        let client = ReqwestClient::with_client(reqwest::Client::new());
        assert_eq!(client.resolve("/items"), "/items");
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode(""), Value::Null);
        assert_eq!(decode("[1,2,3]"), json!([1, 2, 3]));
        assert_eq!(decode("plain text"), json!("plain text"));
    }
}
