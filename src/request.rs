//! Request descriptors.
//!
//! A [`RequestDescriptor`] is the immutable description of the HTTP call a
//! resource performs: URL, method, headers, payload and timeout.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// HTTP methods a resource can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            "delete" => Ok(Self::Delete),
            _ => Err(Error::BadMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload. `GET` sends query parameters, every other method a body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Params(Value),
    Body(Value),
}

impl Payload {
    /// Wraps `value` in the variant the method calls for.
    #[must_use]
    pub fn for_method(method: Method, value: Value) -> Self {
        match method {
            Method::Get => Self::Params(value),
            _ => Self::Body(value),
        }
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        match self {
            Self::Params(v) | Self::Body(v) => v,
        }
    }
}

/// Describes a single HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub payload: Option<Payload>,
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            payload: None,
            timeout: None,
        }
    }

    /// Sets the payload; `None` and JSON `null` both clear it.
    #[must_use]
    pub fn with_payload(mut self, value: Option<Value>) -> Self {
        let method = self.method;
        self.payload = value
            .filter(|v| !v.is_null())
            .map(|v| Payload::for_method(method, v));
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Query parameters, present only for `GET`.
    #[must_use]
    pub const fn params(&self) -> Option<&Value> {
        match &self.payload {
            Some(Payload::Params(v)) => Some(v),
            _ => None,
        }
    }

    /// Request body, present only for non-`GET` methods.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        match &self.payload {
            Some(Payload::Body(v)) => Some(v),
            _ => None,
        }
    }

    /// Returns a copy whose payload is overridden by `extra`.
    ///
    /// Two objects are merged shallowly with `extra` winning; anything else
    /// replaces the payload outright.
    #[must_use]
    pub fn merged(&self, extra: Option<Value>) -> Self {
        let Some(extra) = extra else {
            return self.clone();
        };

        let value = match (self.payload.as_ref().map(Payload::value), extra) {
            (Some(Value::Object(base)), Value::Object(over)) => {
                let mut merged = base.clone();
                merged.extend(over);
                Value::Object(merged)
            }
            (_, over) => over,
        };

        let mut request = self.clone();
        request.payload = Some(Payload::for_method(self.method, value));
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!("PoSt".parse::<Method>(), Ok(Method::Post));
        assert_eq!("DELETE".parse::<Method>(), Ok(Method::Delete));
    }

    #[test]
    fn test_method_parse_rejects_unknown() {
        for bad in ["fetch", "options", "", "head"] {
            assert_eq!(
                bad.parse::<Method>(),
                Err(Error::BadMethod(bad.to_string()))
            );
        }
    }

    #[test]
    fn test_payload_follows_method() {
        let get = RequestDescriptor::new("/a", Method::Get).with_payload(Some(json!({"q": 1})));
        assert_eq!(get.params(), Some(&json!({"q": 1})));
        assert_eq!(get.body(), None);

        let post = RequestDescriptor::new("/a", Method::Post).with_payload(Some(json!({"q": 1})));
        assert_eq!(post.params(), None);
        assert_eq!(post.body(), Some(&json!({"q": 1})));
    }

    #[test]
    fn test_null_payload_is_dropped() {
        let req = RequestDescriptor::new("/a", Method::Get).with_payload(Some(Value::Null));
        assert!(req.payload.is_none());
    }

    #[test]
    fn test_merged_overrides_object_keys() {
        let req = RequestDescriptor::new("/a", Method::Post)
            .with_payload(Some(json!({"name": "old", "keep": true})));
        let merged = req.merged(Some(json!({"name": "new"})));
        assert_eq!(merged.body(), Some(&json!({"name": "new", "keep": true})));
        // original untouched
        assert_eq!(req.body(), Some(&json!({"name": "old", "keep": true})));
    }

    #[test]
    fn test_merged_replaces_non_objects() {
        let req = RequestDescriptor::new("/a", Method::Put).with_payload(Some(json!([1, 2])));
        let merged = req.merged(Some(json!("raw")));
        assert_eq!(merged.body(), Some(&json!("raw")));

        let empty = RequestDescriptor::new("/a", Method::Get);
        let merged = empty.merged(Some(json!({"page": 2})));
        assert_eq!(merged.params(), Some(&json!({"page": 2})));
    }
}
