use crate::constants::cache::{CACHEABLE_STATUS_MAX, CACHEABLE_STATUS_MIN};
use crate::errors::ClientError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A single logical call, before defaults are applied.
///
/// Header names are matched case-insensitively; the query map is ordered so
/// its serialization never depends on insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    pub uri: String,
    pub params: serde_json::Map<String, Value>,
    pub query: BTreeMap<String, Value>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub use_cache: bool,
    pub request_id: Option<String>,
}

impl RequestDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn query(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.trim().to_lowercase(), value.to_string());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(Duration::from_millis(timeout_ms));
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

impl From<&str> for RequestDescriptor {
    fn from(uri: &str) -> Self {
        RequestDescriptor::new(uri)
    }
}

impl From<String> for RequestDescriptor {
    fn from(uri: String) -> Self {
        RequestDescriptor::new(uri)
    }
}

/// Normalized result of a call that reached the server (or the cache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Statuses in `[200, 400)` are eligible for write-through caching.
    pub fn is_cacheable(&self) -> bool {
        (CACHEABLE_STATUS_MIN..CACHEABLE_STATUS_MAX).contains(&self.status_code)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_value(self.body.clone()).map_err(|err| {
            ClientError::internal(format!("Unexpected response body: {}", err))
                .with_details(serde_json::json!({"status": self.status_code}))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestDescriptor, ResponseEnvelope};
    use std::collections::BTreeMap;

    #[test]
    fn descriptor_lower_cases_header_names() {
        let req = RequestDescriptor::new("/a").header("X-Trace", "1");
        assert_eq!(req.headers.get("x-trace").map(String::as_str), Some("1"));
    }

    #[test]
    fn cacheable_range_is_200_to_399() {
        let mut envelope = ResponseEnvelope {
            status_code: 200,
            status_message: "OK".to_string(),
            headers: BTreeMap::new(),
            body: serde_json::Value::Null,
        };
        assert!(envelope.is_cacheable());
        envelope.status_code = 304;
        assert!(envelope.is_cacheable());
        assert!(!envelope.is_success());
        envelope.status_code = 400;
        assert!(!envelope.is_cacheable());
        envelope.status_code = 199;
        assert!(!envelope.is_cacheable());
    }

    #[test]
    fn serializes_with_legacy_field_names() {
        let envelope = ResponseEnvelope {
            status_code: 201,
            status_message: "Created".to_string(),
            headers: BTreeMap::new(),
            body: serde_json::json!({"id": 1}),
        };
        let value = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(value["statusCode"], 201);
        assert_eq!(value["statusMessage"], "Created");
    }
}
