use crate::constants::network::USER_AGENT;
use crate::errors::{ClientError, TransportError};
use crate::utils::url::strip_query;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::Duration;

/// One fully-resolved HTTP request as handed to a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Sends a request and reports either a status-bearing response or a
/// network-level failure. Non-2xx statuses are responses, not errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ClientError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn headers_to_headermap(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("Invalid header name: {}", key)))?;
        let val = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidRequest(format!("Invalid header value for {}", key)))?;
        map.insert(name, val);
    }
    Ok(map)
}

fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (key, value) in headers {
        if let Ok(text) = value.to_str() {
            map.insert(key.as_str().to_string(), text.to_string());
        }
    }
    map
}

pub(crate) fn map_reqwest_error(err: reqwest::Error, url: &str, timeout: Duration) -> TransportError {
    let target = strip_query(url);
    let err = err.without_url();
    if err.is_timeout() {
        if err.is_connect() {
            return TransportError::ConnectTimeout {
                target: target.to_string(),
            };
        }
        return TransportError::ResponseTimeout {
            target: target.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
    }
    if err.is_connect() {
        return TransportError::Connect {
            target: target.to_string(),
            message: err.to_string(),
        };
    }
    TransportError::other(err.to_string())
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let headers = headers_to_headermap(&request.headers)?;
        let mut req = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .headers(headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            req = req.body(body);
        }

        let response = req
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, &request.url, request.timeout))?;
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let headers = headers_to_map(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err, &request.url, request.timeout))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body: body.to_vec(),
        })
    }
}
