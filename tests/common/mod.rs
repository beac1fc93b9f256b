#![allow(dead_code)]

use apilink::errors::{ClientError, TransportError};
use apilink::services::logger::{LogLevel, Logger, MemorySink};
use apilink::services::transport::{HttpTransport, TransportRequest, TransportResponse};
use apilink::stores::CacheStore;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn memory_logger() -> (Logger, MemorySink) {
    let sink = MemorySink::new();
    let mut logger = Logger::with_sink("test", Arc::new(sink.clone()));
    logger.set_level(LogLevel::Debug);
    (logger, sink)
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond { status: u16, body: Value },
    Timeout,
    ConnectTimeout,
    Refused,
    /// Never answers.
    Stall,
}

impl Scripted {
    pub fn ok(body: Value) -> Self {
        Scripted::Respond { status: 200, body }
    }

    pub fn status(status: u16) -> Self {
        Scripted::Respond {
            status,
            body: Value::Null,
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Scripted::Respond { status, body }
    }

    fn materialize(self, url: &str) -> Result<TransportResponse, TransportError> {
        match self {
            Scripted::Respond { status, body } => {
                let mut headers = BTreeMap::new();
                let bytes = if body.is_null() {
                    Vec::new()
                } else {
                    headers.insert("content-type".to_string(), "application/json".to_string());
                    serde_json::to_vec(&body).unwrap_or_default()
                };
                Ok(TransportResponse {
                    status,
                    status_text: reqwest::StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("")
                        .to_string(),
                    headers,
                    body: bytes,
                })
            }
            Scripted::Timeout => Err(TransportError::ResponseTimeout {
                target: url.to_string(),
                timeout_ms: 10,
            }),
            Scripted::ConnectTimeout => Err(TransportError::ConnectTimeout {
                target: url.to_string(),
            }),
            Scripted::Refused | Scripted::Stall => Err(TransportError::Connect {
                target: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

struct Route {
    needle: String,
    queue: VecDeque<Scripted>,
    fallback: Option<Scripted>,
}

/// In-process transport replaying scripted outcomes per URL substring.
///
/// Queued outcomes are used first, then the route's fallback. A request that
/// matches nothing is refused.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: StdMutex<Vec<Route>>,
    requests: StdMutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_route(&self, needle: &str, update: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().expect("routes lock");
        if let Some(route) = routes.iter_mut().find(|r| r.needle == needle) {
            update(route);
            return;
        }
        let mut route = Route {
            needle: needle.to_string(),
            queue: VecDeque::new(),
            fallback: None,
        };
        update(&mut route);
        routes.push(route);
    }

    pub fn push(&self, needle: &str, outcome: Scripted) {
        self.with_route(needle, |route| route.queue.push_back(outcome));
    }

    pub fn always(&self, needle: &str, outcome: Scripted) {
        self.with_route(needle, |route| route.fallback = Some(outcome));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.contains(needle))
            .count()
    }

    fn next_outcome(&self, url: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock().expect("routes lock");
        let route = routes
            .iter_mut()
            .find(|r| url.contains(&r.needle) && (!r.queue.is_empty() || r.fallback.is_some()))?;
        route.queue.pop_front().or_else(|| route.fallback.clone())
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().expect("requests lock").push(request);
        match self.next_outcome(&url) {
            Some(Scripted::Stall) => futures::future::pending().await,
            Some(outcome) => outcome.materialize(&url),
            None => Scripted::Refused.materialize(&url),
        }
    }
}

/// Cache store whose operations fail on demand.
#[derive(Default)]
pub struct FailingStore {
    pub fail_get: bool,
    pub fail_set: bool,
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, ClientError> {
        if self.fail_get {
            return Err(ClientError::cache_unavailable("store offline"));
        }
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), ClientError> {
        if self.fail_set {
            return Err(ClientError::cache_unavailable("store offline"));
        }
        Ok(())
    }

    async fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<(), ClientError> {
        Ok(())
    }
}

pub fn manifest_body() -> Value {
    serde_json::json!({
        "api": {
            "checkAPIKey": {"uri": "/api/users/_checkAPIkey", "method": "GET"},
            "getUser": {"uri": "/api/users/v1/user/:id", "method": "GET"},
            "createUser": {"uri": "/api/users/v1/user", "method": "POST"}
        }
    })
}
