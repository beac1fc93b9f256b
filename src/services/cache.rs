use crate::constants::cache::DEFAULT_EXPIRE_SECS;
use crate::errors::ClientError;
use crate::services::config::CacheConfig;
use crate::services::logger::Logger;
use crate::services::request::ResponseEnvelope;
use crate::stores::CacheStore;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

fn query_pairs(query: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in query {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), stringify_query_value(item)));
                }
            }
            other => pairs.push((key.clone(), stringify_query_value(other))),
        }
    }
    pairs
}

fn stringify_query_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Serializes a query map into a percent-encoded query string. Keys come out
/// sorted, so equal maps always produce identical bytes.
pub fn canonical_query(query: &BTreeMap<String, Value>) -> String {
    serde_urlencoded::to_string(query_pairs(query)).unwrap_or_default()
}

/// Method segment of a cache key. DELETE is keyed as `del` so entries line up
/// with caches written by existing clients.
fn method_segment(method: &Method) -> String {
    if *method == Method::DELETE {
        return "del".to_string();
    }
    method.as_str().to_lowercase()
}

/// `prefix:method:path[?query]`, the prefix part omitted when empty.
pub fn cache_key(
    prefix: Option<&str>,
    method: &Method,
    path: &str,
    query: &BTreeMap<String, Value>,
) -> String {
    let mut key = String::new();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        key.push_str(prefix);
        key.push(':');
    }
    key.push_str(&method_segment(method));
    key.push(':');
    key.push_str(path);
    let qs = canonical_query(query);
    if !qs.is_empty() {
        key.push('?');
        key.push_str(&qs);
    }
    key
}

/// Read-through/write-through layer over a [`CacheStore`].
///
/// Reads never fail: store errors and undecodable entries count as misses.
#[derive(Clone)]
pub struct ResponseCache {
    logger: Logger,
    store: Arc<dyn CacheStore>,
    prefix: Option<String>,
    expire_secs: u64,
    stats: Arc<Mutex<CacheStats>>,
}

impl ResponseCache {
    pub fn new(logger: Logger, store: Arc<dyn CacheStore>) -> Self {
        Self {
            logger: logger.child("cache"),
            store,
            prefix: None,
            expire_secs: DEFAULT_EXPIRE_SECS,
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    pub fn from_config(
        logger: Logger,
        store: Arc<dyn CacheStore>,
        default_prefix: &str,
        config: &CacheConfig,
    ) -> Self {
        let prefix = config
            .prefix
            .clone()
            .unwrap_or_else(|| default_prefix.to_string());
        Self::new(logger, store)
            .with_prefix(&prefix)
            .with_expire_secs(config.expire_time)
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string()).filter(|p| !p.is_empty());
        self
    }

    pub fn with_expire_secs(mut self, expire_secs: u64) -> Self {
        self.expire_secs = if expire_secs == 0 {
            DEFAULT_EXPIRE_SECS
        } else {
            expire_secs
        };
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn expire_secs(&self) -> u64 {
        self.expire_secs
    }

    pub fn key(&self, method: &Method, path: &str, query: &BTreeMap<String, Value>) -> String {
        cache_key(self.prefix.as_deref(), method, path, query)
    }

    pub async fn read(&self, key: &str) -> Option<ResponseEnvelope> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.bump(|s| s.misses += 1);
                return None;
            }
            Err(err) => {
                self.bump(|s| {
                    s.errors += 1;
                    s.misses += 1;
                });
                self.logger.warn(
                    "Cache read failed, falling back to network",
                    Some(&serde_json::json!({"key": key, "error": err.message})),
                );
                return None;
            }
        };
        match serde_json::from_str::<ResponseEnvelope>(&raw) {
            Ok(envelope) => {
                self.bump(|s| s.hits += 1);
                Some(envelope)
            }
            Err(err) => {
                self.bump(|s| {
                    s.errors += 1;
                    s.misses += 1;
                });
                self.logger.warn(
                    "Cached value is not a response envelope",
                    Some(&serde_json::json!({"key": key, "error": err.to_string()})),
                );
                None
            }
        }
    }

    pub async fn write(&self, key: &str, envelope: &ResponseEnvelope) -> Result<(), ClientError> {
        let value = serde_json::to_string(envelope)?;
        let result = async {
            self.store.set(key, &value).await?;
            self.store.expire(key, self.expire_secs).await
        }
        .await;
        match &result {
            Ok(()) => self.bump(|s| s.writes += 1),
            Err(_) => self.bump(|s| s.errors += 1),
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    fn bump(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}
