use super::CacheStore;
use crate::errors::ClientError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Process-local cache store with per-key expiry.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.purge_expired();
        self.entries.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.purge_expired();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        if let Ok(mut guard) = self.entries.write() {
            guard.retain(|_, entry| !entry.is_expired(now));
        }
    }

    fn lock_error() -> ClientError {
        ClientError::cache_unavailable("Memory cache store lock is poisoned")
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        let now = Instant::now();
        let guard = self.entries.read().map_err(|_| Self::lock_error())?;
        Ok(guard
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let mut guard = self.entries.write().map_err(|_| Self::lock_error())?;
        guard.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), ClientError> {
        let mut guard = self.entries.write().map_err(|_| Self::lock_error())?;
        if let Some(entry) = guard.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }
}
