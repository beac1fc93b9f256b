use super::CacheStore;
use crate::errors::ClientError;
use crate::services::logger::Logger;
use crate::utils::fs_atomic::atomic_write_text_file;
use crate::utils::paths::resolve_cache_dir;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    value: String,
    created_at: String,
    #[serde(default)]
    expires_at_ms: Option<i64>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at_ms
            .map(|at| chrono::Utc::now().timestamp_millis() >= at)
            .unwrap_or(false)
    }
}

/// Cache store keeping one JSON document per key on disk.
///
/// File names are the sha256 of the key, so arbitrary cache keys are safe to
/// use. Writes are atomic; concurrent writers for the same key resolve as
/// last-write-wins.
#[derive(Clone)]
pub struct FileCacheStore {
    logger: Logger,
    cache_dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(logger: Logger) -> Self {
        Self::with_dir(logger, resolve_cache_dir())
    }

    pub fn with_dir(logger: Logger, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            logger: logger.child("file_cache"),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.cache_dir
            .join(format!("{}.json", hex::encode(hasher.finalize())))
    }

    fn read_entry(&self, key: &str) -> Result<Option<StoredEntry>, ClientError> {
        let path = self.entry_path(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ClientError::cache_unavailable(format!(
                    "Cache read failed: {}",
                    err
                )))
            }
        };
        let entry: StoredEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                self.logger.warn(
                    "Discarding unreadable cache entry",
                    Some(&serde_json::json!({"path": path.display().to_string(), "error": err.to_string()})),
                );
                let _ = std::fs::remove_file(&path);
                return Ok(None);
            }
        };
        if entry.key != key {
            return Ok(None);
        }
        if entry.is_expired() {
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn write_entry(&self, entry: &StoredEntry) -> Result<(), ClientError> {
        let serialized = serde_json::to_string_pretty(entry).map_err(|err| {
            ClientError::internal(format!("Failed to serialize cache entry: {}", err))
        })?;
        atomic_write_text_file(
            self.entry_path(&entry.key),
            &format!("{}\n", serialized),
            0o600,
        )
        .map_err(|err| ClientError::cache_unavailable(format!("Failed to write cache entry: {}", err)))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.read_entry(key)?.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.write_entry(&StoredEntry {
            key: key.to_string(),
            value: value.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            expires_at_ms: None,
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), ClientError> {
        let Some(mut entry) = self.read_entry(key)? else {
            return Ok(());
        };
        let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        entry.expires_at_ms = Some(chrono::Utc::now().timestamp_millis().saturating_add(ttl_ms));
        self.write_entry(&entry)
    }
}

#[cfg(test)]
mod tests {
    use super::FileCacheStore;
    use crate::services::logger::Logger;
    use crate::stores::CacheStore;

    fn tmp_store() -> FileCacheStore {
        let dir = std::env::temp_dir().join(format!("apilink-cache-{}", uuid::Uuid::new_v4()));
        FileCacheStore::with_dir(Logger::new("test"), dir)
    }

    #[tokio::test]
    async fn round_trips_values() {
        let store = tmp_store();
        store.set("api:get:/v1/a?x=1", "{\"statusCode\":200}").await.expect("set");
        store.expire("api:get:/v1/a?x=1", 60).await.expect("expire");
        let value = store.get("api:get:/v1/a?x=1").await.expect("get");
        assert_eq!(value.as_deref(), Some("{\"statusCode\":200}"));
        let _ = std::fs::remove_dir_all(store.cache_dir());
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let store = tmp_store();
        store.set("k", "v").await.expect("set");
        store.expire("k", 0).await.expect("expire");
        assert_eq!(store.get("k").await.expect("get"), None);
        let _ = std::fs::remove_dir_all(store.cache_dir());
    }

    #[tokio::test]
    async fn corrupt_entries_read_as_misses() {
        let store = tmp_store();
        store.set("k", "v").await.expect("set");
        std::fs::write(store.entry_path("k"), "not json").expect("corrupt");
        assert_eq!(store.get("k").await.expect("get"), None);
        let _ = std::fs::remove_dir_all(store.cache_dir());
    }
}
