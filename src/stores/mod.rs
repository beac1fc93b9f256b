pub mod file_cache_store;
pub mod memory_cache_store;

use crate::errors::ClientError;
use crate::services::config::CacheConfig;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

pub use file_cache_store::FileCacheStore;
pub use memory_cache_store::MemoryCacheStore;

/// Minimal key-value capability the response cache needs.
///
/// `set` stores without expiry; `expire` attaches a TTL to an existing key.
/// There is no multi-key transaction, so a `set` followed by `expire` is two
/// independent operations.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), ClientError>;
}

/// Produces the cache store for a given API. Connection may be asynchronous.
#[async_trait]
pub trait CacheStoreProvider: Send + Sync {
    async fn connect(
        &self,
        api_name: &str,
        config: &CacheConfig,
    ) -> Result<Arc<dyn CacheStore>, ClientError>;
}

/// Hands out the same, already-connected store to every API.
pub struct ReadyStore(pub Arc<dyn CacheStore>);

#[async_trait]
impl CacheStoreProvider for ReadyStore {
    async fn connect(
        &self,
        _api_name: &str,
        _config: &CacheConfig,
    ) -> Result<Arc<dyn CacheStore>, ClientError> {
        Ok(self.0.clone())
    }
}

type ConnectFn = dyn Fn(String, CacheConfig) -> BoxFuture<'static, Result<Arc<dyn CacheStore>, ClientError>>
    + Send
    + Sync;

/// Factory-function provider, keyed by API name.
pub struct FnProvider {
    connect: Box<ConnectFn>,
}

impl FnProvider {
    pub fn new<F>(connect: F) -> Self
    where
        F: Fn(String, CacheConfig) -> BoxFuture<'static, Result<Arc<dyn CacheStore>, ClientError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            connect: Box::new(connect),
        }
    }
}

#[async_trait]
impl CacheStoreProvider for FnProvider {
    async fn connect(
        &self,
        api_name: &str,
        config: &CacheConfig,
    ) -> Result<Arc<dyn CacheStore>, ClientError> {
        (self.connect)(api_name.to_string(), config.clone()).await
    }
}
