use crate::constants::token::{EXPIRY_BUFFER_MS, GRANT_TYPE};
use crate::errors::ClientError;
use crate::services::executor::{ExecutorOptions, RequestExecutor};
use crate::services::logger::Logger;
use crate::services::request::RequestDescriptor;
use crate::services::transport::HttpTransport;
use crate::utils::url::split_url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone)]
struct CachedToken {
    token: ClientToken,
    expires_at: Instant,
}

/// Client-credentials token fetcher with an in-memory token cache.
pub struct TokenClient {
    logger: Logger,
    executor: RequestExecutor,
    token_path: String,
    client_key: String,
    client_secret: String,
    expiry_buffer: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenClient {
    pub fn new(
        logger: Logger,
        transport: Arc<dyn HttpTransport>,
        token_endpoint: &str,
        client_key: &str,
        client_secret: &str,
    ) -> Result<Self, ClientError> {
        let (origin, token_path) = split_url(token_endpoint)?;
        let logger = logger.child("token");
        let executor = RequestExecutor::new(logger.clone(), transport, ExecutorOptions::new(&origin));
        Ok(Self {
            logger,
            executor,
            token_path,
            client_key: client_key.to_string(),
            client_secret: client_secret.to_string(),
            expiry_buffer: Duration::from_millis(EXPIRY_BUFFER_MS),
            cached: Mutex::new(None),
        })
    }

    pub fn with_expiry_buffer_ms(mut self, buffer_ms: u64) -> Self {
        self.expiry_buffer = Duration::from_millis(buffer_ms);
        self
    }

    /// Returns the cached token while it is fresh, otherwise fetches a new one.
    pub async fn client_token(&self) -> Result<ClientToken, ClientError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        self.fetch_token().await
    }

    pub async fn fetch_token(&self) -> Result<ClientToken, ClientError> {
        let request = RequestDescriptor::new(self.token_path.as_str())
            .query("grant_type", GRANT_TYPE)
            .query("client_id", self.client_key.as_str())
            .query("client_secret", self.client_secret.as_str());
        let outcome = self.executor.get(request).await?.error_for_status()?;
        let token: ClientToken = outcome.response.json()?;
        if token.access_token.trim().is_empty() {
            return Err(ClientError::internal("Token response has no access_token"));
        }
        self.remember(&token);
        self.logger.debug(
            "Fetched client token",
            Some(&serde_json::json!({"expires_in": token.expires_in})),
        );
        Ok(token)
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
    }

    fn cached_token(&self) -> Option<ClientToken> {
        let guard = self.cached.lock().ok()?;
        let entry = guard.as_ref()?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        Some(entry.token.clone())
    }

    fn remember(&self, token: &ClientToken) {
        let Some(expires_in) = token.expires_in else {
            return;
        };
        let ttl = Duration::from_secs(expires_in);
        if ttl <= self.expiry_buffer {
            return;
        }
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(CachedToken {
                token: token.clone(),
                expires_at: Instant::now() + (ttl - self.expiry_buffer),
            });
        }
    }
}
