use crate::constants::headers::{ACCEPT, MIME_JSON};
use crate::errors::ClientError;
use crate::services::executor::{ExecutorOptions, RequestExecutor};
use crate::services::logger::Logger;
use crate::services::request::RequestDescriptor;
use crate::services::transport::HttpTransport;
use crate::utils::url::split_url;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct OidcMetadata {
    pub discovery: Value,
    pub jwks: Value,
}

impl OidcMetadata {
    pub fn issuer(&self) -> Option<&str> {
        self.discovery.get("issuer").and_then(Value::as_str)
    }

    pub fn jwks_uri(&self) -> Option<&str> {
        self.discovery.get("jwks_uri").and_then(Value::as_str)
    }

    pub fn keys(&self) -> &[Value] {
        self.jwks
            .get("keys")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// OpenID Connect discovery: the provider document, then its JWK set.
pub struct OidcDiscovery {
    logger: Logger,
    transport: Arc<dyn HttpTransport>,
    discovery_url: String,
}

impl OidcDiscovery {
    pub fn new(logger: Logger, transport: Arc<dyn HttpTransport>, discovery_url: &str) -> Self {
        Self {
            logger: logger.child("oidc"),
            transport,
            discovery_url: discovery_url.trim().to_string(),
        }
    }

    /// `https://{host}{path}`, the usual `.well-known` layout.
    pub fn from_host(logger: Logger, transport: Arc<dyn HttpTransport>, host: &str, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Self::new(logger, transport, &format!("https://{}{}", host.trim(), path))
    }

    pub async fn discover(&self) -> Result<OidcMetadata, ClientError> {
        let discovery = self.fetch_json(&self.discovery_url).await?;
        let jwks_uri = discovery
            .get("jwks_uri")
            .and_then(Value::as_str)
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| {
                ClientError::invalid_config("jwkEndpoint missing from OIDC discovery data")
                    .with_details(serde_json::json!({"discovery_url": self.discovery_url}))
            })?
            .to_string();
        let jwks = self.fetch_json(&jwks_uri).await?;
        self.logger.debug(
            "OIDC discovery complete",
            Some(&serde_json::json!({"jwks_uri": jwks_uri})),
        );
        Ok(OidcMetadata { discovery, jwks })
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, ClientError> {
        let (origin, path) = split_url(url)?;
        let executor = RequestExecutor::new(
            self.logger.clone(),
            self.transport.clone(),
            ExecutorOptions::new(&origin),
        );
        let outcome = executor
            .get(RequestDescriptor::new(path).header(ACCEPT, MIME_JSON))
            .await?
            .error_for_status()?;
        match outcome.response.body {
            body @ Value::Object(_) => Ok(body),
            _ => Err(ClientError::internal(format!("Expected a JSON object from {}", url))),
        }
    }
}
