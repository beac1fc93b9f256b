use crate::errors::ClientError;
use crate::services::config::{EndpointConfig, Manifest, OperationDescriptor};
use crate::services::executor::{ExecutionOutcome, RequestExecutor};
use crate::services::request::RequestDescriptor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// One configured upstream: its executor plus discovery state.
///
/// `connected` flips to true once and stays there. The manifest is swapped
/// as a whole, so readers see either the previous or the new mapping.
pub struct ApiHandle {
    name: String,
    config: EndpointConfig,
    connected: AtomicBool,
    manifest: RwLock<Option<Arc<Manifest>>>,
    executor: Arc<RequestExecutor>,
    connected_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for ApiHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiHandle")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .field("operations", &self.manifest().map(|m| m.len()))
            .finish()
    }
}

impl ApiHandle {
    pub fn new(name: &str, config: EndpointConfig, executor: Arc<RequestExecutor>) -> Self {
        let (connected_tx, _) = watch::channel(false);
        Self {
            name: name.to_string(),
            config,
            connected: AtomicBool::new(false),
            manifest: RwLock::new(None),
            executor,
            connected_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn executor(&self) -> Arc<RequestExecutor> {
        self.executor.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.read().ok().and_then(|guard| guard.clone())
    }

    pub fn operation(&self, name: &str) -> Option<OperationDescriptor> {
        self.manifest().and_then(|m| m.get(name).cloned())
    }

    /// Installs `manifest` (when given) and marks the handle connected.
    /// Returns true only for the call that performed the flip.
    pub(crate) fn mark_connected(&self, manifest: Option<Manifest>) -> bool {
        if let Some(manifest) = manifest {
            if let Ok(mut guard) = self.manifest.write() {
                *guard = Some(Arc::new(manifest));
            }
        }
        let first = !self.connected.swap(true, Ordering::SeqCst);
        self.connected_tx.send_replace(true);
        first
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    /// Calls a manifest operation by name. The operation's method and uri
    /// template are used; `request.params` fill the template.
    pub async fn call(
        &self,
        operation: &str,
        request: RequestDescriptor,
    ) -> Result<ExecutionOutcome, ClientError> {
        let descriptor = self.operation(operation).ok_or_else(|| {
            ClientError::invalid_config(format!(
                "Unknown operation {} on api {}",
                operation, self.name
            ))
            .with_hint(if self.is_connected() {
                "Check the operation name against the published paths."
            } else {
                "The api has not published its paths yet."
            })
        })?;
        let method = descriptor.http_method()?;
        let uri = descriptor.resolve(&request.params);
        let request = RequestDescriptor {
            uri,
            params: serde_json::Map::new(),
            ..request
        };
        self.executor.execute(method, request).await
    }
}
