use crate::constants::discovery::{EXIT_CODE_FAILURE, PATHS_ENDPOINT, RECONNECT_DELAY_MS};
use crate::constants::env;
use crate::errors::ClientError;
use crate::managers::api_check::check_api;
use crate::managers::api_handle::ApiHandle;
use crate::services::cache::ResponseCache;
use crate::services::config::{ApiKeys, ApisConfig, CacheConfig, Manifest};
use crate::services::executor::{ExecutorOptions, RequestExecutor};
use crate::services::logger::Logger;
use crate::services::transport::{HttpTransport, ReqwestTransport};
use crate::stores::CacheStoreProvider;
use crate::utils::url::join_path;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Invoked with a process exit code when a required API fails its check.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

fn process_exit() -> ExitHook {
    Arc::new(|code| std::process::exit(code))
}

#[derive(Clone)]
pub struct SetupOptions {
    pub logger: Logger,
    pub reconnect_delay: Duration,
    pub cache_provider: Option<Arc<dyn CacheStoreProvider>>,
    /// Per-API cache settings; these win over `EndpointConfig::cache`.
    pub cache: BTreeMap<String, CacheConfig>,
    pub check_apis: bool,
    pub custom_headers: BTreeMap<String, String>,
    pub exit_hook: ExitHook,
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl std::fmt::Debug for SetupOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupOptions")
            .field("reconnect_delay", &self.reconnect_delay)
            .field("cache_provider", &self.cache_provider.is_some())
            .field("cache", &self.cache.keys().collect::<Vec<_>>())
            .field("check_apis", &self.check_apis)
            .field("custom_headers", &self.custom_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            logger: Logger::new("apilink"),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            cache_provider: None,
            cache: BTreeMap::new(),
            check_apis: false,
            custom_headers: BTreeMap::new(),
            exit_hook: process_exit(),
            transport: None,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl SetupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `APILINK_RECONNECT_DELAY_MS` and `APILINK_CHECK_APIS`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(raw) = std::env::var(env::RECONNECT_DELAY_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => options.reconnect_delay = Duration::from_millis(ms),
                _ => options.logger.warn(
                    "Ignoring invalid reconnect delay",
                    Some(&serde_json::json!({"var": env::RECONNECT_DELAY_MS, "value": raw})),
                ),
            }
        }
        if let Ok(raw) = std::env::var(env::CHECK_APIS) {
            match parse_flag(&raw) {
                Some(flag) => options.check_apis = flag,
                None => options.logger.warn(
                    "Ignoring invalid check flag",
                    Some(&serde_json::json!({"var": env::CHECK_APIS, "value": raw})),
                ),
            }
        }
        options
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_cache_provider(mut self, provider: impl CacheStoreProvider + 'static) -> Self {
        self.cache_provider = Some(Arc::new(provider));
        self
    }

    pub fn with_cache_config(mut self, api_name: &str, config: CacheConfig) -> Self {
        self.cache.insert(api_name.to_string(), config);
        self
    }

    pub fn check_apis(mut self, enabled: bool) -> Self {
        self.check_apis = enabled;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.custom_headers
            .insert(name.trim().to_lowercase(), value.to_string());
        self
    }

    pub fn with_exit_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.exit_hook = Arc::new(hook);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn cache_config_for(&self, handle: &ApiHandle) -> Option<CacheConfig> {
        self.cache
            .get(handle.name())
            .cloned()
            .or_else(|| handle.config().cache.clone())
    }
}

#[derive(Clone)]
struct BootstrapContext {
    logger: Logger,
    reconnect_delay: Duration,
    check_apis: bool,
    exit_hook: ExitHook,
    exit_requested: Arc<AtomicBool>,
}

impl BootstrapContext {
    fn request_exit(&self, code: i32) {
        if !self.exit_requested.swap(true, Ordering::SeqCst) {
            (self.exit_hook)(code);
        }
    }
}

/// Picks the operation mapping out of a `_paths` body: the `api` member
/// when it is a mapping rather than an operation, else the body itself.
pub fn parse_manifest(body: &Value) -> Result<Manifest, ClientError> {
    let source = match body.get("api") {
        Some(api) if api.is_object() && api.get("uri").and_then(Value::as_str).is_none() => api,
        _ => body,
    };
    if !source.is_object() {
        return Err(ClientError::internal("Paths response is not an object"));
    }
    serde_json::from_value(source.clone())
        .map_err(|err| ClientError::internal(format!("Invalid paths manifest: {}", err)))
}

async fn fetch_manifest(handle: &ApiHandle) -> Result<Option<Manifest>, ClientError> {
    let config = handle.config();
    if let Some(paths) = &config.paths {
        return Ok(Some(paths.clone()));
    }
    if config.do_not_call_paths_endpoint {
        return Ok(None);
    }
    let uri = join_path(&["/", config.base_path.as_str(), PATHS_ENDPOINT]);
    let outcome = handle.executor().get(uri).await?;
    let status = outcome.status();
    if status != 200 {
        return Err(ClientError::bad_status(
            status,
            format!("{} We can't access this API server. Check path and keys", status),
        ));
    }
    parse_manifest(outcome.body()).map(Some)
}

async fn run_check(ctx: &BootstrapContext, logger: &Logger, handle: &ApiHandle) {
    let Err(err) = check_api(handle).await else {
        return;
    };
    logger.error(
        &format!("Error while checking API: {}", err.message),
        Some(&serde_json::json!({"api": handle.name(), "code": err.code, "status": err.status()})),
    );
    if handle.config().required_for_startup {
        logger.error(
            "Required API call failed, EXITING",
            Some(&serde_json::json!({"api": handle.name()})),
        );
        ctx.request_exit(EXIT_CODE_FAILURE);
    }
}

/// Resolves once `shutdown()` has been requested. A dropped sender is not a
/// stop request; the loop then lives as long as the runtime.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        futures::future::pending::<()>().await;
    }
}

async fn bootstrap(
    ctx: BootstrapContext,
    handle: Arc<ApiHandle>,
    first_attempt: oneshot::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) {
    let logger = ctx.logger.child(handle.name());
    let mut first_attempt = Some(first_attempt);
    loop {
        let fetched = tokio::select! {
            fetched = fetch_manifest(&handle) => fetched,
            _ = stop_requested(&mut shutdown) => {
                logger.debug("Manifest fetch abandoned on shutdown", Some(&serde_json::json!({"api": handle.name()})));
                if let Some(tx) = first_attempt.take() {
                    let _ = tx.send(());
                }
                return;
            }
        };
        match fetched {
            Ok(manifest) => {
                handle.mark_connected(manifest);
                logger.info(&format!("Connected to api: {}", handle.name()), None);
                if ctx.check_apis {
                    run_check(&ctx, &logger, &handle).await;
                }
                if let Some(tx) = first_attempt.take() {
                    let _ = tx.send(());
                }
                return;
            }
            Err(err) => {
                let config = handle.config();
                logger.error(
                    &format!("Failed to get API paths from API: {}", handle.name()),
                    Some(&serde_json::json!({
                        "api": handle.name(),
                        "host": config.host,
                        "base_path": config.base_path,
                        "code": err.code,
                        "error": err.message,
                    })),
                );
                if let Some(tx) = first_attempt.take() {
                    let _ = tx.send(());
                }
                tokio::select! {
                    _ = tokio::time::sleep(ctx.reconnect_delay) => {}
                    _ = stop_requested(&mut shutdown) => {
                        logger.debug("Reconnect loop stopped", Some(&serde_json::json!({"api": handle.name()})));
                        return;
                    }
                }
                logger.info(&format!("Reconnecting to api: {}", handle.name()), None);
            }
        }
    }
}

async fn wire_cache(
    logger: &Logger,
    provider: Option<&Arc<dyn CacheStoreProvider>>,
    handle: &ApiHandle,
    config: CacheConfig,
) {
    let Some(provider) = provider else {
        logger.warn(
            "Cache configured but no cache store provider given",
            Some(&serde_json::json!({"api": handle.name()})),
        );
        return;
    };
    match provider.connect(handle.name(), &config).await {
        Ok(store) => {
            let cache = ResponseCache::from_config(logger.child(handle.name()), store, handle.name(), &config);
            handle.executor().attach_cache(cache);
            logger.debug(
                &format!("API configured to use cache: {}", handle.name()),
                Some(&serde_json::json!({"expire_secs": config.expire_time})),
            );
        }
        Err(err) => logger.error(
            "Unable to create cache store client",
            Some(&serde_json::json!({"api": handle.name(), "code": err.code, "error": err.message})),
        ),
    }
}

/// Builds one handle per configured API and starts their bootstraps.
///
/// Resolves after every API has finished its first manifest attempt. APIs
/// that failed keep reconnecting in the background and update their handle
/// in place.
pub async fn setup(
    apis: &ApisConfig,
    keys: &ApiKeys,
    options: SetupOptions,
) -> Result<Connections, ClientError> {
    let logger = options.logger.clone();
    let transport: Arc<dyn HttpTransport> = match &options.transport {
        Some(transport) => transport.clone(),
        None => Arc::new(ReqwestTransport::new()?),
    };

    let mut handles = BTreeMap::new();
    for (name, config) in apis.iter() {
        let executor_options =
            ExecutorOptions::for_endpoint(config, keys.get(name), &options.custom_headers)?;
        let executor = RequestExecutor::new(logger.child(name), transport.clone(), executor_options);
        handles.insert(
            name.clone(),
            Arc::new(ApiHandle::new(name, config.clone(), Arc::new(executor))),
        );
    }

    let ctx = BootstrapContext {
        logger: logger.clone(),
        reconnect_delay: options.reconnect_delay,
        check_apis: options.check_apis,
        exit_hook: options.exit_hook.clone(),
        exit_requested: Arc::new(AtomicBool::new(false)),
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::with_capacity(handles.len());
    let mut first_attempts = Vec::with_capacity(handles.len());
    for handle in handles.values() {
        let (tx, rx) = oneshot::channel();
        tasks.push(tokio::spawn(bootstrap(
            ctx.clone(),
            handle.clone(),
            tx,
            shutdown_rx.clone(),
        )));
        first_attempts.push(rx);
    }
    join_all(first_attempts).await;

    join_all(handles.values().filter_map(|handle| {
        options
            .cache_config_for(handle)
            .map(|config| wire_cache(&logger, options.cache_provider.as_ref(), handle, config))
    }))
    .await;

    let summary: serde_json::Map<String, Value> = handles
        .iter()
        .map(|(name, handle)| (name.clone(), Value::Bool(handle.is_connected())))
        .collect();
    logger.info("API setup done.", Some(&Value::Object(summary)));

    Ok(Connections {
        logger,
        apis: handles,
        shutdown_tx,
        tasks: Mutex::new(tasks),
    })
}

/// Aggregate result of [`setup`].
pub struct Connections {
    logger: Logger,
    apis: BTreeMap<String, Arc<ApiHandle>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.apis.iter()).finish()
    }
}

impl Connections {
    pub fn get(&self, name: &str) -> Option<Arc<ApiHandle>> {
        self.apis.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.apis.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<ApiHandle>)> {
        self.apis.iter()
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    pub fn connected(&self) -> Vec<String> {
        self.apis
            .iter()
            .filter(|(_, handle)| handle.is_connected())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn wait_connected(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Arc<ApiHandle>, ClientError> {
        let handle = self
            .get(name)
            .ok_or_else(|| ClientError::invalid_config(format!("Unknown api: {}", name)))?;
        let mut rx = handle.subscribe();
        let waited = tokio::time::timeout(timeout, async { rx.wait_for(|c| *c).await.is_ok() }).await;
        match waited {
            Ok(true) => Ok(handle),
            Ok(false) => Err(ClientError::internal(format!(
                "Connection state for {} is no longer tracked",
                name
            ))),
            Err(_) => Err(ClientError::timeout(format!(
                "Api {} did not connect within {}ms",
                name,
                timeout.as_millis()
            ))),
        }
    }

    /// Stops every reconnect loop and waits for the tasks to finish. A manifest
    /// fetch in flight is abandoned, retries included.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            if let Err(err) = task.await {
                self.logger.warn(
                    "Bootstrap task ended abnormally",
                    Some(&serde_json::json!({"error": err.to_string()})),
                );
            }
        }
    }
}
