use crate::constants::headers::{API_KEY, CONTENT_TYPE, MIME_JSON, REQUEST_GUID};
use crate::constants::network::DEFAULT_TIMEOUT_MS;
use crate::constants::retry::MAX_RETRIES;
use crate::errors::{ClientError, TransportError};
use crate::services::cache::{canonical_query, ResponseCache};
use crate::services::config::EndpointConfig;
use crate::services::logger::Logger;
use crate::services::request::{RequestDescriptor, ResponseEnvelope};
use crate::services::transport::{HttpTransport, TransportRequest, TransportResponse};
use crate::utils::template::resolve_uri;
use crate::utils::url::{join_path, normalize_headers, strip_query};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub origin: String,
    pub base_path: String,
    pub headers: BTreeMap<String, String>,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub retry_on_timeout: bool,
    pub json: bool,
}

impl ExecutorOptions {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            base_path: String::new(),
            headers: BTreeMap::new(),
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: MAX_RETRIES,
            retry_on_timeout: true,
            json: true,
        }
    }

    /// Options for an executor bound to one configured upstream.
    ///
    /// The base path is left empty: manifest uris are already absolute paths
    /// on the upstream's origin.
    pub fn for_endpoint(
        config: &EndpointConfig,
        credential: Option<&str>,
        custom_headers: &BTreeMap<String, String>,
    ) -> Result<Self, ClientError> {
        let mut options = Self::new(&config.origin());
        options.headers = normalize_headers(custom_headers.iter());
        if config.use_api_key {
            let key = credential
                .or(config.credential.as_deref())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    ClientError::invalid_config(format!("No API key configured for {}", config.name))
                        .with_hint("Provide a key for this API or set useApiKey to false.")
                })?;
            options.headers.insert(API_KEY.to_string(), key.to_string());
        }
        if let Some(timeout_ms) = config.default_timeout_ms {
            options.default_timeout = Duration::from_millis(timeout_ms);
        }
        Ok(options)
    }

    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.trim().to_lowercase(), value.to_string());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_on_timeout(mut self, enabled: bool) -> Self {
        self.retry_on_timeout = enabled;
        self
    }

    pub fn json(mut self, enabled: bool) -> Self {
        self.json = enabled;
        self
    }
}

/// Timeout-retry progress of one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub retries: u32,
    pub max_retries: u32,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            retries: 0,
            max_retries,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }

    pub fn next(self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self
        }
    }

    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub response: ResponseEnvelope,
    pub request_id: String,
    pub retry: RetryState,
    pub from_cache: bool,
    /// Set when the write-through failed; the response itself is still valid.
    pub cache_error: Option<ClientError>,
}

impl ExecutionOutcome {
    pub fn status(&self) -> u16 {
        self.response.status_code
    }

    pub fn body(&self) -> &Value {
        &self.response.body
    }

    /// Turns a `>= 400` status into a `BadStatus` error.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        let status = self.response.status_code;
        if status < 400 {
            return Ok(self);
        }
        let detail = match &self.response.body {
            Value::Null => self.response.status_message.clone(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Err(ClientError::bad_status(
            status,
            format!("Request {} failed with status {}: {}", self.request_id, status, detail),
        ))
    }
}

/// Issues HTTP calls for one origin, retrying timeouts and consulting an
/// optional response cache.
pub struct RequestExecutor {
    logger: Logger,
    transport: Arc<dyn HttpTransport>,
    options: ExecutorOptions,
    cache: RwLock<Option<ResponseCache>>,
    last_request_id: Mutex<Option<String>>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("origin", &self.options.origin)
            .field("base_path", &self.options.base_path)
            .field("cache", &self.has_cache())
            .finish()
    }
}

impl RequestExecutor {
    pub fn new(logger: Logger, transport: Arc<dyn HttpTransport>, options: ExecutorOptions) -> Self {
        Self {
            logger,
            transport,
            options,
            cache: RwLock::new(None),
            last_request_id: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn attach_cache(&self, cache: ResponseCache) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(cache);
        }
    }

    pub fn detach_cache(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
    }

    pub fn cache(&self) -> Option<ResponseCache> {
        self.cache.read().ok().and_then(|guard| guard.clone())
    }

    pub fn has_cache(&self) -> bool {
        self.cache
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Correlation token of the most recently started call.
    pub fn last_request_id(&self) -> Option<String> {
        self.last_request_id
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    pub async fn get(&self, request: impl Into<RequestDescriptor>) -> Result<ExecutionOutcome, ClientError> {
        self.execute(Method::GET, request).await
    }

    /// GET that reads through the cache when one is attached.
    pub async fn get_cached(
        &self,
        request: impl Into<RequestDescriptor>,
    ) -> Result<ExecutionOutcome, ClientError> {
        self.execute(Method::GET, request.into().use_cache(true)).await
    }

    pub async fn post(&self, request: impl Into<RequestDescriptor>) -> Result<ExecutionOutcome, ClientError> {
        self.execute(Method::POST, request).await
    }

    pub async fn put(&self, request: impl Into<RequestDescriptor>) -> Result<ExecutionOutcome, ClientError> {
        self.execute(Method::PUT, request).await
    }

    pub async fn delete(&self, request: impl Into<RequestDescriptor>) -> Result<ExecutionOutcome, ClientError> {
        self.execute(Method::DELETE, request).await
    }

    pub async fn patch(&self, request: impl Into<RequestDescriptor>) -> Result<ExecutionOutcome, ClientError> {
        self.execute(Method::PATCH, request).await
    }

    pub async fn head(&self, request: impl Into<RequestDescriptor>) -> Result<ExecutionOutcome, ClientError> {
        self.execute(Method::HEAD, request).await
    }

    pub async fn execute(
        &self,
        method: Method,
        request: impl Into<RequestDescriptor>,
    ) -> Result<ExecutionOutcome, ClientError> {
        let request = request.into();
        let request_id = request
            .request_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut headers = self.options.headers.clone();
        headers.extend(normalize_headers(request.headers.iter()));
        headers.insert(REQUEST_GUID.to_string(), request_id.clone());
        self.record_request_id(&request_id);

        let uri = if request.params.is_empty() {
            request.uri.clone()
        } else {
            resolve_uri(&request.uri, &request.params)
        };
        let (path, url) = self.target(&uri, &request.query);

        let cache = self.cache();
        let cache_key = cache
            .as_ref()
            .map(|cache| cache.key(&method, &path, &request.query));

        if request.use_cache {
            if let (Some(cache), Some(key)) = (cache.as_ref(), cache_key.as_deref()) {
                if let Some(response) = cache.read(key).await {
                    self.logger.debug(
                        "Served from cache",
                        Some(&serde_json::json!({"request_id": request_id, "key": key})),
                    );
                    return Ok(ExecutionOutcome {
                        response,
                        request_id,
                        retry: RetryState::new(self.options.max_retries),
                        from_cache: true,
                        cache_error: None,
                    });
                }
            }
        }

        let body = self.encode_body(request.body.as_ref(), &mut headers)?;
        let transport_request = TransportRequest {
            method: method.clone(),
            url,
            headers,
            body,
            timeout: request.timeout.unwrap_or(self.options.default_timeout),
        };

        self.logger.debug(
            "Sending request",
            Some(&serde_json::json!({
                "request_id": request_id,
                "method": method.as_str(),
                "url": strip_query(&transport_request.url),
            })),
        );
        let (raw, retry) = self.send_with_retry(&transport_request, &request_id).await?;
        let response = self.to_envelope(raw);

        let mut cache_error = None;
        if response.is_cacheable() {
            if let (Some(cache), Some(key)) = (cache.as_ref(), cache_key.as_deref()) {
                if let Err(err) = cache.write(key, &response).await {
                    self.logger.warn(
                        "Cache write failed",
                        Some(&serde_json::json!({
                            "request_id": request_id,
                            "key": key,
                            "error": err.message,
                        })),
                    );
                    cache_error = Some(err);
                }
            }
        }

        Ok(ExecutionOutcome {
            response,
            request_id,
            retry,
            from_cache: false,
            cache_error,
        })
    }

    async fn send_with_retry(
        &self,
        request: &TransportRequest,
        request_id: &str,
    ) -> Result<(TransportResponse, RetryState), ClientError> {
        let mut state = RetryState::new(self.options.max_retries);
        loop {
            let sent = self.transport.send(request.clone()).await;
            match sent.map_err(|err| err.redact_url(&request.url)) {
                Ok(response) => return Ok((response, state)),
                Err(err) if err.is_timeout() && self.options.retry_on_timeout => {
                    if state.exhausted() {
                        self.logger.error(
                            "Retries exhausted",
                            Some(&serde_json::json!({
                                "request_id": request_id,
                                "target": strip_query(&request.url),
                                "retries": state.retries,
                            })),
                        );
                        return Err(ClientError::retry_exhausted(request_id, state.retries));
                    }
                    state = state.next();
                    self.logger.warn(
                        &format!(
                            "Request {} to {} timed out, retry {} of {}",
                            request_id,
                            strip_query(&request.url),
                            state.retries,
                            state.max_retries
                        ),
                        Some(&serde_json::json!({"error": err.to_string()})),
                    );
                }
                Err(err) => return Err(self.fail(err, request, request_id)),
            }
        }
    }

    fn fail(&self, err: TransportError, request: &TransportRequest, request_id: &str) -> ClientError {
        self.logger.error(
            "Request failed",
            Some(&serde_json::json!({
                "request_id": request_id,
                "target": strip_query(&request.url),
                "error": err.to_string(),
            })),
        );
        ClientError::from(err).with_details(serde_json::json!({
            "request_id": request_id,
            "target": strip_query(&request.url),
        }))
    }

    fn target(&self, uri: &str, query: &BTreeMap<String, Value>) -> (String, String) {
        let absolute = uri.starts_with("http://") || uri.starts_with("https://");
        let path = if absolute || self.options.base_path.is_empty() {
            uri.to_string()
        } else {
            join_path(&[self.options.base_path.as_str(), uri])
        };
        let mut url = if absolute {
            path.clone()
        } else {
            format!("{}{}", self.options.origin, path)
        };
        let qs = canonical_query(query);
        if !qs.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&qs);
        }
        (path, url)
    }

    fn encode_body(
        &self,
        body: Option<&Value>,
        headers: &mut BTreeMap<String, String>,
    ) -> Result<Option<String>, ClientError> {
        let Some(body) = body else {
            return Ok(None);
        };
        let encoded = match body {
            Value::String(text) if !self.options.json => text.clone(),
            other => serde_json::to_string(other)?,
        };
        if self.options.json {
            headers
                .entry(CONTENT_TYPE.to_string())
                .or_insert_with(|| MIME_JSON.to_string());
        }
        Ok(Some(encoded))
    }

    fn to_envelope(&self, raw: TransportResponse) -> ResponseEnvelope {
        let body = if raw.body.is_empty() {
            Value::Null
        } else {
            let text = String::from_utf8_lossy(&raw.body).into_owned();
            if self.options.json {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            } else {
                Value::String(text)
            }
        };
        ResponseEnvelope {
            status_code: raw.status,
            status_message: raw.status_text,
            headers: raw.headers,
            body,
        }
    }

    fn record_request_id(&self, request_id: &str) {
        if let Ok(mut guard) = self.last_request_id.lock() {
            *guard = Some(request_id.to_string());
        }
    }
}
