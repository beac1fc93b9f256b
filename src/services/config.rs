use crate::constants::cache::DEFAULT_EXPIRE_SECS;
use crate::constants::discovery::STATUS_CHECK_PATH;
use crate::errors::ClientError;
use crate::utils::template::resolve_uri;
use crate::utils::url::base_url;
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Operation name → descriptor, as published on an upstream's `_paths` endpoint.
pub type Manifest = BTreeMap<String, OperationDescriptor>;

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expire_secs() -> u64 {
    DEFAULT_EXPIRE_SECS
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("port must be between 0 and 65535")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom("port must be numeric")),
        Some(_) => Err(serde::de::Error::custom("port must be a number or string")),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRequirement {
    #[serde(default)]
    pub scope_required: bool,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub uri: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apikey: Option<ApiKeyRequirement>,
}

impl OperationDescriptor {
    pub fn http_method(&self) -> Result<Method, ClientError> {
        Method::from_bytes(self.method.to_uppercase().as_bytes()).map_err(|_| {
            ClientError::invalid_config(format!("Invalid HTTP method: {}", self.method))
        })
    }

    /// Fills the `:param` placeholders of the uri template.
    pub fn resolve(&self, params: &serde_json::Map<String, Value>) -> String {
        resolve_uri(&self.uri, params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_expire_secs", alias = "expire")]
    pub expire_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Opaque settings handed to the cache-store provider.
    #[serde(default, alias = "redis", skip_serializing_if = "Option::is_none")]
    pub store: Option<Value>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expire_time: DEFAULT_EXPIRE_SECS,
            prefix: None,
            store: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    /// Plain http unless `https`/`useTls` is set.
    #[serde(default, rename = "useTls", alias = "https", alias = "useTLS")]
    pub use_tls: bool,
    #[serde(default, alias = "proxyBasePath")]
    pub base_path: String,
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
    #[serde(default, alias = "required")]
    pub required_for_startup: bool,
    #[serde(default = "default_true")]
    pub use_api_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_check_path: Option<String>,
    #[serde(default)]
    pub do_not_call_paths_endpoint: bool,
    /// Statically configured manifest; skips the `_paths` fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Manifest>,
    #[serde(default, alias = "defaultTimeout", skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,
    #[serde(default, alias = "cacheConfig", skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

impl EndpointConfig {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port: None,
            use_tls: false,
            base_path: String::new(),
            credential: None,
            required_for_startup: false,
            use_api_key: true,
            status_check_path: None,
            do_not_call_paths_endpoint: false,
            paths: None,
            default_timeout_ms: None,
            cache: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.to_string();
        self
    }

    pub fn with_credential(mut self, credential: &str) -> Self {
        self.credential = Some(credential.to_string());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required_for_startup = required;
        self
    }

    pub fn with_api_key(mut self, use_api_key: bool) -> Self {
        self.use_api_key = use_api_key;
        self
    }

    pub fn origin(&self) -> String {
        base_url(&self.host, self.port, self.use_tls)
    }

    pub fn status_check_path(&self) -> &str {
        self.status_check_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(STATUS_CHECK_PATH)
    }
}

/// API name → endpoint configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApisConfig {
    apis: BTreeMap<String, EndpointConfig>,
}

impl ApisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut config: EndpointConfig) -> Result<(), ClientError> {
        let name = config.name.trim().to_string();
        if name.is_empty() {
            return Err(ClientError::invalid_config("API name must be a non-empty string"));
        }
        config.name = name.clone();
        self.apis.insert(name, config);
        Ok(())
    }

    pub fn with(mut self, config: EndpointConfig) -> Result<Self, ClientError> {
        self.insert(config)?;
        Ok(self)
    }

    pub fn from_json_value(value: Value) -> Result<Self, ClientError> {
        let Value::Object(map) = value else {
            return Err(ClientError::invalid_config("Apis config is required.")
                .with_hint("Provide an object mapping API names to endpoint configs."));
        };
        let mut out = Self::new();
        for (name, raw) in map {
            let mut config: EndpointConfig = serde_json::from_value(raw).map_err(|err| {
                ClientError::invalid_config(format!("Invalid config for API {}: {}", name, err))
            })?;
            config.name = name;
            out.insert(config)?;
        }
        Ok(out)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ClientError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| ClientError::invalid_config(format!("Invalid apis config JSON: {}", err)))?;
        Self::from_json_value(value)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            ClientError::invalid_config(format!(
                "Failed to read apis config {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn get(&self, name: &str) -> Option<&EndpointConfig> {
        self.apis.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EndpointConfig)> {
        self.apis.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.apis.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }
}

/// API name → credential.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiKeys {
    keys: BTreeMap<String, String>,
}

impl ApiKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, key: &str) -> Self {
        self.keys.insert(name.to_string(), key.to_string());
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ClientError> {
        let keys: BTreeMap<String, String> = serde_json::from_str(raw)
            .map_err(|err| ClientError::invalid_config(format!("Invalid api keys JSON: {}", err)))?;
        Ok(Self { keys })
    }

    /// Reads `<prefix><NAME>` for every name, upper-cased, `-` mapped to `_`.
    pub fn from_env(prefix: &str, names: &[String]) -> Self {
        let keys = names
            .iter()
            .filter_map(|name| {
                let var = format!("{}{}", prefix, name.to_uppercase().replace('-', "_"));
                std::env::var(var)
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|v| (name.clone(), v))
            })
            .collect();
        Self { keys }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }
}
