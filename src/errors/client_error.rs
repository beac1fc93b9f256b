use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

use super::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorKind {
    InvalidConfig,
    Timeout,
    RetryExhausted,
    Network,
    BadStatus,
    CredentialInvalid,
    CacheUnavailable,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl ClientError {
    pub fn new(
        kind: ClientErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, ClientErrorKind::Timeout),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::InvalidConfig, "INVALID_CONFIG", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn retry_exhausted(request_id: &str, retries: u32) -> Self {
        Self::new(
            ClientErrorKind::RetryExhausted,
            "RETRY_EXHAUSTED",
            format!(
                "Request {} timed out after {} retries. The connection to the API seems to be overloaded.",
                request_id, retries
            ),
        )
        .with_details(serde_json::json!({"request_id": request_id, "retries": retries}))
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Network, "NETWORK", message)
    }

    pub fn bad_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::BadStatus, "BAD_STATUS", message)
            .with_details(serde_json::json!({"status": status}))
    }

    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::CredentialInvalid, "CREDENTIAL_INVALID", message)
    }

    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::CacheUnavailable, "CACHE_UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Internal, "INTERNAL", message)
    }

    pub fn status(&self) -> Option<u16> {
        self.details
            .as_ref()
            .and_then(|d| d.get("status"))
            .and_then(|v| v.as_u64())
            .map(|v| v as u16)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ClientError {}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        if err.is_timeout() {
            return ClientError::timeout(err.to_string());
        }
        ClientError::network(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::internal(format!("JSON error: {}", err))
    }
}
