use crate::constants::retry::TIMEOUT_MARKER;
use crate::utils::url::strip_query;
use thiserror::Error;

/// Failure reported by an [`HttpTransport`](crate::services::transport::HttpTransport)
/// before any HTTP status was received.
///
/// The rendered text carries the conventional socket error codes so that
/// callers can classify failures by message alone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("ETIMEDOUT: connecting to {target} timed out")]
    ConnectTimeout { target: String },

    #[error("ESOCKETTIMEDOUT: no response from {target} within {timeout_ms}ms")]
    ResponseTimeout { target: String, timeout_ms: u64 },

    #[error("ECONNREFUSED: could not connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn other(message: impl Into<String>) -> Self {
        TransportError::Other(message.into())
    }

    /// Replaces every occurrence of `url` in the error text with its
    /// query-less form.
    pub fn redact_url(self, url: &str) -> Self {
        let shown = strip_query(url);
        if shown.len() == url.len() {
            return self;
        }
        let scrub = |text: String| text.replace(url, shown);
        match self {
            TransportError::ConnectTimeout { target } => TransportError::ConnectTimeout {
                target: scrub(target),
            },
            TransportError::ResponseTimeout { target, timeout_ms } => TransportError::ResponseTimeout {
                target: scrub(target),
                timeout_ms,
            },
            TransportError::Connect { target, message } => TransportError::Connect {
                target: scrub(target),
                message: scrub(message),
            },
            TransportError::InvalidRequest(message) => TransportError::InvalidRequest(scrub(message)),
            TransportError::Other(message) => TransportError::Other(scrub(message)),
        }
    }

    /// Timeout classification is textual: any error whose rendering contains
    /// `TIMEDOUT` counts, which covers both the connect and the response-wait
    /// variants as well as foreign errors wrapped in [`TransportError::Other`].
    pub fn is_timeout(&self) -> bool {
        self.to_string().contains(TIMEOUT_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::TransportError;

    #[test]
    fn timeouts_are_classified_by_text() {
        let connect = TransportError::ConnectTimeout {
            target: "http://localhost:1".to_string(),
        };
        let response = TransportError::ResponseTimeout {
            target: "http://localhost:1/a".to_string(),
            timeout_ms: 50,
        };
        assert!(connect.is_timeout());
        assert!(response.is_timeout());
        assert!(TransportError::other("ESOCKETTIMEDOUT").is_timeout());
    }

    #[test]
    fn other_failures_are_not_timeouts() {
        let refused = TransportError::Connect {
            target: "http://localhost:1".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(!refused.is_timeout());
        assert!(!TransportError::other("socket hang up").is_timeout());
        assert!(!TransportError::InvalidRequest("bad header".to_string()).is_timeout());
    }

    #[test]
    fn redaction_removes_query_strings() {
        let url = "http://login.local/token?client_id=id&client_secret=SUPERSECRET";
        let err = TransportError::Connect {
            target: url.to_string(),
            message: format!("error sending request for url ({})", url),
        }
        .redact_url(url);
        let text = err.to_string();
        assert!(!text.contains("SUPERSECRET"), "{}", text);
        assert!(text.contains("http://login.local/token"));

        let timeout = TransportError::ResponseTimeout {
            target: url.to_string(),
            timeout_ms: 50,
        }
        .redact_url(url);
        assert!(timeout.is_timeout());
        assert!(!timeout.to_string().contains("client_secret"));
    }
}
