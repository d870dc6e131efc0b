//! Error types for strand-wire

use thiserror::Error;

/// Result type alias using strand-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the wire: composing requests, opening the
/// response stream, and decoding it.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed (connection refused, reset, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed (HTTP 401); retrying identically cannot succeed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Request payload too large (HTTP 413); fewer context files are needed
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Rate limited (HTTP 429 or an equivalent server signal)
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    Throttled { retry_after: Option<u64> },

    /// Server temporarily unavailable (HTTP 5xx)
    #[error("Server unavailable (status {status})")]
    Unavailable { status: u16 },

    /// Explicit error event observed in the stream
    #[error("Server error: {error}")]
    Server {
        error: String,
        detail: Option<String>,
    },

    /// Connection dropped while a stream was being read
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Stream was aborted by the client
    #[error("Request aborted")]
    Aborted,

    /// Event boundary never arrived within the buffer cap
    #[error("Event buffer exceeded {0} bytes without a delimiter")]
    EventOverflow(usize),
}

impl Error {
    /// Classify a non-success HTTP status into a wire error.
    ///
    /// `retry_after` is the parsed `Retry-After` header, when present.
    pub fn from_status(status: u16, retry_after: Option<u64>, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => Error::Auth(body),
            413 => Error::PayloadTooLarge(body),
            429 => Error::Throttled { retry_after },
            s if s >= 500 => Error::Unavailable { status: s },
            _ => Error::Server {
                error: format!("unexpected status {status}"),
                detail: if body.is_empty() { None } else { Some(body) },
            },
        }
    }

    /// Whether this failure class supports any retry at all (automatic or
    /// user-initiated). Auth and payload-too-large never do.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Throttled { .. }
                | Error::Unavailable { .. }
                | Error::ConnectionLost(_)
                | Error::Http(_)
        )
    }

    /// Whether this error is a rate-limit signal. Matches the typed
    /// variant plus rate-limit language in server-reported detail.
    pub fn is_throttled(&self) -> bool {
        match self {
            Error::Throttled { .. } => true,
            Error::Server { error, detail } => {
                let text = match detail {
                    Some(d) => format!("{} {}", error, d).to_lowercase(),
                    None => error.to_lowercase(),
                };
                text.contains("rate limit")
                    || text.contains("rate_limit")
                    || text.contains("too many requests")
                    || text.contains("throttl")
                    || text.contains("429")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_auth() {
        let e = Error::from_status(401, None, "bad token");
        assert!(matches!(e, Error::Auth(_)));
        assert!(!e.is_recoverable());
    }

    #[test]
    fn test_from_status_payload() {
        let e = Error::from_status(413, None, "body too big");
        assert!(matches!(e, Error::PayloadTooLarge(_)));
        assert!(!e.is_recoverable());
    }

    #[test]
    fn test_from_status_throttled_with_retry_after() {
        let e = Error::from_status(429, Some(30), "");
        assert!(matches!(e, Error::Throttled { retry_after: Some(30) }));
        assert!(e.is_recoverable());
        assert!(e.is_throttled());
    }

    #[test]
    fn test_from_status_unavailable() {
        let e = Error::from_status(503, None, "");
        assert!(matches!(e, Error::Unavailable { status: 503 }));
        assert!(e.is_recoverable());
        assert!(!e.is_throttled());
    }

    #[test]
    fn test_from_status_unexpected() {
        let e = Error::from_status(404, None, "not found");
        assert!(matches!(e, Error::Server { .. }));
        assert!(!e.is_recoverable());
    }

    #[test]
    fn test_throttled_server_detail() {
        let e = Error::Server {
            error: "generation_failed".into(),
            detail: Some("Rate limit exceeded, slow down".into()),
        };
        assert!(e.is_throttled());
    }

    #[test]
    fn test_throttled_server_error_field() {
        let e = Error::Server {
            error: "too many requests".into(),
            detail: None,
        };
        assert!(e.is_throttled());
    }

    #[test]
    fn test_not_throttled_plain_server_error() {
        let e = Error::Server {
            error: "model crashed".into(),
            detail: Some("internal failure".into()),
        };
        assert!(!e.is_throttled());
        assert!(!e.is_recoverable());
    }

    #[test]
    fn test_aborted_not_recoverable() {
        assert!(!Error::Aborted.is_recoverable());
        assert!(!Error::Aborted.is_throttled());
    }
}
