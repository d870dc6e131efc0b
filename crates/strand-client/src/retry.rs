//! Failure classification and retry policy
//!
//! Every terminal failure is classified into a [`FailureKind`] that
//! decides the recovery path: auto-retried once, preserved for a
//! user-initiated retry, or fatal. Automatic retries are attempted at
//! most once per failure class; anything beyond that is handed to the
//! user as an explicit action, never silently looped.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use strand_wire::Error as WireError;

/// Marker line prepended to preserved partial content when it is folded
/// into history on a throttled retry.
pub const PARTIAL_NOTE: &str = "[partial answer before interruption]";

/// Failure taxonomy for a streaming turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 401; never retried since retrying identically cannot succeed
    Auth,
    /// HTTP 413; never retried. Fewer context files are needed
    PayloadTooLarge,
    /// HTTP 429 or an equivalent throttle signal; user-driven retry with
    /// preserved partial content
    Throttled,
    /// HTTP 5xx; one automatic retry after a short fixed delay
    Unavailable,
    /// Connection dropped; retry is at the user's discretion
    ConnectionLost,
    /// Explicit server error event, or an unrecoverable protocol fault
    Server,
    /// Client-side abort; not a failure to recover from
    Aborted,
}

impl FailureKind {
    /// The dedicated user-facing notice for this failure class
    pub fn user_notice(&self) -> &'static str {
        match self {
            FailureKind::Auth => "Your credentials were rejected. Sign in again to continue.",
            FailureKind::PayloadTooLarge => {
                "The request was too large. Reduce the selected files and try again."
            }
            FailureKind::Throttled => "The server is rate limiting requests.",
            FailureKind::Unavailable => "The server is temporarily unavailable.",
            FailureKind::ConnectionLost => "Connection lost while streaming.",
            FailureKind::Server => "The server reported an error.",
            FailureKind::Aborted => "Generation stopped.",
        }
    }
}

/// Compiled patterns recognizing a rate-limit signal in server-reported
/// error text, across the shapes different backends emit.
static THROTTLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)rate.?limit",
        r"(?i)too.?many.?requests",
        r"(?i)throttl",
        r"(?i)quota.?exceed",
        r"(?i)overloaded",
        r"\b429\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Check if server-reported error text is a throttle signal
pub fn is_throttle_signal(text: &str) -> bool {
    THROTTLE_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Classify a wire error into its failure kind.
pub fn classify(error: &WireError) -> FailureKind {
    match error {
        WireError::Auth(_) => FailureKind::Auth,
        WireError::PayloadTooLarge(_) => FailureKind::PayloadTooLarge,
        WireError::Throttled { .. } => FailureKind::Throttled,
        WireError::Unavailable { .. } => FailureKind::Unavailable,
        WireError::ConnectionLost(_) | WireError::Http(_) => FailureKind::ConnectionLost,
        WireError::Aborted => FailureKind::Aborted,
        WireError::Server { error, detail } => {
            let text = match detail {
                Some(d) => format!("{} {}", error, d),
                None => error.clone(),
            };
            if is_throttle_signal(&text) {
                FailureKind::Throttled
            } else {
                FailureKind::Server
            }
        }
        WireError::Json(_) | WireError::EventOverflow(_) => FailureKind::Server,
    }
}

/// Decides which failures are retried automatically and when.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed delay before the automatic retry on server unavailability
    pub unavailable_delay: Duration,
    /// Automatic retries allowed per failure class
    pub max_auto_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            unavailable_delay: Duration::from_secs(2),
            max_auto_retries: 1,
        }
    }
}

impl RetryPolicy {
    /// Delay before an automatic retry, or `None` if this failure (or
    /// this attempt count) is not auto-retried.
    pub fn auto_retry_delay(&self, kind: FailureKind, attempts_so_far: u32) -> Option<Duration> {
        match kind {
            FailureKind::Unavailable if attempts_so_far < self.max_auto_retries => {
                Some(self.unavailable_delay)
            }
            _ => None,
        }
    }
}

/// State carried across a rate-limited turn so the user can retry
/// without re-typing anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottleState {
    /// Attempts made so far (including automatic ones)
    pub attempts: u32,
    /// Backoff delays already waited, oldest first; surfaced to the user
    pub delays: Vec<Duration>,
    /// Automatic retries are used up
    pub auto_exhausted: bool,
    /// The user may still retry manually
    pub can_retry: bool,
    /// Partial content produced before the failure, so a retry can
    /// continue rather than restart
    pub preserved: Option<String>,
}

impl ThrottleState {
    /// Record one retry attempt and the delay waited before it
    pub fn record_attempt(&mut self, delay: Duration) {
        self.attempts += 1;
        self.delays.push(delay);
    }

    /// Mark automatic retries exhausted; manual retry stays available
    pub fn exhaust_auto(&mut self) {
        self.auto_exhausted = true;
        self.can_retry = true;
    }

    /// The server-suggested wait before the next manual retry, if any
    pub fn suggested_wait(&self) -> Option<Duration> {
        self.delays.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_errors() {
        assert_eq!(classify(&WireError::Auth("no".into())), FailureKind::Auth);
        assert_eq!(
            classify(&WireError::PayloadTooLarge("big".into())),
            FailureKind::PayloadTooLarge
        );
        assert_eq!(
            classify(&WireError::Throttled { retry_after: None }),
            FailureKind::Throttled
        );
        assert_eq!(
            classify(&WireError::Unavailable { status: 503 }),
            FailureKind::Unavailable
        );
        assert_eq!(
            classify(&WireError::ConnectionLost("reset".into())),
            FailureKind::ConnectionLost
        );
        assert_eq!(classify(&WireError::Aborted), FailureKind::Aborted);
    }

    #[test]
    fn test_classify_server_error_with_throttle_signal() {
        let error = WireError::Server {
            error: "generation_failed".into(),
            detail: Some("Too many requests, please slow down".into()),
        };
        assert_eq!(classify(&error), FailureKind::Throttled);
    }

    #[test]
    fn test_classify_plain_server_error() {
        let error = WireError::Server {
            error: "model_crashed".into(),
            detail: None,
        };
        assert_eq!(classify(&error), FailureKind::Server);
    }

    #[test]
    fn test_throttle_signal_patterns() {
        assert!(is_throttle_signal("Rate limit exceeded"));
        assert!(is_throttle_signal("rate_limit_error"));
        assert!(is_throttle_signal("too many requests"));
        assert!(is_throttle_signal("request throttled by upstream"));
        assert!(is_throttle_signal("HTTP 429 returned"));
        assert!(is_throttle_signal("quota exceeded for project"));
        assert!(is_throttle_signal("server overloaded"));
    }

    #[test]
    fn test_throttle_signal_negative() {
        assert!(!is_throttle_signal("context window exceeded"));
        assert!(!is_throttle_signal("invalid api key"));
        // "429" embedded in an id must not match
        assert!(!is_throttle_signal("request id 84291 failed"));
    }

    #[test]
    fn test_auto_retry_only_for_unavailable_and_only_once() {
        let policy = RetryPolicy::default();
        assert!(policy.auto_retry_delay(FailureKind::Unavailable, 0).is_some());
        assert!(policy.auto_retry_delay(FailureKind::Unavailable, 1).is_none());
        assert!(policy.auto_retry_delay(FailureKind::Throttled, 0).is_none());
        assert!(policy.auto_retry_delay(FailureKind::ConnectionLost, 0).is_none());
        assert!(policy.auto_retry_delay(FailureKind::Auth, 0).is_none());
        assert!(policy.auto_retry_delay(FailureKind::PayloadTooLarge, 0).is_none());
    }

    #[test]
    fn test_throttle_state_bookkeeping() {
        let mut state = ThrottleState::default();
        assert_eq!(state.attempts, 0);
        assert!(state.suggested_wait().is_none());

        state.record_attempt(Duration::from_secs(2));
        state.record_attempt(Duration::from_secs(30));
        state.exhaust_auto();

        assert_eq!(state.attempts, 2);
        assert_eq!(state.delays.len(), 2);
        assert!(state.auto_exhausted);
        assert!(state.can_retry);
        assert_eq!(state.suggested_wait(), Some(Duration::from_secs(30)));
    }
}
