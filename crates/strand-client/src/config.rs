//! Client configuration

use std::time::Duration;

use strand_wire::ops::ANSWER_PATH;

/// Configuration for a [`crate::ChatClient`].
///
/// Constructor-injected; the host application decides where values come
/// from (environment, config file, hard-coded defaults).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://127.0.0.1:8432`
    pub base_url: String,
    /// Path of the streaming chat endpoint
    pub stream_path: String,
    /// Path of the fire-and-forget abort endpoint
    pub abort_path: String,
    /// WebSocket URL of the feedback channel
    pub feedback_url: String,
    /// Patch path whose `add` operations carry the streamed answer
    pub answer_path: String,
    /// Fixed delay before the single automatic retry on 5xx
    pub unavailable_retry_delay: Duration,
    /// Automatic retries allowed per failure class
    pub max_auto_retries: u32,
    /// Wall-clock threshold after which a slow stream logs an advisory
    pub slow_stream_warning: Duration,
    /// How long the delivered-feedback indicator stays lit
    pub feedback_display_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8432".to_string(),
            stream_path: "/chat/stream".to_string(),
            abort_path: "/chat/abort".to_string(),
            feedback_url: "ws://127.0.0.1:8432/chat/feedback".to_string(),
            answer_path: ANSWER_PATH.to_string(),
            unavailable_retry_delay: Duration::from_secs(2),
            max_auto_retries: 1,
            slow_stream_warning: Duration::from_secs(120),
            feedback_display_window: Duration::from_secs(3),
        }
    }
}

impl ClientConfig {
    /// Set the server base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the feedback channel URL
    pub fn with_feedback_url(mut self, url: impl Into<String>) -> Self {
        self.feedback_url = url.into();
        self
    }

    /// Set the streamed-answer patch path
    pub fn with_answer_path(mut self, path: impl Into<String>) -> Self {
        self.answer_path = path.into();
        self
    }

    /// Set the fixed delay used for the automatic 5xx retry
    pub fn with_unavailable_retry_delay(mut self, delay: Duration) -> Self {
        self.unavailable_retry_delay = delay;
        self
    }

    /// Full URL of the streaming endpoint
    pub fn stream_url(&self) -> String {
        format!("{}{}", self.base_url, self.stream_path)
    }

    /// Full URL of the abort endpoint
    pub fn abort_url(&self) -> String {
        format!("{}{}", self.base_url, self.abort_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_join_base_and_path() {
        let config = ClientConfig::default().with_base_url("http://host:1");
        assert_eq!(config.stream_url(), "http://host:1/chat/stream");
        assert_eq!(config.abort_url(), "http://host:1/chat/abort");
    }

    #[test]
    fn test_default_answer_path_matches_wire() {
        assert_eq!(ClientConfig::default().answer_path, ANSWER_PATH);
    }
}
