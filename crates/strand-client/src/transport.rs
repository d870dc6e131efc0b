//! Transport abstraction for opening response streams
//!
//! `ChatClient` and `AbortCoordinator` depend only on the [`Transport`]
//! trait; [`HttpTransport`] is the production implementation and tests
//! substitute canned streams.

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use strand_wire::{
    Error as WireError, Result as WireResult, WireRecord, WireRequest, record_stream,
};

use crate::config::ClientConfig;

/// A stream of decoded wire records
pub type WireRecordStream = Pin<Box<dyn Stream<Item = WireResult<WireRecord>> + Send>>;

/// Opens response streams and delivers out-of-band abort notifications.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the incremental response stream for a request.
    ///
    /// Non-success statuses are classified into the wire error taxonomy
    /// before any stream is returned.
    async fn open(
        &self,
        request: &WireRequest,
        cancel: CancellationToken,
    ) -> WireResult<WireRecordStream>;

    /// Advisory server-side abort notification; the response is ignored
    /// beyond logging.
    async fn notify_abort(&self, conversation_id: &str) -> WireResult<()>;
}

/// HTTP transport over reqwest.
pub struct HttpTransport {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(
        &self,
        request: &WireRequest,
        cancel: CancellationToken,
    ) -> WireResult<WireRecordStream> {
        let url = self.config.stream_url();
        tracing::debug!("Opening stream: {}", url);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(WireError::Aborted),
            response = self.http.post(&url).json(request).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(WireError::from_status(status.as_u16(), retry_after, body));
        }

        Ok(Box::pin(record_stream(response.bytes_stream())))
    }

    async fn notify_abort(&self, conversation_id: &str) -> WireResult<()> {
        let response = self
            .http
            .post(self.config.abort_url())
            .json(&serde_json::json!({ "conversation_id": conversation_id }))
            .send()
            .await?;
        tracing::debug!(
            "Abort notified for {} (status {})",
            conversation_id,
            response.status()
        );
        Ok(())
    }
}
