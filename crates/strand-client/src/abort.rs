//! Abort coordination
//!
//! Turns a user stop action or a detected fatal condition into three
//! steps: cancel the session's read loop, notify the server out-of-band
//! on a best-effort basis, and release the session. Safe to call twice,
//! or after the stream already completed.

use std::sync::Arc;

use crate::session::SessionRegistry;
use crate::transport::Transport;

#[derive(Clone)]
pub struct AbortCoordinator {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn Transport>,
}

impl AbortCoordinator {
    pub fn new(registry: Arc<SessionRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Abort the conversation's active stream, if any.
    ///
    /// The server notification is fire-and-forget: it is advisory only,
    /// and its failure is logged, never raised.
    pub fn abort(&self, conversation_id: &str) {
        if let Some(session) = self.registry.get(conversation_id) {
            session.cancel();
        }

        let transport = Arc::clone(&self.transport);
        let id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = transport.notify_abort(&id).await {
                tracing::debug!("Abort notification failed for {}: {}", id, e);
            }
        });

        self.registry.end(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use strand_wire::{Error as WireError, Result as WireResult, WireRequest};
    use tokio_util::sync::CancellationToken;

    struct RecordingTransport {
        aborts: Mutex<Vec<String>>,
        fail_notify: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn open(
            &self,
            _request: &WireRequest,
            _cancel: CancellationToken,
        ) -> WireResult<crate::transport::WireRecordStream> {
            Err(WireError::Aborted)
        }

        async fn notify_abort(&self, conversation_id: &str) -> WireResult<()> {
            self.aborts.lock().push(conversation_id.to_string());
            if self.fail_notify {
                Err(WireError::ConnectionLost("abort endpoint down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn coordinator(fail_notify: bool) -> (AbortCoordinator, Arc<SessionRegistry>, Arc<RecordingTransport>) {
        let registry = Arc::new(SessionRegistry::new());
        let transport = Arc::new(RecordingTransport {
            aborts: Mutex::new(vec![]),
            fail_notify,
        });
        (
            AbortCoordinator::new(registry.clone(), transport.clone()),
            registry,
            transport,
        )
    }

    #[tokio::test]
    async fn test_abort_cancels_and_releases() {
        let (coordinator, registry, transport) = coordinator(false);
        let session = registry.begin("c-1").unwrap();

        coordinator.abort("c-1");
        assert!(session.is_cancelled(), "read loop must be signalled");
        assert!(!registry.is_streaming("c-1"), "session must be released");

        tokio::task::yield_now().await;
        assert_eq!(*transport.aborts.lock(), vec!["c-1"]);
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let (coordinator, registry, _transport) = coordinator(false);
        registry.begin("c-1").unwrap();

        coordinator.abort("c-1");
        coordinator.abort("c-1");
        assert!(!registry.is_streaming("c-1"));
    }

    #[tokio::test]
    async fn test_abort_after_completion_is_noop() {
        let (coordinator, registry, _transport) = coordinator(false);
        registry.begin("c-1").unwrap();
        registry.end("c-1");

        coordinator.abort("c-1");
        assert!(!registry.is_streaming("c-1"));
    }

    #[tokio::test]
    async fn test_notify_failure_never_raises() {
        let (coordinator, registry, transport) = coordinator(true);
        registry.begin("c-1").unwrap();

        coordinator.abort("c-1");
        tokio::task::yield_now().await;
        assert_eq!(transport.aborts.lock().len(), 1);
        assert!(!registry.is_streaming("c-1"));
    }
}
