//! The chat client orchestrator
//!
//! Ties one `send` call to a finished assistant message: begin the
//! session, compose the request, open the stream (classifying and
//! auto-retrying failures where the policy allows), drive decoded
//! records through the operation processor under the session's cancel
//! token, and settle the turn as complete, incomplete-on-abort, or
//! preserved-for-retry on throttling. Every path ends the session; a
//! failure never leaves an orphaned streaming indicator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use strand_wire::types::Message;
use strand_wire::{ContextSelection, Error as WireError, WireRecord, WireRequest, build_request};

use crate::abort::AbortCoordinator;
use crate::config::ClientConfig;
use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::events::ClientEvent;
use crate::feedback::FeedbackChannel;
use crate::processor::{Applied, OperationProcessor};
use crate::retry::{FailureKind, PARTIAL_NOTE, RetryPolicy, ThrottleState, classify};
use crate::session::{SessionRegistry, StreamingSession};
use crate::transport::{HttpTransport, Transport, WireRecordStream};

/// A request preserved across a throttled failure for user-initiated
/// retry.
struct PendingRetry {
    request: WireRequest,
    question: String,
    state: ThrottleState,
}

pub struct ChatClient {
    config: ClientConfig,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    registry: Arc<SessionRegistry>,
    aborter: AbortCoordinator,
    feedback: Option<Arc<FeedbackChannel>>,
    event_tx: broadcast::Sender<ClientEvent>,
    pending_retries: Mutex<HashMap<String, PendingRetry>>,
}

impl ChatClient {
    /// Create a client over HTTP
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.clone()));
        Self::with_transport(config, transport)
    }

    /// Create a client over a custom transport (tests inject mocks here)
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let (event_tx, _) = broadcast::channel(256);
        Self {
            policy: RetryPolicy {
                unavailable_delay: config.unavailable_retry_delay,
                max_auto_retries: config.max_auto_retries,
            },
            aborter: AbortCoordinator::new(registry.clone(), transport.clone()),
            config,
            transport,
            registry,
            feedback: None,
            event_tx,
            pending_retries: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the feedback channel; its socket-side delivery
    /// confirmations will reach this client's event subscribers.
    pub fn attach_feedback(&mut self, channel: Arc<FeedbackChannel>) {
        channel.set_event_sink(self.event_tx.clone());
        self.feedback = Some(channel);
    }

    /// Subscribe to client events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// The session registry (shared with the UI for status queries)
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Abort a conversation's active stream
    pub fn abort(&self, conversation_id: &str) {
        self.aborter.abort(conversation_id);
    }

    /// Throttle state preserved for a conversation, if its last turn was
    /// rate limited. The host offers countdown-then-retry (via
    /// [`ThrottleState::suggested_wait`]) or immediate retry.
    pub fn throttle_state(&self, conversation_id: &str) -> Option<ThrottleState> {
        self.pending_retries
            .lock()
            .get(conversation_id)
            .map(|p| p.state.clone())
    }

    /// Send a question and stream the answer into the conversation.
    ///
    /// Rejects synchronously with [`Error::AlreadyStreaming`] if the
    /// conversation has an active stream; sends are never queued.
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        question: &str,
        context: &ContextSelection,
    ) -> Result<Message> {
        let session = self.registry.begin(&conversation.id)?;
        conversation.push(Message::human(question).with_images(context.images.clone()));
        let request = build_request(&conversation.messages, question, context);

        let _ = self.event_tx.send(ClientEvent::StreamStarted {
            conversation_id: conversation.id.clone(),
        });

        let result = self
            .run_turn(&conversation.id, &session, request, question)
            .await;
        self.settle_turn(conversation, &session, result)
    }

    /// Retry a throttled turn, resending the preserved original request.
    ///
    /// When partial content was produced before the limit hit, history
    /// is extended with it (marked with [`PARTIAL_NOTE`]) so the model
    /// can continue rather than restart.
    pub async fn retry_throttled(&self, conversation: &mut Conversation) -> Result<Message> {
        let pending = self
            .pending_retries
            .lock()
            .remove(&conversation.id)
            .ok_or_else(|| Error::NoPendingRetry {
                conversation_id: conversation.id.clone(),
            })?;

        let mut request = pending.request;
        if let Some(partial) = &pending.state.preserved {
            request.extend_history(
                pending.question.clone(),
                format!("{}\n{}", PARTIAL_NOTE, partial),
            );
        }

        let session = self.registry.begin(&conversation.id)?;
        let _ = self.event_tx.send(ClientEvent::StreamStarted {
            conversation_id: conversation.id.clone(),
        });

        let result = self
            .run_turn(&conversation.id, &session, request, &pending.question)
            .await;
        self.settle_turn(conversation, &session, result)
    }

    // ---- Turn lifecycle ----

    /// Open the stream (with the policy's automatic retries) and drive
    /// it to completion.
    async fn run_turn(
        &self,
        conversation_id: &str,
        session: &Arc<StreamingSession>,
        request: WireRequest,
        question: &str,
    ) -> Result<Message> {
        let cancel = session.cancel_token();
        let mut attempts = 0u32;

        let outcome = loop {
            if cancel.is_cancelled() {
                break Err(WireError::Aborted);
            }

            match self.transport.open(&request, cancel.clone()).await {
                Ok(stream) => break self.drive(conversation_id, session, stream, &cancel).await,
                Err(e) => {
                    let kind = classify(&e);
                    if let Some(delay) = self.policy.auto_retry_delay(kind, attempts) {
                        attempts += 1;
                        session.record_backoff(delay);
                        tracing::warn!(
                            "Stream open failed for {} ({}); retrying in {:?}",
                            conversation_id,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    break Err(e);
                }
            }
        };

        match outcome {
            Ok(()) => Ok(Message::assistant(session.content())),
            Err(e) => self.handle_failure(conversation_id, session, request, question, e),
        }
    }

    /// Read records until the stream ends, a fatal condition appears, or
    /// the session is aborted, whichever comes first. Chunks buffered
    /// but unprocessed at the moment of abort are discarded.
    async fn drive(
        &self,
        conversation_id: &str,
        session: &Arc<StreamingSession>,
        mut stream: WireRecordStream,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), WireError> {
        let mut processor = OperationProcessor::new(&self.config.answer_path);
        let mut warned_slow = false;

        loop {
            let record = tokio::select! {
                _ = cancel.cancelled() => return Err(WireError::Aborted),
                record = stream.next() => record,
            };

            let Some(record) = record else {
                self.publish(conversation_id, session, processor.finish());
                return Ok(());
            };

            match record {
                Ok(WireRecord::Ops(ops)) => {
                    let applied = processor.apply(&ops);
                    self.publish(conversation_id, session, applied);
                }
                Ok(WireRecord::FeedbackAck {
                    conversation_id: ack_id,
                }) => {
                    if let Some(feedback) = &self.feedback {
                        feedback.mark_delivered(&ack_id);
                    }
                }
                Ok(WireRecord::Error { error, detail }) => {
                    return Err(WireError::Server { error, detail });
                }
                Ok(WireRecord::Other) => {}
                Err(e) => return Err(e),
            }

            if !warned_slow && session.elapsed() > self.config.slow_stream_warning {
                warned_slow = true;
                tracing::warn!(
                    "Stream for {} still running after {:?}",
                    conversation_id,
                    session.elapsed()
                );
            }
        }
    }

    /// Push one batch's deltas into the session buffers and publish them.
    fn publish(&self, conversation_id: &str, session: &StreamingSession, applied: Applied) {
        if !applied.visible.is_empty() {
            let content = session.append_content(&applied.visible);
            let _ = self.event_tx.send(ClientEvent::ContentUpdate {
                conversation_id: conversation_id.to_string(),
                content,
            });
        }
        if !applied.reasoning.is_empty() {
            let reasoning = session.append_reasoning(&applied.reasoning);
            let _ = self.event_tx.send(ClientEvent::ReasoningUpdate {
                conversation_id: conversation_id.to_string(),
                reasoning,
            });
        }
        for directive in applied.directives {
            session.set_tool_in_progress(true);
            let _ = self.event_tx.send(ClientEvent::ToolCallReady {
                conversation_id: conversation_id.to_string(),
                directive,
            });
        }
    }

    /// Apply the failure taxonomy to a terminal error.
    fn handle_failure(
        &self,
        conversation_id: &str,
        session: &StreamingSession,
        request: WireRequest,
        question: &str,
        error: WireError,
    ) -> Result<Message> {
        let kind = classify(&error);
        match kind {
            FailureKind::Aborted => {}
            FailureKind::Throttled => {
                let mut state = session.throttle_state();
                if let WireError::Throttled {
                    retry_after: Some(secs),
                } = &error
                {
                    state.delays.push(Duration::from_secs(*secs));
                }
                state.exhaust_auto();
                self.pending_retries.lock().insert(
                    conversation_id.to_string(),
                    PendingRetry {
                        request,
                        question: question.to_string(),
                        state: state.clone(),
                    },
                );
                let _ = self.event_tx.send(ClientEvent::Throttled {
                    conversation_id: conversation_id.to_string(),
                    state,
                });
            }
            FailureKind::Server | FailureKind::ConnectionLost => {
                // Fatal for this stream: full abort semantics, including
                // the advisory server notification.
                self.aborter.abort(conversation_id);
                let _ = self.event_tx.send(ClientEvent::Error {
                    conversation_id: conversation_id.to_string(),
                    message: format!("{} {}", kind.user_notice(), error),
                });
            }
            FailureKind::Auth | FailureKind::PayloadTooLarge | FailureKind::Unavailable => {
                let _ = self.event_tx.send(ClientEvent::Error {
                    conversation_id: conversation_id.to_string(),
                    message: format!("{} {}", kind.user_notice(), error),
                });
            }
        }
        Err(error.into())
    }

    /// Finalize the turn and release the session, on every path.
    fn settle_turn(
        &self,
        conversation: &mut Conversation,
        session: &StreamingSession,
        result: Result<Message>,
    ) -> Result<Message> {
        let conversation_id = conversation.id.clone();

        let outcome = match result {
            Ok(message) => {
                conversation.push(message.clone());
                let _ = self.event_tx.send(ClientEvent::StreamEnded {
                    conversation_id: conversation_id.clone(),
                    message: message.clone(),
                });
                Ok(message)
            }
            Err(error) => {
                if error.is_aborted() {
                    // An aborted turn is never silently finalized: its
                    // partial answer is either dropped or kept marked
                    // incomplete.
                    let partial = session.content();
                    if !partial.is_empty() {
                        conversation.push(Message::assistant(partial).mark_incomplete());
                    }
                }
                Err(error)
            }
        };

        self.registry.end(&conversation_id);
        outcome
    }
}
