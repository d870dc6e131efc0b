//! Out-of-band tool feedback channel
//!
//! A long-lived duplex WebSocket, independent of the per-request
//! streams, used to inject user-typed feedback into a tool executing
//! inside an in-progress stream. Feedback is best-effort: if the channel
//! is not ready the send fails and the tool proceeds without it.
//!
//! Delivery has three observable states, `Pending → Queued → Delivered`.
//! The delivery confirmation is a race: it can arrive on this socket or
//! inside the streaming response, and whichever lands first wins; the
//! second confirmation is a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

use crate::error::{Error, Result};
use crate::events::ClientEvent;

/// Placeholder tool id used when the executing tool's id is unknown.
pub const GENERIC_TOOL_ID: &str = "active-tool";

/// Observable delivery state of the latest feedback for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Idle,
    /// Submitted by the user
    Pending,
    /// Accepted onto the channel
    Queued,
    /// Confirmed received by the server-side consumer
    Delivered,
}

#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    conversation_id: &'a str,
    tool_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    conversation_id: String,
}

pub struct FeedbackChannel {
    url: String,
    display_window: Duration,
    statuses: Arc<Mutex<HashMap<String, DeliveryStatus>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    events: Mutex<Option<broadcast::Sender<ClientEvent>>>,
}

impl FeedbackChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_window: Duration::from_secs(3),
            statuses: Arc::new(Mutex::new(HashMap::new())),
            outbound: Mutex::new(None),
            events: Mutex::new(None),
        }
    }

    /// How long the delivered indicator stays lit before auto-reset
    pub fn with_display_window(mut self, window: Duration) -> Self {
        self.display_window = window;
        self
    }

    /// Register the client's event sender so delivery confirmations
    /// arriving on the socket reach UI subscribers.
    pub fn set_event_sink(&self, sender: broadcast::Sender<ClientEvent>) {
        *self.events.lock() = Some(sender);
    }

    /// Whether the channel can currently accept feedback
    pub fn is_ready(&self) -> bool {
        self.outbound.lock().is_some()
    }

    /// Delivery status for a conversation's latest feedback
    pub fn status(&self, conversation_id: &str) -> DeliveryStatus {
        self.statuses
            .lock()
            .get(conversation_id)
            .copied()
            .unwrap_or_default()
    }

    /// Establish the socket and spawn its write and read tasks.
    pub async fn connect(&self) -> Result<()> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Other(format!("feedback channel connect failed: {e}")))?;
        let (mut write, mut read) = socket.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock() = Some(tx);

        // Write task. send() only queues the frame; flush() puts it on
        // the wire.
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if write.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
                if write.flush().await.is_err() {
                    break;
                }
            }
        });

        // Read task: acks may arrive here or inside the response stream.
        let statuses = Arc::clone(&self.statuses);
        let events = self.events.lock().clone();
        let display_window = self.display_window;
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<InboundFrame>(&text) {
                            Ok(inbound) if inbound.kind == "feedback_ack" => {
                                deliver(
                                    &statuses,
                                    events.as_ref(),
                                    &inbound.conversation_id,
                                    display_window,
                                );
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!("Unparseable feedback frame: {}", e);
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            tracing::debug!("Feedback channel read task ended");
        });

        Ok(())
    }

    /// Send user feedback to the tool executing in `conversation_id`'s
    /// active stream.
    ///
    /// Fails with [`Error::ChannelNotReady`] when the channel is down.
    /// Feedback is never required for tool completion, so the caller
    /// surfaces the failure and moves on.
    pub fn send_feedback(
        &self,
        conversation_id: &str,
        tool_id: Option<&str>,
        text: &str,
    ) -> Result<()> {
        self.set_status(conversation_id, DeliveryStatus::Pending);

        let frame = serde_json::to_string(&OutboundFrame {
            conversation_id,
            tool_id: tool_id.unwrap_or(GENERIC_TOOL_ID),
            text,
        })
        .map_err(|e| Error::Other(e.to_string()))?;

        let accepted = match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        };

        if accepted {
            self.set_status(conversation_id, DeliveryStatus::Queued);
            Ok(())
        } else {
            self.set_status(conversation_id, DeliveryStatus::Idle);
            Err(Error::ChannelNotReady)
        }
    }

    /// Record a delivery confirmation for a conversation, from either
    /// confirmation source. Returns whether this call performed the
    /// transition (the losing side of the race gets `false`).
    pub fn mark_delivered(&self, conversation_id: &str) -> bool {
        deliver(
            &self.statuses,
            self.events.lock().as_ref(),
            conversation_id,
            self.display_window,
        )
    }

    fn set_status(&self, conversation_id: &str, status: DeliveryStatus) {
        self.statuses
            .lock()
            .insert(conversation_id.to_string(), status);
    }
}

/// Shared delivery transition used by both confirmation paths.
fn deliver(
    statuses: &Arc<Mutex<HashMap<String, DeliveryStatus>>>,
    events: Option<&broadcast::Sender<ClientEvent>>,
    conversation_id: &str,
    display_window: Duration,
) -> bool {
    {
        let mut statuses = statuses.lock();
        match statuses.get(conversation_id) {
            Some(DeliveryStatus::Pending) | Some(DeliveryStatus::Queued) => {
                statuses.insert(conversation_id.to_string(), DeliveryStatus::Delivered);
            }
            _ => return false,
        }
    }

    if let Some(events) = events {
        let _ = events.send(ClientEvent::FeedbackDelivered {
            conversation_id: conversation_id.to_string(),
        });
    }

    // Auto-reset the indicator after the display window.
    let statuses = Arc::clone(statuses);
    let conversation_id = conversation_id.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(display_window).await;
        let mut statuses = statuses.lock();
        if statuses.get(&conversation_id) == Some(&DeliveryStatus::Delivered) {
            statuses.insert(conversation_id, DeliveryStatus::Idle);
        }
    });

    true
}
