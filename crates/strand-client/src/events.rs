//! Client event types

use serde::{Deserialize, Serialize};
use strand_wire::types::Message;

use crate::retry::ThrottleState;
use crate::tool_call::ToolCallDirective;

/// Events emitted while conversations stream, consumed reactively by the
/// UI layer. Every visible-text append produces a `ContentUpdate`;
/// streaming is meant to feel live, not arrive at end-of-stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A streaming session began for this conversation
    StreamStarted { conversation_id: String },

    /// The accumulated visible answer changed
    ContentUpdate {
        conversation_id: String,
        content: String,
    },

    /// The accumulated reasoning buffer changed
    ReasoningUpdate {
        conversation_id: String,
        reasoning: String,
    },

    /// A complete tool-call directive was parsed out of the stream
    ToolCallReady {
        conversation_id: String,
        directive: ToolCallDirective,
    },

    /// The stream finished and the assistant message is final
    StreamEnded {
        conversation_id: String,
        message: Message,
    },

    /// The stream hit a rate limit; partial content is preserved for retry
    Throttled {
        conversation_id: String,
        state: ThrottleState,
    },

    /// Tool feedback was confirmed delivered
    FeedbackDelivered { conversation_id: String },

    /// The stream failed
    Error {
        conversation_id: String,
        message: String,
    },
}

impl ClientEvent {
    /// Check if this event ends the conversation's stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClientEvent::StreamEnded { .. }
                | ClientEvent::Throttled { .. }
                | ClientEvent::Error { .. }
        )
    }

    /// The conversation this event belongs to
    pub fn conversation_id(&self) -> &str {
        match self {
            ClientEvent::StreamStarted { conversation_id }
            | ClientEvent::ContentUpdate { conversation_id, .. }
            | ClientEvent::ReasoningUpdate { conversation_id, .. }
            | ClientEvent::ToolCallReady { conversation_id, .. }
            | ClientEvent::StreamEnded { conversation_id, .. }
            | ClientEvent::Throttled { conversation_id, .. }
            | ClientEvent::FeedbackDelivered { conversation_id }
            | ClientEvent::Error { conversation_id, .. } => conversation_id,
        }
    }
}
