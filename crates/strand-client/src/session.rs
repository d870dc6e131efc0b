//! Per-conversation streaming session state and the registry that
//! multiplexes it.
//!
//! Conversations are independent units of concurrency: each active
//! stream owns its own buffers and abort handle, and the registry map is
//! the only state shared across conversations. All mutation funnels
//! through `begin`/`end`; the existence check and the insert happen
//! under one lock acquisition, so two sends for the same conversation
//! can never both proceed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::retry::ThrottleState;

/// Live state of one in-progress streaming response.
#[derive(Debug)]
pub struct StreamingSession {
    conversation_id: String,
    cancel: CancellationToken,
    started_at: Instant,
    buffers: Mutex<SessionBuffers>,
}

#[derive(Debug, Default)]
struct SessionBuffers {
    content: String,
    reasoning: String,
    tool_in_progress: bool,
    throttle: ThrottleState,
}

impl StreamingSession {
    fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
            buffers: Mutex::new(SessionBuffers::default()),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The cooperative abort signal checked by the read loop
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the read loop to stop; subsequent reads return immediately
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wall-clock time since the stream began
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Append visible answer text; returns the updated snapshot
    pub fn append_content(&self, delta: &str) -> String {
        let mut buffers = self.buffers.lock();
        buffers.content.push_str(delta);
        buffers.content.clone()
    }

    /// Append reasoning text; returns the updated snapshot
    pub fn append_reasoning(&self, delta: &str) -> String {
        let mut buffers = self.buffers.lock();
        buffers.reasoning.push_str(delta);
        buffers.reasoning.clone()
    }

    /// Current visible answer snapshot
    pub fn content(&self) -> String {
        self.buffers.lock().content.clone()
    }

    /// Current reasoning snapshot
    pub fn reasoning(&self) -> String {
        self.buffers.lock().reasoning.clone()
    }

    pub fn set_tool_in_progress(&self, value: bool) {
        self.buffers.lock().tool_in_progress = value;
    }

    pub fn tool_in_progress(&self) -> bool {
        self.buffers.lock().tool_in_progress
    }

    /// Record an automatic retry attempt on the session's throttle state
    pub fn record_backoff(&self, delay: std::time::Duration) {
        self.buffers.lock().throttle.record_attempt(delay);
    }

    /// Snapshot of the throttle state, with the current partial content
    /// preserved into it.
    pub fn throttle_state(&self) -> ThrottleState {
        let buffers = self.buffers.lock();
        let mut state = buffers.throttle.clone();
        if !buffers.content.is_empty() {
            state.preserved = Some(buffers.content.clone());
        }
        state
    }
}

/// Map from conversation id to its active streaming session.
///
/// Constructor-injected everywhere it is used, never a process global,
/// so tests can instantiate isolated registries.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<StreamingSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for a conversation.
    ///
    /// Fails with [`Error::AlreadyStreaming`] if one exists; the existing
    /// session is left untouched. Check and insert are atomic under the
    /// map lock.
    pub fn begin(&self, conversation_id: &str) -> Result<Arc<StreamingSession>> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(conversation_id) {
            return Err(Error::AlreadyStreaming {
                conversation_id: conversation_id.to_string(),
            });
        }
        let session = Arc::new(StreamingSession::new(conversation_id));
        sessions.insert(conversation_id.to_string(), session.clone());
        Ok(session)
    }

    /// End a session. Idempotent: normal completion and abort both race
    /// to call this, so ending a non-existent session is a no-op.
    /// Returns whether a session was actually removed.
    pub fn end(&self, conversation_id: &str) -> bool {
        self.sessions.lock().remove(conversation_id).is_some()
    }

    /// Whether the conversation currently has an active stream
    pub fn is_streaming(&self, conversation_id: &str) -> bool {
        self.sessions.lock().contains_key(conversation_id)
    }

    /// Ids of all currently streaming conversations
    pub fn streaming_ids(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// The session for a conversation, if one is active
    pub fn get(&self, conversation_id: &str) -> Option<Arc<StreamingSession>> {
        self.sessions.lock().get(conversation_id).cloned()
    }

    /// Visible content snapshot for a streaming conversation.
    ///
    /// `None` means not streaming; an empty string means streaming with
    /// no content yet; distinguishing the two is the UI's concern.
    pub fn content_snapshot(&self, conversation_id: &str) -> Option<String> {
        self.get(conversation_id).map(|s| s.content())
    }

    /// Reasoning snapshot for a streaming conversation
    pub fn reasoning_snapshot(&self, conversation_id: &str) -> Option<String> {
        self.get(conversation_id).map(|s| s.reasoning())
    }
}
