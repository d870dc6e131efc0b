//! Error types for strand-client

use thiserror::Error;

/// Result type alias using strand-client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the client runtime
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] strand_wire::Error),

    /// A send was attempted while the conversation is already streaming.
    /// Rejected synchronously; sends are never queued.
    #[error("Conversation {conversation_id} is already streaming")]
    AlreadyStreaming { conversation_id: String },

    /// The feedback channel is not connected; feedback was not sent
    #[error("Feedback channel not ready")]
    ChannelNotReady,

    /// A throttled retry was requested but no preserved request exists
    #[error("No pending retry for conversation {conversation_id}")]
    NoPendingRetry { conversation_id: String },

    /// A generic client error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Check if this error is the already-streaming rejection
    pub fn is_already_streaming(&self) -> bool {
        matches!(self, Error::AlreadyStreaming { .. })
    }

    /// Check if this error was a client-side abort
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Wire(strand_wire::Error::Aborted))
    }
}
