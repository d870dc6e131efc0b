//! strand-client: Streaming conversation client runtime
//!
//! This crate turns the wire protocol in `strand-wire` into a working
//! conversation client: per-conversation session multiplexing, operation
//! processing with answer/reasoning/tool-call channel separation, abort
//! coordination, the failure taxonomy and retry policy, and the
//! out-of-band feedback channel for tools executing mid-stream.

pub mod abort;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod feedback;
pub mod processor;
pub mod reasoning;
pub mod retry;
pub mod session;
pub mod tool_call;
pub mod transport;

pub use abort::AbortCoordinator;
pub use client::ChatClient;
pub use config::ClientConfig;
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use events::ClientEvent;
pub use feedback::{DeliveryStatus, FeedbackChannel};
pub use processor::{Applied, OperationProcessor};
pub use reasoning::ReasoningExtractor;
pub use retry::{FailureKind, RetryPolicy, ThrottleState};
pub use session::{SessionRegistry, StreamingSession};
pub use tool_call::{ToolCallDirective, ToolCallExtractor, parse_directive};
pub use transport::{HttpTransport, Transport};
