//! strand-wire: Wire protocol layer for the strand conversation client
//!
//! This crate owns the protocol surface shared between the client runtime
//! and the server: the conversation message model, request composition,
//! the patch-operation stream format, and the incremental stream decoder.
//! It performs no session bookkeeping and no retry policy; that lives in
//! `strand-client`.

pub mod decode;
pub mod error;
pub mod ops;
pub mod request;
pub mod types;

pub use decode::{EventParser, Utf8Decoder, record_stream};
pub use error::{Error, Result};
pub use ops::{Operation, WireRecord};
pub use request::{ContextSelection, WireRequest, build_request};
pub use types::*;
