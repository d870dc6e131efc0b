//! Incremental stream decoding: bytes → text → events → records
//!
//! The response body arrives as raw byte chunks. Three layers turn those
//! into [`WireRecord`]s: [`Utf8Decoder`] reassembles text across chunk
//! boundaries, [`EventParser`] finds event boundaries in the decoded
//! text, and [`record_stream`] adapts the whole pipeline onto a byte
//! stream, swallowing malformed events and stopping at the first fatal
//! one.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{Error, Result};
use crate::ops::WireRecord;

/// Cap on buffered event text; a delimiter-less upstream must not be
/// able to grow the buffer without bound.
const MAX_EVENT_BUFFER: usize = 1024 * 1024;

/// Incremental UTF-8 decoder.
///
/// A multi-byte sequence split across chunk boundaries is held back until
/// its continuation bytes arrive; a genuinely invalid byte becomes
/// U+FFFD and decoding continues.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all complete text it unlocks.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        let mut offset = 0;

        loop {
            let rest = &self.pending[offset..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    offset = self.pending.len();
                    break;
                }
                Err(e) => {
                    out.push_str(&String::from_utf8_lossy(&rest[..e.valid_up_to()]));
                    match e.error_len() {
                        // Incomplete trailing sequence: hold it for the
                        // next chunk.
                        None => {
                            offset += e.valid_up_to();
                            break;
                        }
                        // Invalid bytes: replace and keep going.
                        Some(len) => {
                            out.push('\u{FFFD}');
                            offset += e.valid_up_to() + len;
                        }
                    }
                }
            }
        }

        self.pending.drain(..offset);
        out
    }

    /// Flush whatever is still held back (stream ended mid-sequence).
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        if tail.is_empty() {
            String::new()
        } else {
            String::from_utf8_lossy(&tail).into_owned()
        }
    }
}

/// Event-boundary parser over decoded text.
///
/// Understands both framings the protocol allows: SSE frames (`data:`
/// lines terminated by a blank line) and bare newline-delimited JSON
/// records. Emits complete event payload strings.
#[derive(Debug, Default)]
pub struct EventParser {
    line_buf: String,
    data_lines: Vec<String>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text; returns the event payloads it completed.
    pub fn push(&mut self, text: &str) -> Result<Vec<String>> {
        self.line_buf.push_str(text);
        if self.line_buf.len() > MAX_EVENT_BUFFER {
            return Err(Error::EventOverflow(MAX_EVENT_BUFFER));
        }

        let mut events = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            self.take_line(line.trim_end_matches(['\n', '\r']), &mut events);
        }
        Ok(events)
    }

    /// Flush a final event that ended without its delimiter.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        let tail = std::mem::take(&mut self.line_buf);
        let line = tail.trim_end_matches('\r');
        if !line.is_empty() {
            self.take_line(line, &mut events);
        }
        if !self.data_lines.is_empty() {
            events.push(self.data_lines.join("\n"));
            self.data_lines.clear();
        }
        events
    }

    fn take_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            // Blank line closes an SSE frame.
            if !self.data_lines.is_empty() {
                events.push(self.data_lines.join("\n"));
                self.data_lines.clear();
            }
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data_lines.push(data.trim_start().to_string());
        } else if line.starts_with("event:") || line.starts_with("id:") || line.starts_with(':') {
            // SSE metadata and comments; the payload itself is typed.
        } else if self.data_lines.is_empty() && line.starts_with('{') {
            // Bare newline-delimited JSON record.
            events.push(line.to_string());
        }
        // Anything else is inter-event noise.
    }
}

/// Adapt a response byte stream into a stream of [`WireRecord`]s.
///
/// Malformed JSON in a single event is warn-logged and skipped so one bad
/// event does not abort an otherwise healthy stream. An explicit error
/// record is yielded and terminates the stream. A transport error from
/// the byte stream surfaces as [`Error::ConnectionLost`].
pub fn record_stream<S, E>(source: S) -> impl Stream<Item = Result<WireRecord>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut source = std::pin::pin!(source);
        let mut decoder = Utf8Decoder::new();
        let mut parser = EventParser::new();

        while let Some(chunk) = source.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::ConnectionLost(e.to_string()));
                    return;
                }
            };

            let text = decoder.decode(&chunk);
            let payloads = match parser.push(&text) {
                Ok(payloads) => payloads,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for payload in payloads {
                match WireRecord::parse(&payload) {
                    Ok(WireRecord::Other) => {}
                    Ok(record) => {
                        let terminal = record.is_terminal();
                        yield Ok(record);
                        if terminal {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Skipping malformed stream event: {}", e);
                    }
                }
            }
        }

        // Stream ended; flush anything still buffered.
        let tail = decoder.finish();
        let mut payloads = match parser.push(&tail) {
            Ok(payloads) => payloads,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        payloads.extend(parser.finish());

        for payload in payloads {
            match WireRecord::parse(&payload) {
                Ok(WireRecord::Other) => {}
                Ok(record) => {
                    let terminal = record.is_terminal();
                    yield Ok(record);
                    if terminal {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed stream event: {}", e);
                }
            }
        }
    }
}
