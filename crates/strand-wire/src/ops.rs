//! Patch-operation wire format
//!
//! The response stream carries JSON records shaped `{"ops": [...]}` where
//! each op is an additive patch instruction `{op, path, value}`. Only
//! `add` operations on the streamed-answer path contribute visible text;
//! everything else is bookkeeping the client ignores.

use serde::{Deserialize, Serialize};

/// The path whose `add` operations carry the streamed answer text.
pub const ANSWER_PATH: &str = "/streamed_output_str/-";

/// A single patch instruction from the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub op: String,
    pub path: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Operation {
    /// Create an `add` operation (test/fixture helper)
    pub fn add(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op: "add".to_string(),
            path: path.into(),
            value: serde_json::Value::String(value.into()),
        }
    }

    /// The answer text this operation appends, if it is an `add` on the
    /// given answer path with a string value. Anything else is `None`.
    pub fn answer_text(&self, answer_path: &str) -> Option<&str> {
        if self.op != "add" || self.path != answer_path {
            return None;
        }
        self.value.as_str()
    }
}

/// One decoded record from the response stream.
#[derive(Debug, Clone)]
pub enum WireRecord {
    /// A batch of patch operations, to be applied strictly in order
    Ops(Vec<Operation>),
    /// Explicit error event; terminal for the stream
    Error {
        error: String,
        detail: Option<String>,
    },
    /// Delivery confirmation for in-flight tool feedback
    FeedbackAck { conversation_id: String },
    /// A record the client does not understand; ignored
    Other,
}

/// Raw serde view over a stream record; dispatched into [`WireRecord`].
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    ops: Option<Vec<Operation>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    ack: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

impl WireRecord {
    /// Parse one event payload into a record.
    ///
    /// Returns `Err` only for malformed JSON; an unrecognized but
    /// well-formed record comes back as [`WireRecord::Other`].
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        let raw: RawRecord = serde_json::from_str(payload)?;
        if let Some(error) = raw.error {
            return Ok(WireRecord::Error {
                error,
                detail: raw.detail,
            });
        }
        if let Some(ops) = raw.ops {
            return Ok(WireRecord::Ops(ops));
        }
        if raw.ack.as_deref() == Some("feedback") {
            if let Some(conversation_id) = raw.conversation_id {
                return Ok(WireRecord::FeedbackAck { conversation_id });
            }
        }
        Ok(WireRecord::Other)
    }

    /// Check if this record terminates the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireRecord::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ops_record() {
        let rec = WireRecord::parse(
            r#"{"ops":[{"op":"add","path":"/streamed_output_str/-","value":"Hello"}]}"#,
        )
        .unwrap();
        match rec {
            WireRecord::Ops(ops) => {
                assert_eq!(ops.len(), 1);
                assert_eq!(ops[0].answer_text(ANSWER_PATH), Some("Hello"));
            }
            other => panic!("expected ops record, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_record() {
        let rec = WireRecord::parse(r#"{"error":"boom","detail":"model fell over"}"#).unwrap();
        match rec {
            WireRecord::Error { error, detail } => {
                assert_eq!(error, "boom");
                assert_eq!(detail.as_deref(), Some("model fell over"));
            }
            other => panic!("expected error record, got {:?}", other),
        }
        assert!(
            WireRecord::parse(r#"{"error":"boom","detail":"x"}"#)
                .unwrap()
                .is_terminal()
        );
    }

    #[test]
    fn test_parse_feedback_ack() {
        let rec =
            WireRecord::parse(r#"{"ack":"feedback","conversation_id":"c-1"}"#).unwrap();
        match rec {
            WireRecord::FeedbackAck { conversation_id } => assert_eq!(conversation_id, "c-1"),
            other => panic!("expected feedback ack, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_record_is_other() {
        let rec = WireRecord::parse(r#"{"heartbeat":true}"#).unwrap();
        assert!(matches!(rec, WireRecord::Other));
        // ack of an unknown kind is also ignored
        let rec = WireRecord::parse(r#"{"ack":"presence","conversation_id":"c-1"}"#).unwrap();
        assert!(matches!(rec, WireRecord::Other));
    }

    #[test]
    fn test_parse_malformed_is_err() {
        assert!(WireRecord::parse("{not json").is_err());
    }

    #[test]
    fn test_answer_text_filters_op_and_path() {
        let op = Operation::add(ANSWER_PATH, "chunk");
        assert_eq!(op.answer_text(ANSWER_PATH), Some("chunk"));

        let wrong_path = Operation::add("/logs/-", "chunk");
        assert_eq!(wrong_path.answer_text(ANSWER_PATH), None);

        let wrong_op = Operation {
            op: "replace".to_string(),
            path: ANSWER_PATH.to_string(),
            value: serde_json::Value::String("chunk".into()),
        };
        assert_eq!(wrong_op.answer_text(ANSWER_PATH), None);

        let non_string = Operation {
            op: "add".to_string(),
            path: ANSWER_PATH.to_string(),
            value: serde_json::json!(42),
        };
        assert_eq!(non_string.answer_text(ANSWER_PATH), None);
    }
}
