//! Request composition
//!
//! Turns a conversation's message list plus the active context selection
//! into the wire request body. Pure transformation; no I/O.

use serde::Serialize;

use crate::types::{ImageAttachment, Message, Role};

/// The file/skill/image context selected for a turn.
#[derive(Debug, Clone, Default)]
pub struct ContextSelection {
    /// Selected context file paths
    pub files: Vec<String>,
    /// Skill prompts attached to this turn
    pub skills: Vec<String>,
    /// Images attached to this turn
    pub images: Vec<ImageAttachment>,
}

/// Outbound POST body: `{ input: { chat_history, question, config, ... } }`
#[derive(Debug, Clone, Serialize)]
pub struct WireRequest {
    pub input: RequestInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestInput {
    /// Ordered `[human, assistant]` pairs built from consecutive,
    /// complete exchanges only
    pub chat_history: Vec<(String, String)>,
    pub question: String,
    pub config: RequestConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestConfig {
    pub files: Vec<String>,
}

/// Build the wire request for a turn.
///
/// History pairs come only from consecutive human→assistant exchanges.
/// Muted and blank messages are dropped before pairing, system messages
/// never enter history, and a trailing unanswered human message is
/// excluded (it rides separately as `question`).
pub fn build_request(
    messages: &[Message],
    question: impl Into<String>,
    context: &ContextSelection,
) -> WireRequest {
    let mut chat_history = Vec::new();
    let mut pending_human: Option<&str> = None;

    for message in messages {
        if message.muted || message.is_blank() {
            continue;
        }
        match message.role {
            Role::Human => {
                // A human message with no answer yet; a later human
                // message supersedes it without forming a pair.
                pending_human = Some(&message.content);
            }
            Role::Assistant => {
                if let Some(human) = pending_human.take() {
                    chat_history.push((human.to_string(), message.content.clone()));
                }
                // An assistant message with no preceding human is dropped.
            }
            Role::System => {}
        }
    }

    WireRequest {
        input: RequestInput {
            chat_history,
            question: question.into(),
            config: RequestConfig {
                files: context.files.clone(),
            },
            skills: context.skills.clone(),
            images: context.images.clone(),
        },
    }
}

impl WireRequest {
    /// Extend history with a preserved partial answer for the original
    /// question, so a retried request lets the model continue rather
    /// than restart.
    pub fn extend_history(&mut self, human: impl Into<String>, assistant: impl Into<String>) {
        self.input
            .chat_history
            .push((human.into(), assistant.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(files: &[&str]) -> ContextSelection {
        ContextSelection {
            files: files.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pairs_consecutive_exchanges() {
        let messages = vec![
            Message::human("q1"),
            Message::assistant("a1"),
            Message::human("q2"),
            Message::assistant("a2"),
            Message::human("q3"),
        ];
        let req = build_request(&messages, "q3", &ctx(&["src/main.rs"]));
        assert_eq!(
            req.input.chat_history,
            vec![("q1".into(), "a1".into()), ("q2".into(), "a2".into())]
        );
        assert_eq!(req.input.question, "q3");
        assert_eq!(req.input.config.files, vec!["src/main.rs"]);
    }

    #[test]
    fn test_trailing_human_never_in_history() {
        let messages = vec![Message::human("only question")];
        let req = build_request(&messages, "only question", &ctx(&[]));
        assert!(req.input.chat_history.is_empty());
        assert_eq!(req.input.question, "only question");
    }

    #[test]
    fn test_muted_and_blank_excluded_before_pairing() {
        let messages = vec![
            Message::human("q1"),
            Message::assistant("   ").muted(),
            Message::assistant("a1"),
            Message::human("ignored").muted(),
            Message::human("q2"),
            Message::assistant(""),
            Message::assistant("a2"),
        ];
        let req = build_request(&messages, "next", &ctx(&[]));
        // Blank/muted assistants drop out; q1 pairs with the first real
        // answer, q2 with the second.
        assert_eq!(
            req.input.chat_history,
            vec![("q1".into(), "a1".into()), ("q2".into(), "a2".into())]
        );
    }

    #[test]
    fn test_consecutive_humans_drop_unanswered() {
        let messages = vec![
            Message::human("superseded"),
            Message::human("q1"),
            Message::assistant("a1"),
        ];
        let req = build_request(&messages, "next", &ctx(&[]));
        assert_eq!(req.input.chat_history, vec![("q1".into(), "a1".into())]);
    }

    #[test]
    fn test_system_messages_never_pair() {
        let messages = vec![
            Message::system("be terse"),
            Message::human("q1"),
            Message::system("mid-conversation note"),
            Message::assistant("a1"),
        ];
        let req = build_request(&messages, "next", &ctx(&[]));
        assert_eq!(req.input.chat_history, vec![("q1".into(), "a1".into())]);
    }

    #[test]
    fn test_orphan_assistant_dropped() {
        let messages = vec![Message::assistant("hello there"), Message::human("q1")];
        let req = build_request(&messages, "q1", &ctx(&[]));
        assert!(req.input.chat_history.is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let messages = vec![Message::human("q1"), Message::assistant("a1")];
        let req = build_request(&messages, "q2", &ctx(&["a.rs", "b.rs"]));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json["input"]["chat_history"],
            serde_json::json!([["q1", "a1"]])
        );
        assert_eq!(json["input"]["question"], "q2");
        assert_eq!(json["input"]["config"]["files"], serde_json::json!(["a.rs", "b.rs"]));
        // Empty optional sections are omitted entirely
        assert!(json["input"].get("skills").is_none());
        assert!(json["input"].get("images").is_none());
    }

    #[test]
    fn test_extend_history_appends_pair() {
        let mut req = build_request(&[Message::human("q")], "q", &ctx(&[]));
        req.extend_history("q", "partial answer");
        assert_eq!(
            req.input.chat_history,
            vec![("q".into(), "partial answer".into())]
        );
    }
}
