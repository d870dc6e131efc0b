//! Conversation message model

use serde::{Deserialize, Serialize};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Assistant,
    System,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Image content (base64 encoded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub data: String,
    pub mime_type: String,
}

/// A single conversation message.
///
/// Created by the host UI on send/edit/retry; frozen once a streaming
/// turn completes. The protocol layer only ever appends messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Image attachments riding along with the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageAttachment>,
    /// Excluded from future requests
    #[serde(default)]
    pub muted: bool,
    /// Edited by the user after the fact
    #[serde(default)]
    pub edited: bool,
    /// Everything after this message was discarded by the user
    #[serde(default)]
    pub truncated_after: bool,
    /// The streaming turn producing this message was aborted mid-answer
    #[serde(default)]
    pub incomplete: bool,
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: vec![],
            muted: false,
            edited: false,
            truncated_after: false,
            incomplete: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a human message
    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach images
    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.images = images;
        self
    }

    /// Mark this message muted (excluded from future requests)
    pub fn muted(mut self) -> Self {
        self.muted = true;
        self
    }

    /// Mark this message incomplete (its streaming turn was aborted)
    pub fn mark_incomplete(mut self) -> Self {
        self.incomplete = true;
        self
    }

    /// Whether the message carries no usable content
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty() && self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_whitespace_only() {
        assert!(Message::human("  \n\t ").is_blank());
        assert!(Message::human("").is_blank());
        assert!(!Message::human("hi").is_blank());
    }

    #[test]
    fn test_blank_with_image_is_not_blank() {
        let msg = Message::human("").with_images(vec![ImageAttachment {
            data: "aGk=".into(),
            mime_type: "image/png".into(),
        }]);
        assert!(!msg.is_blank());
    }

    #[test]
    fn test_muted_flag() {
        let msg = Message::human("ignore me").muted();
        assert!(msg.muted);
        assert!(!msg.incomplete);
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Human).unwrap();
        assert_eq!(json, "\"human\"");
    }
}
