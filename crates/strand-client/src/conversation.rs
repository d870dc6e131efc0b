//! Conversation state: a stable id plus the ordered message list.

use strand_wire::types::Message;

/// One chat conversation, owned by the host UI.
///
/// The client runtime only reads the message list and appends to it;
/// history is never deleted here.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Stable, client-generated id
    pub id: String,
    /// Ordered messages
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create a conversation with a fresh id
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    /// Create a conversation with a known id (e.g. restored by the host)
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Last message, if any
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}
