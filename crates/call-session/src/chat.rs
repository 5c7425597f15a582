//! In-session text chat history.
//!
//! History lives only as long as the session.

use chrono::{DateTime, Utc};
use common::types::ParticipantIdentity;
use uuid::Uuid;

/// A chat message sent or received during the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Local id for list rendering. Not sent on the wire.
    pub id: Uuid,
    pub sender: ParticipantIdentity,
    pub sender_name: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub is_local: bool,
}

impl ChatMessage {
    #[must_use]
    pub fn new(
        sender: ParticipantIdentity,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        is_local: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            sender_name: sender_name.into(),
            text: text.into(),
            sent_at: Utc::now(),
            is_local,
        }
    }
}

/// Append-only chat history in arrival order.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
}

impl ChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
