//! Message model representing one entry in a conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConversationId;

/// Per-conversation sequence number of a message, 1-indexed.
///
/// The sequence defines the conversation's total order; branching copies a
/// prefix of it. Unique only within the owning conversation.
pub type MessageId = i64;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the assistant.
    Assistant,
}

impl MessageRole {
    /// Convert role to string for database storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse role from database string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a conversation. Immutable once written; branching copies
/// message rows, it never moves or shares them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Sequence number within the owning conversation.
    pub id: MessageId,
    /// Conversation this message belongs to (exclusive ownership).
    pub conversation_id: ConversationId,
    /// Role of the message sender.
    pub role: MessageRole,
    /// Message body.
    pub content: String,
    /// When the message was inserted.
    pub created_at: DateTime<Utc>,
}
