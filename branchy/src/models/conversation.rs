//! Conversation model representing one path through a branching chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier of a conversation, assigned on creation.
pub type ConversationId = i64;

/// A conversation: a root chat, or a branch copied from another conversation.
///
/// The `parent_id` graph is a forest. Branches are re-parented to the root
/// they hang off, so the forest never grows deeper than one level below a
/// root (see the branch engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier, immutable.
    pub id: ConversationId,
    /// Parent conversation if this is a branch; `None` for roots.
    /// Set exactly once at creation and never changed.
    pub parent_id: Option<ConversationId>,
    /// Display title. May be overwritten once by automatic title generation.
    pub title: String,
    /// When the conversation was created; sort key for listings.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether this conversation has no parent.
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
