//! Session model: the ephemeral binding between an open view and a
//! conversation. Not persisted.

use super::ConversationId;

/// State tracked for one open conversation view.
///
/// At most one session is registered per conversation id at a time.
#[derive(Debug, Clone)]
pub struct Session {
    /// Conversation this session is bound to.
    pub conversation_id: ConversationId,
    /// Whether the conversation's first exchange is still unanswered.
    /// Cleared exactly once when title generation fires.
    pub awaiting_title: bool,
    /// First user message, cached for the title request.
    pub first_user_message: Option<String>,
    /// Number of completion requests currently in flight.
    pub in_flight: usize,
}

impl Session {
    /// Create a session for a conversation.
    pub const fn new(conversation_id: ConversationId, awaiting_title: bool) -> Self {
        Self {
            conversation_id,
            awaiting_title,
            first_user_message: None,
            in_flight: 0,
        }
    }
}
