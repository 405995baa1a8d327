//! Data models for branchy entities.

mod conversation;
mod message;
mod session;

pub use conversation::{Conversation, ConversationId};
pub use message::{Message, MessageId, MessageRole};
pub use session::Session;
