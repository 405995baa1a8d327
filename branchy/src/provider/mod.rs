//! Completion and title providers.
//!
//! The core only depends on the functional contract here; the wire envelope
//! lives behind [`ChatProvider`] implementations.

mod openai;

pub use openai::{OpenAiProvider, ProviderConfig};

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::MessageRole;

/// Placeholder titles a provider may echo back; treated as "no title
/// produced" by the orchestrator.
pub const RESERVED_TITLES: &[&str] = &["New Conversation", "New Chat"];

/// One role/text pair of prompt context.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub text: String,
}

/// External completion/title provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Produce the next assistant reply given the full ordered message
    /// history of a conversation.
    async fn complete(&self, history: &[HistoryEntry]) -> Result<String, ProviderError>;

    /// Produce a short (few-word) label for a conversation from its first
    /// exchange.
    async fn generate_title(
        &self,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<String, ProviderError>;
}
