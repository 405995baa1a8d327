//! Error taxonomy for the conversation core.

use std::time::Duration;

use thiserror::Error;

use crate::models::ConversationId;

/// Errors from the conversation store. `UnknownConversation` and
/// `InvalidParent` are caller programming errors; the operation aborts with
/// no partial state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    #[error("invalid parent conversation: {0}")]
    InvalidParent(ConversationId),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from branch creation. A failed copy aborts the whole operation;
/// no partially-populated conversation row is left behind.
#[derive(Debug, Error)]
pub enum BranchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("branch copy failed: {0}")]
    CopyFailed(String),
}

/// Errors from the completion and title providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error (status {status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration: {0}")]
    Config(String),
}
