//! Conversation store: the single shared mutable resource.
//!
//! Every operation takes the connection lock for its whole duration, so all
//! mutation is globally serialized and branch copies read a consistent
//! snapshot of the source conversation. Store operations are synchronous and
//! quick; the network-bound work lives in the orchestrator.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::Connection;

use crate::db::{ConversationQueries, Database, MessageQueries};
use crate::error::StoreError;
use crate::models::{Conversation, ConversationId, Message, MessageId, MessageRole};

/// Title returned for conversations the store does not know about.
pub const UNTITLED: &str = "Untitled";

/// Persistent tree of conversations and their ordered messages.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the store at the default database location.
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self::from_database(Database::open()?))
    }

    /// Open the store at a specific database path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    fn from_database(db: Database) -> Self {
        Self {
            conn: Mutex::new(db.into_connection()),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new conversation.
    ///
    /// Fails with [`StoreError::InvalidParent`] if `parent_id` does not
    /// reference an existing conversation.
    pub fn create_conversation(
        &self,
        parent_id: Option<ConversationId>,
        title: &str,
    ) -> Result<ConversationId, StoreError> {
        let conn = self.conn();
        if let Some(parent) = parent_id {
            if !ConversationQueries::exists(&conn, parent)? {
                return Err(StoreError::InvalidParent(parent));
            }
        }
        ConversationQueries::insert(&conn, parent_id, title, Utc::now())
    }

    /// Append a message to the end of a conversation's sequence.
    pub fn append_message(
        &self,
        conversation_id: ConversationId,
        role: MessageRole,
        text: &str,
    ) -> Result<MessageId, StoreError> {
        let conn = self.conn();
        if !ConversationQueries::exists(&conn, conversation_id)? {
            return Err(StoreError::UnknownConversation(conversation_id));
        }
        MessageQueries::append(&conn, conversation_id, role, text, Utc::now())
    }

    /// All messages of a conversation in insertion order.
    pub fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn();
        if !ConversationQueries::exists(&conn, conversation_id)? {
            return Err(StoreError::UnknownConversation(conversation_id));
        }
        MessageQueries::list(&conn, conversation_id)
    }

    /// Root conversations, most recent first.
    pub fn list_roots(&self) -> Result<Vec<Conversation>, StoreError> {
        ConversationQueries::list_roots(&self.conn())
    }

    /// Direct children of a conversation, oldest first.
    pub fn list_children(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Conversation>, StoreError> {
        ConversationQueries::list_children(&self.conn(), conversation_id)
    }

    /// Title of a conversation. Best-effort: unknown ids (and lookup
    /// failures) yield `"Untitled"` rather than an error.
    pub fn get_title(&self, conversation_id: ConversationId) -> String {
        ConversationQueries::get(&self.conn(), conversation_id)
            .ok()
            .flatten()
            .map_or_else(|| UNTITLED.to_string(), |c| c.title)
    }

    /// Unconditionally overwrite a conversation's title. Idempotent; a
    /// no-op for unknown ids.
    pub fn set_title(&self, conversation_id: ConversationId, title: &str) -> Result<(), StoreError> {
        ConversationQueries::update_title(&self.conn(), conversation_id, title)
    }

    /// Number of messages in a conversation. Zero for unknown ids.
    pub fn message_count(&self, conversation_id: ConversationId) -> Result<usize, StoreError> {
        MessageQueries::count(&self.conn(), conversation_id)
    }

    /// Parent of a conversation. `None` both for roots and for unknown ids;
    /// callers are expected to pass ids they know exist.
    pub fn get_parent(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationId>, StoreError> {
        Ok(ConversationQueries::get(&self.conn(), conversation_id)?.and_then(|c| c.parent_id))
    }

    /// Run `f` inside a transaction, committing on success and rolling back
    /// on error. Used by the branch engine for atomic prefix copies.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn create_and_list_roots_most_recent_first() {
        let store = store();
        let first = store.create_conversation(None, "New Chat").unwrap();
        let second = store.create_conversation(None, "Another Chat").unwrap();

        let roots = store.list_roots().unwrap();
        assert_eq!(
            roots.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![second, first]
        );
        assert!(roots.iter().all(Conversation::is_root));
    }

    #[test]
    fn invalid_parent_is_rejected() {
        let store = store();
        let err = store.create_conversation(Some(999), "branch").unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent(999)));
        assert!(store.list_roots().unwrap().is_empty());
    }

    #[test]
    fn append_rejects_unknown_conversation() {
        let store = store();
        let err = store
            .append_message(42, MessageRole::User, "hello")
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownConversation(42)));
    }

    #[test]
    fn messages_keep_insertion_order_without_duplicates() {
        let store = store();
        let id = store.create_conversation(None, "New Chat").unwrap();
        for i in 0..5 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            store.append_message(id, role, &format!("msg {i}")).unwrap();
        }

        let messages = store.list_messages(id).unwrap();
        let positions: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn list_messages_empty_for_fresh_conversation() {
        let store = store();
        let id = store.create_conversation(None, "New Chat").unwrap();
        assert!(store.list_messages(id).unwrap().is_empty());
        assert_eq!(store.message_count(id).unwrap(), 0);
    }

    #[test]
    fn title_is_best_effort() {
        let store = store();
        assert_eq!(store.get_title(12345), UNTITLED);

        let id = store.create_conversation(None, "New Chat").unwrap();
        store.set_title(id, "Rust Questions").unwrap();
        store.set_title(id, "Rust Questions").unwrap();
        assert_eq!(store.get_title(id), "Rust Questions");
    }

    #[test]
    fn children_are_listed_oldest_first() {
        let store = store();
        let root = store.create_conversation(None, "New Chat").unwrap();
        let a = store.create_conversation(Some(root), "Branch A").unwrap();
        let b = store.create_conversation(Some(root), "Branch B").unwrap();

        let children = store.list_children(root).unwrap();
        assert_eq!(children.iter().map(|c| c.id).collect::<Vec<_>>(), vec![a, b]);

        assert_eq!(store.get_parent(a).unwrap(), Some(root));
        assert_eq!(store.get_parent(root).unwrap(), None);
        assert_eq!(store.get_parent(999).unwrap(), None);
    }
}
