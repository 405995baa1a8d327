//! Branch engine: copy-on-branch creation of new conversations.
//!
//! Branches are re-parented to the root they hang off: branching from a
//! conversation that is itself a branch attaches the new branch to that
//! branch's parent, so the forest never nests more than one level below a
//! root and the display layer can show "Main" plus a flat list of branch
//! tabs.

use std::sync::Arc;

use chrono::Utc;

use crate::db::{ConversationQueries, MessageQueries};
use crate::error::{BranchError, StoreError};
use crate::models::{ConversationId, MessageId};
use crate::store::Store;

/// Longest selection snippet carried into a default branch title.
const SNIPPET_LEN: usize = 30;

/// Creates branches on top of the store. Each branch operation runs in a
/// single transaction: either the conversation row and all copied messages
/// land together, or nothing does.
pub struct BranchEngine {
    store: Arc<Store>,
}

impl BranchEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Branch a conversation, copying its entire message history.
    ///
    /// With no explicit title the branch is named `Branch of <source title>`.
    pub fn branch_full(
        &self,
        conversation_id: ConversationId,
        title: Option<&str>,
    ) -> Result<ConversationId, BranchError> {
        self.create_branch(conversation_id, None, title, |source_title| {
            format!("Branch of {source_title}")
        })
    }

    /// Branch a conversation at a message, copying history up to and
    /// including that sequence position. Out-of-range positions are clamped
    /// to the conversation's length.
    ///
    /// With no explicit title the branch is named `Branch from message #<k>`.
    pub fn branch_at(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        title: Option<&str>,
    ) -> Result<ConversationId, BranchError> {
        self.create_branch(conversation_id, Some(message_id), title, |_| {
            format!("Branch from message #{message_id}")
        })
    }

    /// Branch a conversation from a highlighted span of text. The full
    /// history is copied; the selection itself is not stored as a message,
    /// only reflected in the default title (the caller delivers it to the
    /// owning session as an annotation).
    pub fn branch_from_selection(
        &self,
        conversation_id: ConversationId,
        selected_text: &str,
    ) -> Result<ConversationId, BranchError> {
        let title = selection_title(selected_text);
        self.create_branch(conversation_id, None, Some(&title), |_| title.clone())
    }

    /// Whether a branch has grown past its copied prefix.
    pub fn has_diverged(
        &self,
        parent_id: ConversationId,
        branch_id: ConversationId,
    ) -> Result<bool, StoreError> {
        Ok(self.store.message_count(parent_id)? != self.store.message_count(branch_id)?)
    }

    fn create_branch(
        &self,
        source_id: ConversationId,
        upto: Option<MessageId>,
        title: Option<&str>,
        default_title: impl FnOnce(&str) -> String,
    ) -> Result<ConversationId, BranchError> {
        let result = self.store.with_transaction(|tx| {
            let source = ConversationQueries::get(tx, source_id)?
                .ok_or(StoreError::UnknownConversation(source_id))?;

            // Root flattening: a branch of a branch attaches to the root.
            let parent_id = source.parent_id.unwrap_or(source.id);

            let messages = MessageQueries::list(tx, source_id)?;
            let len = messages.len();
            let cut = upto.map_or(len, |k| usize::try_from(k).unwrap_or(0).min(len));

            let title = title.map_or_else(|| default_title(&source.title), str::to_string);
            let branch_id = ConversationQueries::insert(tx, Some(parent_id), &title, Utc::now())?;

            for message in &messages[..cut] {
                MessageQueries::append(tx, branch_id, message.role, &message.content, Utc::now())?;
            }
            Ok(branch_id)
        });

        // The transaction rolls back on any error, so a failed copy leaves
        // no orphan conversation row. Unknown sources stay caller errors;
        // everything else surfaces as a failed copy.
        result.map_err(|e| match e {
            StoreError::UnknownConversation(_) | StoreError::InvalidParent(_) => e.into(),
            other => BranchError::CopyFailed(other.to_string()),
        })
    }
}

fn selection_title(selected_text: &str) -> String {
    let trimmed = selected_text.trim();
    if trimmed.chars().count() > SNIPPET_LEN {
        let snippet: String = trimmed.chars().take(SNIPPET_LEN).collect();
        format!("Branch: {snippet}...")
    } else {
        format!("Branch: {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    fn setup() -> (Arc<Store>, BranchEngine, ConversationId) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = BranchEngine::new(Arc::clone(&store));
        let root = store.create_conversation(None, "New Chat").unwrap();
        store
            .append_message(root, MessageRole::User, "Hello")
            .unwrap();
        store
            .append_message(root, MessageRole::Assistant, "Hi there")
            .unwrap();
        store
            .append_message(root, MessageRole::User, "Tell me more")
            .unwrap();
        (store, engine, root)
    }

    #[test]
    fn full_branch_copies_everything() {
        let (store, engine, root) = setup();
        let branch = engine.branch_full(root, None).unwrap();

        let original = store.list_messages(root).unwrap();
        let copied = store.list_messages(branch).unwrap();
        assert_eq!(copied.len(), original.len());
        for (a, b) in original.iter().zip(&copied) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }

        assert_eq!(store.get_parent(branch).unwrap(), Some(root));
        assert_eq!(store.get_title(branch), "Branch of New Chat");
    }

    #[test]
    fn branch_at_copies_prefix() {
        let (store, engine, root) = setup();
        let branch = engine.branch_at(root, 2, None).unwrap();

        let copied = store.list_messages(branch).unwrap();
        assert_eq!(copied.len(), 2);
        assert_eq!(copied[0].content, "Hello");
        assert_eq!(copied[1].content, "Hi there");
        assert_eq!(copied.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.get_title(branch), "Branch from message #2");
    }

    #[test]
    fn branch_at_clamps_out_of_range_positions() {
        let (store, engine, root) = setup();

        let past_end = engine.branch_at(root, 99, None).unwrap();
        assert_eq!(store.message_count(past_end).unwrap(), 3);

        let before_start = engine.branch_at(root, -1, None).unwrap();
        assert_eq!(store.message_count(before_start).unwrap(), 0);
    }

    #[test]
    fn branching_a_branch_attaches_to_the_root() {
        let (store, engine, root) = setup();
        let first = engine.branch_full(root, None).unwrap();
        let second = engine.branch_at(first, 1, None).unwrap();

        assert_eq!(store.get_parent(second).unwrap(), Some(root));
        let children = store.list_children(root).unwrap();
        assert_eq!(
            children.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![first, second]
        );
    }

    #[test]
    fn explicit_title_overrides_default() {
        let (store, engine, root) = setup();
        let branch = engine.branch_full(root, Some("What about lifetimes?")).unwrap();
        assert_eq!(store.get_title(branch), "What about lifetimes?");
    }

    #[test]
    fn selection_branch_truncates_long_snippets() {
        let (store, engine, root) = setup();
        let branch = engine
            .branch_from_selection(root, "short snippet")
            .unwrap();
        assert_eq!(store.get_title(branch), "Branch: short snippet");

        let long = "a very long highlighted span of text that keeps going";
        let branch = engine.branch_from_selection(root, long).unwrap();
        let title = store.get_title(branch);
        assert!(title.starts_with("Branch: "));
        assert!(title.ends_with("..."));
        // Selection context is never spliced into the copied history.
        assert_eq!(store.message_count(branch).unwrap(), 3);
    }

    #[test]
    fn unknown_source_leaves_no_orphan_row() {
        let (store, engine, _root) = setup();
        let before = store.list_roots().unwrap().len();

        let err = engine.branch_full(777, None).unwrap_err();
        assert!(matches!(
            err,
            BranchError::Store(StoreError::UnknownConversation(777))
        ));
        assert_eq!(store.list_roots().unwrap().len(), before);
        assert!(store.list_children(777).unwrap().is_empty());
    }

    #[test]
    fn divergence_tracks_message_counts() {
        let (store, engine, root) = setup();
        let branch = engine.branch_full(root, None).unwrap();
        assert!(!engine.has_diverged(root, branch).unwrap());

        store
            .append_message(branch, MessageRole::User, "a new direction")
            .unwrap();
        assert!(engine.has_diverged(root, branch).unwrap());
    }
}
