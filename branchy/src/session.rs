//! Session registry: tracks which conversations currently have an open view
//! and fans orchestrator results back out to the display layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::models::{ConversationId, MessageId, Session};
use crate::store::Store;

/// Token identifying one user-visible "assistant is typing" placeholder.
pub type PlaceholderToken = u64;

/// One-way notifications consumed by the display surface. Delivery is
/// best-effort: with no subscriber the event is dropped, which is exactly
/// what a closed session wants.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A completion request was dispatched; show a typing placeholder.
    TypingStarted {
        conversation_id: ConversationId,
        placeholder: PlaceholderToken,
    },
    /// An assistant reply was persisted; replace the placeholder with it.
    AssistantReply {
        conversation_id: ConversationId,
        placeholder: PlaceholderToken,
        message_id: MessageId,
        text: String,
    },
    /// A completion request failed; replace the placeholder with the error.
    CompletionFailed {
        conversation_id: ConversationId,
        placeholder: PlaceholderToken,
        detail: String,
    },
    /// Automatic title generation renamed a conversation.
    TitleChanged {
        conversation_id: ConversationId,
        title: String,
    },
    /// Highlighted text carried into a selection branch. Never stored as a
    /// message; shown to the branch's session as context.
    SelectionContext {
        conversation_id: ConversationId,
        text: String,
    },
}

/// Registry of open sessions, at most one per conversation id.
pub struct SessionRegistry {
    store: Arc<Store>,
    sessions: Mutex<HashMap<ConversationId, Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConversationId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a session for a conversation, returning the existing one if the
    /// conversation is already open. A fresh session awaits a title exactly
    /// when the conversation has no messages yet.
    pub fn open(&self, conversation_id: ConversationId) -> Result<Session, StoreError> {
        let mut sessions = self.sessions();
        if let Some(existing) = sessions.get(&conversation_id) {
            return Ok(existing.clone());
        }
        let awaiting_title = self.store.message_count(conversation_id)? == 0;
        let session = Session::new(conversation_id, awaiting_title);
        sessions.insert(conversation_id, session.clone());
        Ok(session)
    }

    /// Close a session. In-flight requests for the conversation still
    /// complete and persist; their events just find no interested subscriber.
    pub fn close(&self, conversation_id: ConversationId) {
        self.sessions().remove(&conversation_id);
    }

    /// Snapshot of a registered session, if any.
    pub fn session(&self, conversation_id: ConversationId) -> Option<Session> {
        self.sessions().get(&conversation_id).cloned()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Signal a title change to the display layer.
    pub fn notify_title_changed(&self, conversation_id: ConversationId, title: &str) {
        self.publish(SessionEvent::TitleChanged {
            conversation_id,
            title: title.to_string(),
        });
    }

    /// Deliver a selection annotation to a branch's session.
    pub fn annotate_selection(&self, conversation_id: ConversationId, text: &str) {
        self.publish(SessionEvent::SelectionContext {
            conversation_id,
            text: text.to_string(),
        });
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        // No receivers is fine; events are best-effort.
        let _ = self.events.send(event);
    }

    /// Cache the first user message for the title request, if this session
    /// is still on its first exchange.
    pub(crate) fn cache_first_user_message(&self, conversation_id: ConversationId, text: &str) {
        let mut sessions = self.sessions();
        if let Some(session) = sessions.get_mut(&conversation_id) {
            if session.awaiting_title && session.first_user_message.is_none() {
                session.first_user_message = Some(text.to_string());
            }
        }
    }

    /// If the session is awaiting a title, clear the flag and hand back the
    /// cached first user message (or `fallback` if nothing was cached).
    /// Clearing happens here, before the title request is even dispatched,
    /// so the request can never fire twice.
    pub(crate) fn take_title_trigger(
        &self,
        conversation_id: ConversationId,
        fallback: &str,
    ) -> Option<String> {
        let mut sessions = self.sessions();
        let session = sessions.get_mut(&conversation_id)?;
        if !session.awaiting_title {
            return None;
        }
        session.awaiting_title = false;
        Some(
            session
                .first_user_message
                .take()
                .unwrap_or_else(|| fallback.to_string()),
        )
    }

    pub(crate) fn begin_request(&self, conversation_id: ConversationId) {
        if let Some(session) = self.sessions().get_mut(&conversation_id) {
            session.in_flight += 1;
        }
    }

    pub(crate) fn finish_request(&self, conversation_id: ConversationId) {
        if let Some(session) = self.sessions().get_mut(&conversation_id) {
            session.in_flight = session.in_flight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    fn registry() -> (Arc<Store>, SessionRegistry) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = SessionRegistry::new(Arc::clone(&store));
        (store, registry)
    }

    #[test]
    fn open_derives_awaiting_title_from_message_count() {
        let (store, registry) = registry();
        let empty = store.create_conversation(None, "New Chat").unwrap();
        let populated = store.create_conversation(None, "Old Chat").unwrap();
        store
            .append_message(populated, MessageRole::User, "hi")
            .unwrap();

        assert!(registry.open(empty).unwrap().awaiting_title);
        assert!(!registry.open(populated).unwrap().awaiting_title);
    }

    #[test]
    fn open_returns_the_existing_session() {
        let (store, registry) = registry();
        let id = store.create_conversation(None, "New Chat").unwrap();

        registry.open(id).unwrap();
        registry.cache_first_user_message(id, "Hello");
        // A second open must not reset the cached state.
        let again = registry.open(id).unwrap();
        assert_eq!(again.first_user_message.as_deref(), Some("Hello"));
    }

    #[test]
    fn title_trigger_fires_at_most_once() {
        let (store, registry) = registry();
        let id = store.create_conversation(None, "New Chat").unwrap();

        registry.open(id).unwrap();
        registry.cache_first_user_message(id, "Hello");
        assert_eq!(
            registry.take_title_trigger(id, "fallback").as_deref(),
            Some("Hello")
        );
        assert_eq!(registry.take_title_trigger(id, "fallback"), None);
        assert!(!registry.session(id).unwrap().awaiting_title);
    }

    #[test]
    fn close_deregisters_the_session() {
        let (store, registry) = registry();
        let id = store.create_conversation(None, "New Chat").unwrap();

        registry.open(id).unwrap();
        registry.close(id);
        assert!(registry.session(id).is_none());
        assert!(registry.take_title_trigger(id, "fallback").is_none());
    }

    #[tokio::test]
    async fn title_notifications_reach_subscribers() {
        let (store, registry) = registry();
        let id = store.create_conversation(None, "New Chat").unwrap();

        let mut rx = registry.subscribe();
        registry.notify_title_changed(id, "Rust Basics");

        match rx.recv().await.unwrap() {
            SessionEvent::TitleChanged {
                conversation_id,
                title,
            } => {
                assert_eq!(conversation_id, id);
                assert_eq!(title, "Rust Basics");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn notify_without_subscribers_is_a_no_op() {
        let (store, registry) = registry();
        let id = store.create_conversation(None, "New Chat").unwrap();
        registry.notify_title_changed(id, "dropped");
    }
}
