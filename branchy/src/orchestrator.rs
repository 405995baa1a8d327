//! Completion orchestrator: dispatches asynchronous completion requests and
//! serializes them per conversation.
//!
//! Each conversation gets a lazily-spawned worker task fed by a channel, so
//! assistant replies always land in the order their prompts were submitted
//! while unrelated conversations run concurrently. The user message itself
//! is appended synchronously at submission time, which keeps the stored
//! message order equal to the submission order even when requests queue up.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::warn;

use crate::error::{ProviderError, StoreError};
use crate::models::{ConversationId, MessageId, MessageRole};
use crate::provider::{ChatProvider, HistoryEntry, RESERVED_TITLES};
use crate::session::{PlaceholderToken, SessionEvent, SessionRegistry};
use crate::store::Store;

/// How long a provider call may run before it is surfaced as a failure
/// instead of leaving the placeholder pending forever.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

/// One queued completion request.
struct CompletionJob {
    conversation_id: ConversationId,
    dispatched_text: String,
    placeholder: PlaceholderToken,
}

/// Dispatches completion and title-generation requests against the store.
pub struct Orchestrator {
    inner: Arc<Inner>,
    workers: Mutex<HashMap<ConversationId, mpsc::UnboundedSender<CompletionJob>>>,
    next_placeholder: AtomicU64,
}

/// State shared with the worker tasks.
struct Inner {
    store: Arc<Store>,
    provider: Arc<dyn ChatProvider>,
    registry: Arc<SessionRegistry>,
    provider_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        provider: Arc<dyn ChatProvider>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self::with_timeout(store, provider, registry, PROVIDER_TIMEOUT)
    }

    pub fn with_timeout(
        store: Arc<Store>,
        provider: Arc<dyn ChatProvider>,
        registry: Arc<SessionRegistry>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                provider,
                registry,
                provider_timeout,
            }),
            workers: Mutex::new(HashMap::new()),
            next_placeholder: AtomicU64::new(1),
        }
    }

    fn workers(
        &self,
    ) -> MutexGuard<'_, HashMap<ConversationId, mpsc::UnboundedSender<CompletionJob>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a user message and queue an asynchronous completion request
    /// for it. Returns the placeholder token identifying the pending reply.
    pub fn submit_user_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<PlaceholderToken, StoreError> {
        self.inner
            .store
            .append_message(conversation_id, MessageRole::User, text)?;
        self.inner
            .registry
            .cache_first_user_message(conversation_id, text);
        self.inner.registry.begin_request(conversation_id);

        let placeholder = self.next_placeholder.fetch_add(1, Ordering::SeqCst);
        self.inner.registry.publish(SessionEvent::TypingStarted {
            conversation_id,
            placeholder,
        });

        self.enqueue(CompletionJob {
            conversation_id,
            dispatched_text: text.to_string(),
            placeholder,
        });
        Ok(placeholder)
    }

    fn enqueue(&self, job: CompletionJob) {
        let conversation_id = job.conversation_id;
        let mut workers = self.workers();
        let sender = workers
            .entry(conversation_id)
            .or_insert_with(|| Self::spawn_worker(Arc::clone(&self.inner)));

        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            // The worker task is gone (runtime shutdown mid-flight); start a
            // fresh one so later submissions on this conversation still work.
            let sender = Self::spawn_worker(Arc::clone(&self.inner));
            let _ = sender.send(job);
            workers.insert(conversation_id, sender);
        }
    }

    fn spawn_worker(inner: Arc<Inner>) -> mpsc::UnboundedSender<CompletionJob> {
        let (tx, mut rx) = mpsc::unbounded_channel::<CompletionJob>();
        tokio::spawn(async move {
            // One job at a time: this loop is the per-conversation ordering
            // guarantee.
            while let Some(job) = rx.recv().await {
                Arc::clone(&inner).process(job).await;
            }
        });
        tx
    }
}

impl Inner {
    async fn process(self: Arc<Self>, job: CompletionJob) {
        let CompletionJob {
            conversation_id,
            dispatched_text,
            placeholder,
        } = job;

        let result = self.run_completion(conversation_id).await;
        self.registry.finish_request(conversation_id);

        match result {
            Ok((message_id, reply)) => {
                self.registry.publish(SessionEvent::AssistantReply {
                    conversation_id,
                    placeholder,
                    message_id,
                    text: reply.clone(),
                });

                if let Some(user_text) = self
                    .registry
                    .take_title_trigger(conversation_id, &dispatched_text)
                {
                    let orchestrator = Arc::clone(&self);
                    tokio::spawn(orchestrator.run_title(conversation_id, user_text, reply));
                }
            }
            Err(detail) => {
                // Nothing was persisted; the placeholder becomes an error
                // notice and `awaiting_title` stays untouched so a retried
                // first exchange can still earn a title.
                self.registry.publish(SessionEvent::CompletionFailed {
                    conversation_id,
                    placeholder,
                    detail,
                });
            }
        }
    }

    /// Snapshot the history, call the provider, persist the reply.
    /// The snapshot is taken here, under the per-conversation worker, so a
    /// queued prompt sees every earlier reply in its context.
    async fn run_completion(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(MessageId, String), String> {
        let history: Vec<HistoryEntry> = self
            .store
            .list_messages(conversation_id)
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(|m| HistoryEntry {
                role: m.role,
                text: m.content,
            })
            .collect();

        let reply = self
            .bounded(self.provider.complete(&history))
            .await
            .map_err(|e| e.to_string())?;

        let message_id = self
            .store
            .append_message(conversation_id, MessageRole::Assistant, &reply)
            .map_err(|e| e.to_string())?;
        Ok((message_id, reply))
    }

    /// Generate and apply a conversation title. Failures are logged and
    /// otherwise swallowed; the conversation keeps its prior title.
    async fn run_title(
        self: Arc<Self>,
        conversation_id: ConversationId,
        user_text: String,
        assistant_text: String,
    ) {
        match self
            .bounded(self.provider.generate_title(&user_text, &assistant_text))
            .await
        {
            Ok(title) => {
                let title = title.trim();
                if title.is_empty() || RESERVED_TITLES.contains(&title) {
                    return;
                }
                match self.store.set_title(conversation_id, title) {
                    Ok(()) => self.registry.notify_title_changed(conversation_id, title),
                    Err(e) => {
                        warn!(conversation_id, error = %e, "failed to store generated title");
                    }
                }
            }
            Err(e) => warn!(conversation_id, error = %e, "title generation failed"),
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
        }
    }
}
