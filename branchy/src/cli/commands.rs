//! CLI command implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use tokio::time::timeout;

use crate::branch::BranchEngine;
use crate::models::ConversationId;
use crate::orchestrator::Orchestrator;
use crate::provider::{ChatProvider, OpenAiProvider, ProviderConfig};
use crate::session::{SessionEvent, SessionRegistry};
use crate::store::Store;

use super::args::{Cli, Commands};

/// How long `send` waits for the assistant reply before giving up.
const REPLY_WAIT: Duration = Duration::from_secs(120);
/// How long `send` lingers for a first-exchange title after the reply.
const TITLE_WAIT: Duration = Duration::from_secs(20);

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<()> {
    let store = Arc::new(open_store(cli.db.as_deref())?);

    match cli.command {
        Commands::New { title } => {
            let title = title.as_deref().unwrap_or("New Chat");
            let id = store.create_conversation(None, title)?;
            println!("Created conversation {id}: {title}");
            Ok(())
        }

        Commands::List => {
            let roots = store.list_roots()?;
            if roots.is_empty() {
                println!("No conversations yet. Start one with `branchy new`.");
                return Ok(());
            }
            for conversation in roots {
                println!("{:>4}  {}", conversation.id, conversation.title);
            }
            Ok(())
        }

        Commands::Branches { id } => {
            let engine = BranchEngine::new(Arc::clone(&store));
            let children = store.list_children(id)?;
            if children.is_empty() {
                println!("No branches for conversation {id}.");
                return Ok(());
            }
            for branch in children {
                let marker = if engine.has_diverged(id, branch.id)? {
                    ""
                } else {
                    "  (not yet diverged)"
                };
                println!("{:>4}  {}{marker}", branch.id, branch.title);
            }
            Ok(())
        }

        Commands::Show { id } => {
            for message in store.list_messages(id)? {
                println!("[{}] {}: {}", message.id, message.role, message.content);
            }
            Ok(())
        }

        Commands::Title { id } => {
            println!("{}", store.get_title(id));
            Ok(())
        }

        Commands::Branch { id, title } => {
            let engine = BranchEngine::new(Arc::clone(&store));
            let branch_id = engine.branch_full(id, title.as_deref())?;
            println!("Created branch {branch_id}: {}", store.get_title(branch_id));
            Ok(())
        }

        Commands::BranchAt { id, seq, title } => {
            let engine = BranchEngine::new(Arc::clone(&store));
            let branch_id = engine.branch_at(id, seq, title.as_deref())?;
            println!("Created branch {branch_id}: {}", store.get_title(branch_id));
            Ok(())
        }

        Commands::BranchFromText { id, text } => {
            let text = text.join(" ");
            let engine = BranchEngine::new(Arc::clone(&store));
            let registry = SessionRegistry::new(Arc::clone(&store));

            let branch_id = engine.branch_from_selection(id, &text)?;
            registry.open(branch_id)?;
            registry.annotate_selection(branch_id, &text);

            println!("Created branch {branch_id}: {}", store.get_title(branch_id));
            println!("Selected context: {text}");
            Ok(())
        }

        Commands::Send { id, message } => {
            send_message(store, cli.model, id, &message.join(" ")).await
        }
    }
}

fn open_store(db: Option<&Path>) -> Result<Store> {
    match db {
        Some(path) => Store::open_at(path)
            .with_context(|| format!("failed to open database at {}", path.display())),
        None => Store::open().context("failed to open database"),
    }
}

async fn send_message(
    store: Arc<Store>,
    model: Option<String>,
    id: ConversationId,
    text: &str,
) -> Result<()> {
    ensure!(!text.trim().is_empty(), "message is empty");

    let mut config = ProviderConfig::from_env()?;
    if let Some(model) = model {
        config = config.with_model(model);
    }
    let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiProvider::new(config));
    let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
    let orchestrator = Orchestrator::new(Arc::clone(&store), provider, Arc::clone(&registry));

    let session = registry.open(id)?;
    let awaiting_title = session.awaiting_title;
    let mut rx = registry.subscribe();
    let placeholder = orchestrator.submit_user_message(id, text)?;

    println!("user: {text}");
    println!("...");

    let outcome = loop {
        let event = timeout(REPLY_WAIT, rx.recv())
            .await
            .context("timed out waiting for the assistant reply")?
            .context("event stream closed")?;
        match event {
            SessionEvent::AssistantReply {
                placeholder: p,
                text,
                ..
            } if p == placeholder => break Ok(text),
            SessionEvent::CompletionFailed {
                placeholder: p,
                detail,
                ..
            } if p == placeholder => break Err(detail),
            _ => {}
        }
    };

    match outcome {
        Ok(reply) => println!("assistant: {reply}"),
        Err(detail) => {
            registry.close(id);
            bail!("completion failed: {detail}");
        }
    }

    // Title generation is best-effort and asynchronous; linger briefly for
    // the rename on a first exchange, then move on.
    if awaiting_title {
        let deadline = tokio::time::Instant::now() + TITLE_WAIT;
        loop {
            let Ok(event) = tokio::time::timeout_at(deadline, rx.recv()).await else {
                break;
            };
            match event {
                Ok(SessionEvent::TitleChanged {
                    conversation_id,
                    title,
                }) if conversation_id == id => {
                    println!("title: {title}");
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    registry.close(id);
    Ok(())
}
