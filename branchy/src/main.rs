//! Branchy - explore a conversation with an AI assistant along multiple
//! diverging paths without losing earlier context.
//!
//! Architecture:
//! - The store is a SQLite-backed forest of conversations and their ordered
//!   messages; branching copies a message prefix into a new conversation.
//! - The orchestrator runs completion requests through a per-conversation
//!   worker so replies land in submission order, and fires exactly one
//!   title-generation request after a conversation's first exchange.
//! - The session registry tracks open conversations and fans results back
//!   out; the CLI here is one possible display surface.

mod branch;
mod cli;
mod db;
mod error;
mod models;
mod orchestrator;
mod provider;
mod session;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("branchy=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
