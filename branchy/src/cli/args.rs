//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Branchy - explore a conversation along diverging branches
#[derive(Parser, Debug)]
#[command(name = "branchy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database file (defaults to the user data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Model to use for completion and title requests
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new root conversation
    New {
        /// Title for the conversation (defaults to "New Chat")
        title: Option<String>,
    },

    /// List root conversations, most recent first
    List,

    /// List the branches of a conversation
    Branches {
        /// Conversation ID
        id: i64,
    },

    /// Print a conversation's messages
    Show {
        /// Conversation ID
        id: i64,
    },

    /// Print a conversation's title
    Title {
        /// Conversation ID
        id: i64,
    },

    /// Send a message and wait for the assistant reply
    Send {
        /// Conversation ID
        id: i64,

        /// Message to send
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },

    /// Branch a conversation, copying its full history
    Branch {
        /// Conversation ID to branch from
        id: i64,

        /// Title for the branch (defaults to "Branch of <title>")
        #[arg(long)]
        title: Option<String>,
    },

    /// Branch at a message, copying history up to and including it
    BranchAt {
        /// Conversation ID to branch from
        id: i64,

        /// Message position to branch at (1-indexed)
        seq: i64,

        /// Title for the branch (defaults to "Branch from message #<seq>")
        #[arg(long)]
        title: Option<String>,
    },

    /// Branch with a highlighted span of text as context
    BranchFromText {
        /// Conversation ID to branch from
        id: i64,

        /// Highlighted text
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
}
