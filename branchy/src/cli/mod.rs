//! CLI interface for branchy.

mod args;
mod commands;

pub use args::{Cli, Commands};
pub use commands::execute;
