//! CLI command handlers.

use std::path::PathBuf;

pub mod config;
pub mod shop;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
    /// Data directory given on the command line.
    pub data_dir: Option<PathBuf>,
}
