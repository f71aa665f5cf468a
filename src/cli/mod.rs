//! CLI module - Command-line interface for the advancements site
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::db::AttemptScope;

/// Advancements - personal image and notes gallery with an admin area
#[derive(Parser)]
#[command(name = "advancements")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config.toml (default: search the usual locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server (default)
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// List stored users
    #[command(alias = "ls")]
    Users,

    /// Reset the failed-login counter for a username or IP
    ResetAttempts {
        /// Username or IP address
        key: String,
        /// Counter family to reset: user or ip (default: both)
        #[arg(long)]
        scope: Option<AttemptScope>,
    },

    /// Drop expired attempt counters from the attempts file
    Sweep,
}

pub use commands::*;
