//! # Arbor CLI Module
//!
//! This module implements the CLI interface for Arbor.
//!
//! ## Available Commands
//!
//! - `ls` - List a path as a record tree, expanding directories on demand
//! - `load` - Load plain records from a JSON file
//! - `config` - Show the effective configuration

mod commands;

use crate::config::AppConfig;
use arbor_core::StoreError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Arbor - reactive result store
///
/// Records flow through one serialized queue; directory listings and other
/// expandable results open lazily.
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List a path, expanding directories down to a depth
    Ls {
        /// Path to list
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Directory levels to expand
        #[arg(short, long, default_value = "1")]
        depth: usize,
    },

    /// Load records from a JSON array
    Load {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,

        /// Only print records in this namespace (provider/service/kind)
        #[arg(long)]
        ns: Option<String>,
    },

    /// Show the effective configuration
    Config,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StoreError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Ls { path, depth }) => cmd_ls(&config, json_mode, &path, depth),
        Some(Commands::Load { file, ns }) => {
            cmd_load(&config, json_mode, cli.quiet, &file, ns.as_deref())
        }
        Some(Commands::Config) => cmd_config(&config, json_mode),
        None => {
            // No subcommand - list the working directory
            cmd_ls(&config, json_mode, &PathBuf::from("."), 1)
        }
    }
}
