//! # arbor
//!
//! Library half of the Arbor binary: configuration loading, the filesystem
//! provider, JSON output types and the CLI commands built on them.

pub mod cli;
pub mod config;
pub mod fs;
pub mod output;
