//! # Application Configuration
//!
//! Configuration is layered:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`)
//! 3. Environment overrides
//!
//! ## Environment Variables
//!
//! - `ARBOR_QUEUE_CAPACITY`: capacity of the mutation queue (default: 100)
//! - `ARBOR_MAX_DEPTH`: depth limit for eager expansion (default: 64)
//!
//! ## File Format
//!
//! ```toml
//! [store]
//! queue_capacity = 100
//! max_expansion_depth = 64
//!
//! [fs]
//! show_hidden = false
//! ```

use arbor_core::{StoreConfig, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum size of a configuration file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Filesystem provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FsConfig {
    /// Include dot-files in directory listings.
    pub show_hidden: bool,
}

/// Effective configuration of the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub fs: FsConfig,
}

impl AppConfig {
    /// Load defaults, then the file at `path` if given, then the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, StoreError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.store.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            StoreError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(StoreError::Config(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, StoreError> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Apply `ARBOR_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("ARBOR_QUEUE_CAPACITY") {
            self.store.queue_capacity = parse_override("ARBOR_QUEUE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("ARBOR_MAX_DEPTH") {
            self.store.max_expansion_depth = parse_override("ARBOR_MAX_DEPTH", &raw)?;
        }
        Ok(())
    }
}

fn parse_override(key: &str, raw: &str) -> Result<usize, StoreError> {
    raw.trim()
        .parse()
        .map_err(|_| StoreError::Config(format!("{key} must be a positive integer, got {raw:?}")))
}
