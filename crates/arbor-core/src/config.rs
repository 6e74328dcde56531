//! # Store Configuration
//!
//! Tunables for a [`Store`](crate::Store). Deserializable so the binary can
//! load them from the `[store]` table of a TOML file.

use crate::StoreError;
use crate::primitives::{DEFAULT_MAX_EXPANSION_DEPTH, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};

/// Configuration for a store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Capacity of the bounded mutation queue.
    pub queue_capacity: usize,
    /// Depth limit for eager expansion.
    pub max_expansion_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
        }
    }
}

impl StoreConfig {
    /// Check the configuration for values the store cannot run with.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.queue_capacity == 0 {
            return Err(StoreError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_expansion_depth == 0 {
            return Err(StoreError::Config(
                "max_expansion_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_expansion_depth, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = StoreConfig {
            queue_capacity: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn zero_depth_rejected() {
        let config = StoreConfig {
            max_expansion_depth: 0,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"queue_capacity": 8}"#).expect("deserialize");
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.max_expansion_depth, 64);
    }
}
