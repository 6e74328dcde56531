//! # Store Primitives
//!
//! Hardcoded runtime constants for the Arbor store.
//!
//! Defaults that callers may override live in [`crate::config::StoreConfig`];
//! the limits here are fixed.

/// Default capacity of the mutation queue.
///
/// Producers block once this many transforms are waiting.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default depth limit for eager expansion.
///
/// Eager payloads that keep producing expandable children stop here.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 64;

/// Maximum number of parent hops in a record's ancestor chain.
///
/// A longer chain can only be a cycle, which is a programming defect.
pub const MAX_ANCESTRY_HOPS: usize = 1024;

/// Name of the dedicated mutation worker thread.
pub const WORKER_THREAD_NAME: &str = "arbor-worker";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_capacity_is_bounded() {
        assert_eq!(DEFAULT_QUEUE_CAPACITY, 100);
    }

    #[test]
    fn ancestry_outlasts_expansion() {
        assert!(MAX_ANCESTRY_HOPS > DEFAULT_MAX_EXPANSION_DEPTH);
    }
}
