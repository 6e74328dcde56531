//! # arbor-core
//!
//! The reactive result store for Arbor - THE LOGIC.
//!
//! This crate holds a single ordered collection of tagged, loosely-typed
//! records. Records may form a parent/child tree and may carry a payload that
//! lazily produces more records. Every write is funneled through one
//! serialized queue, so readers never observe a partially-applied update and
//! change listeners run in a deterministic order relative to the mutation
//! that triggered them.
//!
//! ## Architecture
//!
//! - `scheduler` - bounded FIFO of state transforms, one worker thread
//! - `state` - the root list, its id index and key/value settings
//! - `expansion` - turns expandable payloads into child records
//! - `listener` - memoized filter + callback pairs, replayed per mutation
//! - `store` - the facade tying the pieces together
//! - `provider` - named services that produce records for callers
//!
//! ## Architectural Constraints
//!
//! - Memory resident: nothing is persisted, the store is rebuilt on startup
//! - Single writer: only the worker mutates state, index and listener memos
//! - Lock-free reads: `ArcSwap` snapshots of the last applied state

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod expansion;
pub mod listener;
pub mod primitives;
pub mod provider;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ExpandError, Expandable, ExpansionPolicy, Namespace, Payload, Record, RecordId, StoreError,
    Tag,
};

// =============================================================================
// RE-EXPORTS: Store Engine
// =============================================================================

pub use config::StoreConfig;
pub use expansion::{ExpansionEngine, Preference};
pub use listener::{ChangeFn, FilterFn, Listener, ListenerId};
pub use scheduler::{Handle, Transform};
pub use state::State;
pub use store::Store;

// =============================================================================
// RE-EXPORTS: Providers
// =============================================================================

pub use provider::{
    ArgDef, Provider, ProviderRegistry, Service, ServiceArgs, ServiceError, ServiceFn,
};

// =============================================================================
// RE-EXPORTS: Primitives
// =============================================================================

pub use primitives::{
    DEFAULT_MAX_EXPANSION_DEPTH, DEFAULT_QUEUE_CAPACITY, MAX_ANCESTRY_HOPS, WORKER_THREAD_NAME,
};
