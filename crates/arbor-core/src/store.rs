//! # Store Facade
//!
//! The public read/write/subscribe surface of the result store.
//!
//! Writes (`add`, `set`, `remove`, `update`, key/value setters, listener
//! registration) become transforms on the mutation queue and return a
//! [`Handle`]. Reads load the last fully-applied snapshot and never block:
//! a reader may observe a state one mutation behind an in-flight write.
//!
//! `Store` is a cheap, cloneable handle. The worker thread lives until
//! [`Store::shutdown`] is called or every clone is dropped. Listeners that
//! capture a `Store` keep it alive, so long-lived applications should call
//! `shutdown` explicitly.

use crate::config::StoreConfig;
use crate::expansion::{ExpansionEngine, Preference};
use crate::listener::{ChangeFn, FilterFn, Listener};
use crate::scheduler::{Handle, Scheduler, Transform};
use crate::{ExpansionPolicy, Namespace, Record, RecordId, State, StoreError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

struct Inner {
    scheduler: Scheduler,
    engine: ExpansionEngine,
    config: StoreConfig,
    /// Serializes single-record in-place updates and explicit expansions.
    update_lock: Mutex<()>,
}

/// Handle to a running result store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("records", &self.len())
            .finish()
    }
}

impl Store {
    /// Start a store with the default configuration.
    pub fn new() -> Result<Self, StoreError> {
        Self::with_config(StoreConfig::default())
    }

    /// Start a store with an explicit configuration.
    pub fn with_config(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let scheduler = Scheduler::start(config.queue_capacity)?;
        let engine = ExpansionEngine::new(config.max_expansion_depth);
        Ok(Self {
            inner: Arc::new(Inner {
                scheduler,
                engine,
                config,
                update_lock: Mutex::new(()),
            }),
        })
    }

    /// The configuration this store runs with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Stop the worker once everything already queued has been applied.
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }

    // =========================================================================
    // RAW TRANSFORMS
    // =========================================================================

    /// Queue an arbitrary state transform.
    pub fn update_state<F>(&self, transform: F) -> Handle
    where
        F: FnOnce(State) -> State + Send + 'static,
    {
        self.inner.scheduler.submit(Box::new(transform))
    }

    /// Queue an arbitrary state transform from async code.
    pub async fn update_state_async<F>(&self, transform: F) -> Handle
    where
        F: FnOnce(State) -> State + Send + 'static,
    {
        let transform: Transform = Box::new(transform);
        self.inner.scheduler.submit_async(transform).await
    }

    // =========================================================================
    // RECORD WRITES
    // =========================================================================

    /// Insert records whose ids are not yet present.
    ///
    /// Each record is expanded first according to its payload's declared
    /// policy, and the batch that is queued includes the realised
    /// descendants. If any id in that batch already exists the whole batch is
    /// rejected and logged.
    pub fn add(&self, records: impl IntoIterator<Item = Record>) -> Handle {
        let batch = self.expand_batch(records);
        self.update_state(move |mut state| {
            match state.add_records(batch) {
                Ok(count) => tracing::debug!(count, "records added"),
                Err(e) => tracing::warn!(error = %e, "add rejected; batch not inserted"),
            }
            state
        })
    }

    /// Insert or replace records by id.
    ///
    /// Replaced records move to the end of the root list.
    pub fn set(&self, records: impl IntoIterator<Item = Record>) -> Handle {
        let batch = self.expand_batch(records);
        self.update_state(move |mut state| {
            match state.set_records(batch) {
                Ok(count) => tracing::debug!(count, "records set"),
                Err(e) => tracing::warn!(error = %e, "set rejected"),
            }
            state
        })
    }

    /// Remove every record matching `predicate` and all their descendants.
    pub fn remove<P>(&self, predicate: P) -> Handle
    where
        P: Fn(&Record) -> bool + Send + 'static,
    {
        self.update_state(move |mut state| {
            match state.remove_where(predicate) {
                Ok(removed) => tracing::debug!(count = removed.len(), "records removed"),
                Err(e) => tracing::warn!(error = %e, "remove rejected"),
            }
            state
        })
    }

    /// Apply `f` to one record in place and wait for it.
    ///
    /// A missing record is logged and the update is a no-op. Concurrent
    /// callers are serialized by an exclusive lock. Called from a listener,
    /// the update is queued behind the running mutation and not awaited.
    pub fn update<F>(&self, id: &RecordId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Record) + Send + 'static,
    {
        let target = id.clone();
        let transform = move |mut state: State| {
            if let Err(e) = state.update_record(&target, f) {
                tracing::warn!(error = %e, "update rejected");
            }
            state
        };

        if self.inner.scheduler.on_worker() {
            tracing::debug!(record = %id, "update queued from inside a mutation");
            let _ = self.update_state(transform);
            return Ok(());
        }

        let _guard = self.inner.update_lock.lock();
        self.update_state(transform).wait()
    }

    fn expand_batch(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let mut batch = Vec::new();
        for mut record in records {
            let descendants = self
                .inner
                .engine
                .realise(self, &record, Preference::Declared);
            if self.inner.engine.settles(&record, Preference::Declared) {
                record.children_realised = true;
            }
            batch.push(record);
            batch.extend(descendants);
        }
        batch
    }

    // =========================================================================
    // RECORD READS
    // =========================================================================

    /// The last fully-applied state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<State> {
        self.inner.scheduler.snapshot()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<Record> {
        self.snapshot().get(id).cloned()
    }

    /// All records matching `predicate`, sorted by id.
    pub fn filter<P>(&self, predicate: P) -> Vec<Record>
    where
        P: Fn(&Record) -> bool,
    {
        self.snapshot().filter(predicate)
    }

    /// All records in `ns`, sorted by id.
    #[must_use]
    pub fn filter_by_ns(&self, ns: &Namespace) -> Vec<Record> {
        self.snapshot().filter_by_ns(ns)
    }

    /// The root list, in order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.snapshot().records().to_vec()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Check if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Already-realised direct children of a record.
    #[must_use]
    pub fn children_of(&self, id: &RecordId) -> Vec<Record> {
        self.snapshot().children_of(id)
    }

    /// The ancestor chain of a record, nearest parent first.
    #[must_use]
    pub fn ancestry(&self, id: &RecordId) -> Vec<Record> {
        self.snapshot().ancestry(id)
    }

    /// The direct children of `record`, expanding it first if needed.
    ///
    /// If the stored record has not been realised yet its payload is expanded
    /// one level (even when its policy is `Deferred`), the record is marked
    /// realised and the new descendants are stored before returning. Once
    /// realised, the stored children are returned without expanding again.
    ///
    /// Producers run before the update lock is taken, so they may call back
    /// into the store. Called from a listener, the descendants are queued
    /// behind the running mutation and not awaited.
    pub fn children(&self, record: &Record) -> Result<Vec<Record>, StoreError> {
        let current = self
            .get(&record.id)
            .ok_or_else(|| StoreError::RecordNotFound(record.id.clone()))?;
        if current.children_realised {
            return Ok(self.children_of(&current.id));
        }
        let Some(payload) = current.payload.as_expandable() else {
            return Ok(self.children_of(&current.id));
        };
        if payload.policy() == ExpansionPolicy::Suppressed {
            return Ok(self.children_of(&current.id));
        }

        let descendants = self.inner.engine.realise_requested(self, &current);
        let direct: Vec<Record> = descendants
            .iter()
            .filter(|r| r.parent.as_ref() == Some(&current.id))
            .cloned()
            .collect();
        tracing::debug!(
            record = %current.id,
            children = direct.len(),
            descendants = descendants.len(),
            "children realised on request"
        );

        let id = current.id.clone();
        let transform = move |mut state: State| {
            if let Err(e) = state.update_record(&id, |r| r.children_realised = true) {
                tracing::warn!(error = %e, "record vanished before its children were stored");
                return state;
            }
            if let Err(e) = state.set_records(descendants) {
                tracing::warn!(error = %e, "storing realised children failed");
            }
            state
        };

        if self.inner.scheduler.on_worker() {
            let _ = self.update_state(transform);
            return Ok(direct);
        }

        let _guard = self.inner.update_lock.lock();
        // A concurrent caller may have stored this level while producers ran.
        if self
            .get(&current.id)
            .is_some_and(|stored| stored.children_realised)
        {
            return Ok(self.children_of(&current.id));
        }
        self.update_state(transform).wait()?;

        Ok(direct)
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    /// Register a listener.
    ///
    /// The listener is evaluated from the mutation that registers it onward;
    /// `on_change` receives `(previous, current)` whenever the filtered subset
    /// changes. There is no way to remove a listener.
    pub fn add_listener<F, C>(&self, id: impl Into<String>, filter: F, on_change: C) -> Handle
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
        C: Fn(&[Record], &[Record]) + Send + Sync + 'static,
    {
        let filter: FilterFn = Arc::new(filter);
        let on_change: ChangeFn = Arc::new(on_change);
        let listener = Listener::new(id, filter, on_change);
        self.update_state(move |mut state| {
            tracing::debug!(listener = %listener.id(), "listener registered");
            state.push_listener(listener);
            state
        })
    }

    // =========================================================================
    // KEY/VALUE SETTINGS
    // =========================================================================

    /// Store a setting.
    pub fn set_key_val(&self, key: impl Into<String>, value: impl Into<String>) -> Handle {
        let key = key.into();
        let value = value.into();
        self.update_state(move |mut state| {
            state.set_key_val(key, value);
            state
        })
    }

    /// Remove a setting.
    pub fn remove_key_val(&self, key: impl Into<String>) -> Handle {
        let key = key.into();
        self.update_state(move |mut state| {
            if state.remove_key_val(&key).is_none() {
                tracing::debug!(key = %key, "removed setting was not present");
            }
            state
        })
    }

    /// Look up a setting.
    #[must_use]
    pub fn get_key_val(&self, key: &str) -> Option<String> {
        self.snapshot().key_val(key).map(str::to_string)
    }

    /// All settings whose key starts with `prefix`.
    #[must_use]
    pub fn key_vals_with_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        self.snapshot().key_vals_with_prefix(prefix)
    }
}

// =============================================================================
// TESTS
// =============================================================================
