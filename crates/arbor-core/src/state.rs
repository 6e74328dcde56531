//! # Store State
//!
//! The value the mutation worker transforms: the ordered root list of
//! records, the derived id index, the key/value settings and the listeners.
//!
//! All mutators here are pure with respect to the outside world; the
//! scheduler hands a private copy of the previous state to a transform and
//! installs whatever comes back.
//!
//! ## Index Invariant
//!
//! `index[record.id] == position of record in records`, for every record,
//! with no extra entries. Every mutator ends with a rebuild, and the worker
//! rebuilds once more before installing a state.

use crate::listener::{Listener, dispatch};
use crate::primitives::MAX_ANCESTRY_HOPS;
use crate::{Namespace, Record, RecordId, StoreError};
use std::collections::{BTreeMap, BTreeSet};

/// A consistent snapshot of the store.
#[derive(Debug, Clone, Default)]
pub struct State {
    records: Vec<Record>,
    index: BTreeMap<RecordId, usize>,
    key_vals: BTreeMap<String, String>,
    listeners: Vec<Listener>,
}

impl State {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // INDEX
    // =========================================================================

    /// Rebuild the id index from the root list.
    ///
    /// Fails if two records share an id; the index is left untouched then.
    pub fn reindex(&mut self) -> Result<(), StoreError> {
        let mut index = BTreeMap::new();
        for (position, record) in self.records.iter().enumerate() {
            if index.insert(record.id.clone(), position).is_some() {
                return Err(StoreError::DuplicateId(record.id.clone()));
            }
        }
        self.index = index;
        Ok(())
    }

    /// The id index.
    #[must_use]
    pub fn index(&self) -> &BTreeMap<RecordId, usize> {
        &self.index
    }

    /// Position of a record in the root list.
    #[must_use]
    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.index.get(id).copied()
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// The root list, in order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check whether a record with this id exists.
    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.index.contains_key(id)
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.position(id).and_then(|p| self.records.get(p))
    }

    /// All records matching `predicate`, sorted by id.
    pub fn filter<P>(&self, predicate: P) -> Vec<Record>
    where
        P: Fn(&Record) -> bool,
    {
        let mut matches: Vec<Record> = self
            .records
            .iter()
            .filter(|r| predicate(*r))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches
    }

    /// All records in the given namespace, sorted by id.
    #[must_use]
    pub fn filter_by_ns(&self, ns: &Namespace) -> Vec<Record> {
        self.filter(|r| &r.ns == ns)
    }

    /// Direct children of a record, in root-list order.
    #[must_use]
    pub fn children_of(&self, id: &RecordId) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.parent.as_ref() == Some(id))
            .cloned()
            .collect()
    }

    /// The ancestor chain of a record, nearest parent first.
    ///
    /// A parent id that is not in the store ends the chain.
    ///
    /// # Panics
    ///
    /// Panics if the chain exceeds [`MAX_ANCESTRY_HOPS`]. Such a chain can only
    /// be a cycle, which would make cascading removal and tree rendering
    /// meaningless; continuing would corrupt every consumer of the tree.
    #[must_use]
    #[allow(clippy::panic)]
    pub fn ancestry(&self, id: &RecordId) -> Vec<Record> {
        let mut chain = Vec::new();
        let mut cursor = self.get(id).and_then(|r| r.parent.clone());
        while let Some(parent_id) = cursor {
            let Some(parent) = self.get(&parent_id) else {
                break;
            };
            if chain.len() >= MAX_ANCESTRY_HOPS {
                panic!(
                    "ancestor chain of {id} exceeds {MAX_ANCESTRY_HOPS} hops; parent links form a cycle"
                );
            }
            cursor = parent.parent.clone();
            chain.push(parent.clone());
        }
        chain
    }

    /// Look up a setting.
    #[must_use]
    pub fn key_val(&self, key: &str) -> Option<&str> {
        self.key_vals.get(key).map(String::as_str)
    }

    /// All settings whose key starts with `prefix`.
    #[must_use]
    pub fn key_vals_with_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        self.key_vals
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // =========================================================================
    // MUTATORS
    // =========================================================================

    /// Insert a batch of records, all or nothing.
    ///
    /// The batch is rejected if any id already exists or if the batch itself
    /// repeats an id. Returns the number of inserted records.
    pub fn add_records(&mut self, batch: Vec<Record>) -> Result<usize, StoreError> {
        let mut seen = BTreeSet::new();
        for record in &batch {
            if self.contains(&record.id) || !seen.insert(&record.id) {
                return Err(StoreError::DuplicateId(record.id.clone()));
            }
        }
        let count = batch.len();
        self.records.extend(batch);
        self.reindex()?;
        Ok(count)
    }

    /// Insert or replace records by id.
    ///
    /// A replaced record is dropped from its old position and the new one is
    /// appended. Within the batch the last record with a given id wins.
    pub fn set_records(&mut self, batch: Vec<Record>) -> Result<usize, StoreError> {
        let mut latest: BTreeMap<RecordId, usize> = BTreeMap::new();
        for (i, record) in batch.iter().enumerate() {
            latest.insert(record.id.clone(), i);
        }
        self.records.retain(|r| !latest.contains_key(&r.id));
        let count = latest.len();
        self.records.extend(
            batch
                .into_iter()
                .enumerate()
                .filter(|(i, r)| latest.get(&r.id) == Some(i))
                .map(|(_, r)| r),
        );
        self.reindex()?;
        Ok(count)
    }

    /// Remove every record matching `predicate` together with all of its
    /// descendants. Returns the removed ids.
    pub fn remove_where<P>(&mut self, predicate: P) -> Result<Vec<RecordId>, StoreError>
    where
        P: Fn(&Record) -> bool,
    {
        let mut children: BTreeMap<&RecordId, Vec<&RecordId>> = BTreeMap::new();
        for record in &self.records {
            if let Some(parent) = &record.parent {
                children.entry(parent).or_default().push(&record.id);
            }
        }

        let mut doomed: BTreeSet<RecordId> = BTreeSet::new();
        let mut pending: Vec<&RecordId> = self
            .records
            .iter()
            .filter(|r| predicate(*r))
            .map(|r| &r.id)
            .collect();
        while let Some(id) = pending.pop() {
            if !doomed.insert(id.clone()) {
                continue;
            }
            if let Some(kids) = children.get(id) {
                pending.extend(kids.iter().copied());
            }
        }

        let removed: Vec<RecordId> = self
            .records
            .iter()
            .filter(|r| doomed.contains(&r.id))
            .map(|r| r.id.clone())
            .collect();
        self.records.retain(|r| !doomed.contains(&r.id));
        self.reindex()?;
        Ok(removed)
    }

    /// Apply `f` to a single record in place.
    ///
    /// The record keeps its position. Changing the id is not allowed and is
    /// reverted.
    pub fn update_record<F>(&mut self, id: &RecordId, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Record),
    {
        let position = self
            .position(id)
            .ok_or_else(|| StoreError::RecordNotFound(id.clone()))?;
        let record = self
            .records
            .get_mut(position)
            .ok_or_else(|| StoreError::RecordNotFound(id.clone()))?;
        f(record);
        if &record.id != id {
            tracing::warn!(record = %id, "in-place update tried to change the id; kept original");
            record.id = id.clone();
        }
        Ok(())
    }

    /// Store a setting.
    pub fn set_key_val(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.key_vals.insert(key.into(), value.into());
    }

    /// Remove a setting, returning its old value.
    pub fn remove_key_val(&mut self, key: &str) -> Option<String> {
        self.key_vals.remove(key)
    }

    /// Register a listener.
    pub fn push_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Run every listener against the current records, returning how many
    /// fired.
    pub(crate) fn dispatch_listeners(&mut self) -> usize {
        let Self {
            records, listeners, ..
        } = self;
        dispatch(records, listeners)
    }
}

// =============================================================================
// TESTS
// =============================================================================
