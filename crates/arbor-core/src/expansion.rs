//! # Lazy Expansion Engine
//!
//! Decides whether and how deeply to materialise the descendants of a record
//! whose payload is [`Expandable`].
//!
//! ## Algorithm
//!
//! 1. No expandable payload, or children already realised: nothing to do.
//! 2. Effective policy: [`Preference::Eager`] forces eager expansion,
//!    [`Preference::Declared`] uses the payload's own policy.
//! 3. `Suppressed` and `Deferred` produce nothing and leave the record
//!    unrealised.
//! 4. `Eager` calls the payload's `children`, assigns the parent, and recurses.
//!    A child is marked realised only if its own expansion produced
//!    descendants; an empty expansion leaves it open for a later explicit pass.
//!
//! A failing or panicking `children` call counts as zero children.

use crate::scheduler::panic_message;
use crate::{Expandable, ExpansionPolicy, Record, Store};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// How the caller wants expansion policies to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preference {
    /// Expand everything eagerly, ignoring declared policies.
    #[default]
    Eager,
    /// Honour each payload's declared policy.
    Declared,
}

impl Preference {
    /// The policy that applies to a payload under this preference.
    #[must_use]
    pub fn effective(self, declared: ExpansionPolicy) -> ExpansionPolicy {
        match self {
            Self::Eager => ExpansionPolicy::Eager,
            Self::Declared => declared,
        }
    }
}

/// Materialises descendant records on behalf of expandable payloads.
#[derive(Debug, Clone)]
pub struct ExpansionEngine {
    max_depth: usize,
}

impl ExpansionEngine {
    /// Create an engine that stops recursing at `max_depth` levels.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Depth limit for recursion.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Compute all descendants of `record`, depth first, parents before
    /// their children.
    ///
    /// `record` itself is not included and not modified.
    pub fn realise(&self, store: &Store, record: &Record, preference: Preference) -> Vec<Record> {
        self.realise_at(store, record, preference, 0)
    }

    /// Whether a top-level record counts as realised once `realise` has run
    /// over it with `preference`.
    ///
    /// True when there was nothing to expand or when the effective policy was
    /// eager; deferred and suppressed payloads stay open.
    #[must_use]
    pub fn settles(&self, record: &Record, preference: Preference) -> bool {
        if record.children_realised {
            return true;
        }
        match record.payload.as_expandable() {
            None => true,
            Some(payload) => preference.effective(payload.policy()) == ExpansionPolicy::Eager,
        }
    }

    /// Expand one level on explicit request, ignoring a `Deferred` policy.
    ///
    /// Suppressed payloads still produce nothing. Children are expanded
    /// further according to their own declared policies.
    pub fn realise_requested(&self, store: &Store, record: &Record) -> Vec<Record> {
        if record.children_realised {
            return Vec::new();
        }
        let Some(payload) = record.payload.as_expandable() else {
            return Vec::new();
        };
        if payload.policy() == ExpansionPolicy::Suppressed {
            tracing::debug!(record = %record.id, "expansion suppressed by payload");
            return Vec::new();
        }
        self.expand(store, record, payload, Preference::Declared, 0)
    }

    fn realise_at(
        &self,
        store: &Store,
        record: &Record,
        preference: Preference,
        depth: usize,
    ) -> Vec<Record> {
        if record.children_realised {
            return Vec::new();
        }
        let Some(payload) = record.payload.as_expandable() else {
            return Vec::new();
        };

        match preference.effective(payload.policy()) {
            ExpansionPolicy::Suppressed | ExpansionPolicy::Deferred => Vec::new(),
            ExpansionPolicy::Eager => self.expand(store, record, payload, preference, depth),
        }
    }

    fn expand(
        &self,
        store: &Store,
        record: &Record,
        payload: &Arc<dyn Expandable>,
        preference: Preference,
        depth: usize,
    ) -> Vec<Record> {
        if depth >= self.max_depth {
            tracing::warn!(
                record = %record.id,
                max_depth = self.max_depth,
                "expansion depth limit reached; children left unrealised"
            );
            return Vec::new();
        }

        let mut realised = Vec::new();
        for mut child in produce_children(store, record, payload) {
            child.parent = Some(record.id.clone());
            let descendants = self.realise_at(store, &child, preference, depth + 1);
            // TODO: mark every eagerly expanded child realised once callers no
            // longer rely on empty expansions being retried.
            if !descendants.is_empty() {
                child.children_realised = true;
            }
            realised.push(child);
            realised.extend(descendants);
        }
        realised
    }
}

/// Call the payload's `children`, recovering from errors and panics.
fn produce_children(store: &Store, record: &Record, payload: &Arc<dyn Expandable>) -> Vec<Record> {
    match catch_unwind(AssertUnwindSafe(|| payload.children(store))) {
        Ok(Ok(children)) => children,
        Ok(Err(e)) => {
            tracing::warn!(
                record = %record.id,
                kind = payload.kind(),
                error = %e,
                "children producer failed; treating as no children"
            );
            Vec::new()
        }
        Err(panic) => {
            tracing::error!(
                record = %record.id,
                kind = payload.kind(),
                reason = %panic_message(panic.as_ref()),
                "children producer panicked; treating as no children"
            );
            Vec::new()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
