//! # Listener Dispatcher
//!
//! Replays every applied state through the registered listeners.
//!
//! Each listener owns an explicit memo (`previous`) of the subset it last
//! reported. After a mutation the dispatcher recomputes the filtered subset,
//! compares it structurally with the memo and only invokes the callback when
//! the two differ. The memo starts empty, so a listener whose filter matches
//! nothing is never called.

use crate::Record;
use crate::scheduler::panic_message;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Predicate selecting the records a listener cares about.
pub type FilterFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Callback receiving `(previous, current)` subsets.
pub type ChangeFn = Arc<dyn Fn(&[Record], &[Record]) + Send + Sync>;

/// Identity of a listener, used in logs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub String);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered filter + callback pair with its memoized subset.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    filter: FilterFn,
    on_change: ChangeFn,
    previous: Vec<Record>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("previous", &self.previous.len())
            .finish()
    }
}

impl Listener {
    /// Create a listener with an empty memo.
    pub fn new(id: impl Into<String>, filter: FilterFn, on_change: ChangeFn) -> Self {
        Self {
            id: ListenerId(id.into()),
            filter,
            on_change,
            previous: Vec::new(),
        }
    }

    /// The listener's identity.
    #[must_use]
    pub fn id(&self) -> &ListenerId {
        &self.id
    }

    /// The subset this listener was last invoked with.
    #[must_use]
    pub fn previous(&self) -> &[Record] {
        &self.previous
    }

    /// Evaluate the listener against `records`, firing on change.
    ///
    /// Returns `true` if the callback was invoked.
    fn evaluate(&mut self, records: &[Record]) -> bool {
        let current: Vec<Record> = records
            .iter()
            .filter(|r| (self.filter)(*r))
            .cloned()
            .collect();

        if current == self.previous {
            return false;
        }

        let previous = std::mem::replace(&mut self.previous, current);
        (self.on_change)(&previous, &self.previous);
        true
    }
}

/// Run every listener against the freshly applied `records`.
///
/// A panicking filter or callback is recovered here and logged with the
/// listener's id; the remaining listeners still run. Returns how many
/// callbacks fired.
pub(crate) fn dispatch(records: &[Record], listeners: &mut [Listener]) -> usize {
    let mut fired = 0;
    for listener in listeners.iter_mut() {
        match catch_unwind(AssertUnwindSafe(|| listener.evaluate(records))) {
            Ok(true) => fired += 1,
            Ok(false) => {}
            Err(panic) => {
                tracing::error!(
                    listener = %listener.id,
                    reason = %panic_message(panic.as_ref()),
                    "listener panicked; continuing with remaining listeners"
                );
            }
        }
    }
    fired
}

// =============================================================================
// TESTS
// =============================================================================
