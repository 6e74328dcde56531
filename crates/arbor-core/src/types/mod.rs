//! # Core Type Definitions
//!
//! This module contains the data model of the Arbor result store:
//! - Record identifiers and classifiers (`RecordId`, `Namespace`, `Tag`)
//! - The record payload sum type (`Payload`) and the `Expandable` capability
//! - The stored unit itself (`Record`)
//! - Error types (`StoreError`, `ExpandError`)
//!
//! ## Equality
//!
//! Listeners compare record subsets with full structural equality, so every
//! type here implements `PartialEq`. Expandable payloads are compared by
//! identity first, then by kind and display fields.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::store::Store;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier of a record within the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Create a new record id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Three-part classifier of a record: `provider/service/kind`.
///
/// Purely descriptive. The store only uses it for filtering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// The provider that produced the record, e.g. `os`.
    pub provider: String,
    /// The service within the provider, e.g. `fs`.
    pub service: String,
    /// The kind of thing the record describes, e.g. `file`.
    pub kind: String,
}

impl Namespace {
    /// Create a new namespace.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        service: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            service: service.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.service, self.kind)
    }
}

impl FromStr for Namespace {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [provider, service, kind]
                if !provider.is_empty() && !service.is_empty() && !kind.is_empty() =>
            {
                Ok(Self::new(*provider, *service, *kind))
            }
            _ => Err(StoreError::InvalidNamespace(s.to_string())),
        }
    }
}

/// Opaque marker attached to a record, e.g. `has-update` or `show-children`.
///
/// The store never interprets tags; presentation layers do.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(pub String);

impl Tag {
    /// Create a new tag.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// EXPANDABLE CAPABILITY
// =============================================================================

/// How aggressively a payload's children are materialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionPolicy {
    /// Expand immediately and recursively.
    #[default]
    Eager,
    /// Never expand.
    Suppressed,
    /// Expand only when a caller explicitly asks for the children.
    Deferred,
}

/// Capability of a domain payload to lazily produce child records.
///
/// Implemented by collaborators (directory listings, settings groups, ...).
/// `keys` and `fields` exist for display only; the store itself relies on
/// `kind`, `policy` and `children`.
pub trait Expandable: Send + Sync + fmt::Debug {
    /// Name of the payload kind, e.g. `dir`.
    fn kind(&self) -> &str;

    /// Ordered list of field names for tabular display.
    fn keys(&self) -> Vec<String> {
        self.fields().into_keys().collect()
    }

    /// Display fields of this payload.
    fn fields(&self) -> BTreeMap<String, String>;

    /// Declared expansion policy.
    fn policy(&self) -> ExpansionPolicy {
        ExpansionPolicy::Eager
    }

    /// Produce the direct children of this payload.
    ///
    /// Returned records must not have their parent set; the expansion engine
    /// assigns it.
    fn children(&self, store: &Store) -> Result<Vec<Record>, ExpandError>;
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// The domain value carried by a record.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// No payload.
    #[default]
    Empty,
    /// A scalar or free-form structured value.
    Value(serde_json::Value),
    /// A domain payload that can produce child records.
    Expandable(Arc<dyn Expandable>),
}

impl Payload {
    /// Wrap a domain payload.
    #[must_use]
    pub fn expandable<E: Expandable + 'static>(payload: E) -> Self {
        Self::Expandable(Arc::new(payload))
    }

    /// Returns the expandable payload, if this is one.
    #[must_use]
    pub fn as_expandable(&self) -> Option<&Arc<dyn Expandable>> {
        match self {
            Self::Expandable(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the plain value, if this is one.
    #[must_use]
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Check if there is no payload at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Value(a), Self::Value(b)) => a == b,
            (Self::Expandable(a), Self::Expandable(b)) => {
                Arc::ptr_eq(a, b) || (a.kind() == b.kind() && a.fields() == b.fields())
            }
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// A Record (a "result") is the atomic unit of stored data.
///
/// Records form a forest through `parent`. A record whose payload is
/// expandable may have its descendants materialised lazily; once that has
/// happened `children_realised` is set and expansion is never repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Unique id within the store.
    pub id: RecordId,
    /// Descriptive classifier.
    pub ns: Namespace,
    /// Domain payload.
    pub payload: Payload,
    /// Parent record, `None` for top-level records.
    pub parent: Option<RecordId>,
    /// Whether descendants have been computed and inserted.
    pub children_realised: bool,
    /// Opaque markers for presentation layers.
    pub tags: BTreeSet<Tag>,
}

impl Record {
    /// Create a new top-level record with no payload.
    #[must_use]
    pub fn new(id: impl Into<RecordId>, ns: Namespace) -> Self {
        Self {
            id: id.into(),
            ns,
            payload: Payload::Empty,
            parent: None,
            children_realised: false,
            tags: BTreeSet::new(),
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the parent.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<RecordId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(Tag::new(tag));
        self
    }

    /// Check whether this record carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.as_str() == tag)
    }

    /// Check whether this is a top-level record.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Arbor store.
///
/// Rejected mutations are logged, not returned; these variants surface only
/// from facade calls that cannot produce a meaningful answer otherwise.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record id occurs more than once where uniqueness is required.
    #[error("Duplicate record id: {0}")]
    DuplicateId(RecordId),

    /// The requested record does not exist.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    /// A namespace string is not of the form `provider/service/kind`.
    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// The mutation worker has stopped.
    #[error("Mutation worker is gone")]
    WorkerGone,

    /// A handle was waited on from inside the mutation worker itself.
    #[error("Cannot wait for a mutation from inside the mutation worker")]
    ReentrantWait,

    /// The store configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A provider service could not be resolved or failed.
    #[error(transparent)]
    Service(#[from] crate::provider::ServiceError),
}

/// Failure of an `Expandable::children` call.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// The payload could not read its source data.
    #[error("I/O error while expanding: {0}")]
    Io(String),

    /// Any other failure.
    #[error("Expansion failed: {0}")]
    Failed(String),
}

impl From<std::io::Error> for ExpandError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
