//! # Output and Input Types
//!
//! JSON shapes printed by `--json-mode` and accepted by `arbor load`.

use arbor_core::{Namespace, Payload, Record, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record as printed in JSON mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordJson {
    pub id: String,
    pub ns: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub children_realised: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Kind and fields of an expandable payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expandable: Option<ExpandableJson>,
}

/// Display form of an expandable payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandableJson {
    pub kind: String,
    pub fields: BTreeMap<String, String>,
}

impl From<&Record> for RecordJson {
    fn from(record: &Record) -> Self {
        let (value, expandable) = match &record.payload {
            Payload::Empty => (None, None),
            Payload::Value(v) => (Some(v.clone()), None),
            Payload::Expandable(e) => (
                None,
                Some(ExpandableJson {
                    kind: e.kind().to_string(),
                    fields: e.fields(),
                }),
            ),
        };
        Self {
            id: record.id.to_string(),
            ns: record.ns.to_string(),
            parent: record.parent.as_ref().map(|p| p.to_string()),
            children_realised: record.children_realised,
            tags: record.tags.iter().map(|t| t.as_str().to_string()).collect(),
            value,
            expandable,
        }
    }
}

/// A plain record as read by `arbor load`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordInput {
    pub id: String,
    pub ns: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RecordInput {
    /// Convert into a store record, validating the namespace.
    pub fn into_record(self) -> Result<Record, StoreError> {
        let ns: Namespace = self.ns.parse()?;
        let mut record = Record::new(self.id, ns);
        if let Some(parent) = self.parent {
            record = record.with_parent(parent);
        }
        if let Some(value) = self.value {
            record = record.with_payload(value);
        }
        for tag in self.tags {
            record = record.with_tag(tag);
        }
        Ok(record)
    }
}
