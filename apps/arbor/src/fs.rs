//! # Filesystem Provider
//!
//! Exposes directories as records. A directory record carries a
//! [`DirListing`] payload whose children are the directory's entries; the
//! listing is deferred, so nested directories are only read when a caller
//! asks for their children.
//!
//! Record ids are the entries' paths. Namespaces are `os/fs/dir` and
//! `os/fs/file`.

use arbor_core::{
    ArgDef, ExpandError, Expandable, ExpansionPolicy, Namespace, Payload, Provider, Record,
    Service, ServiceArgs, ServiceError, Store,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Provider id of the filesystem provider.
pub const PROVIDER_ID: &str = "os/fs";

/// Service id of the directory listing service.
pub const LIST_SERVICE_ID: &str = "list";

/// Tag attached to dot-files.
pub const HIDDEN_TAG: &str = "hidden";

fn dir_ns() -> Namespace {
    Namespace::new("os", "fs", "dir")
}

fn file_ns() -> Namespace {
    Namespace::new("os", "fs", "file")
}

/// Lazily listed directory contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub path: PathBuf,
    pub show_hidden: bool,
}

impl DirListing {
    pub fn new(path: impl Into<PathBuf>, show_hidden: bool) -> Self {
        Self {
            path: path.into(),
            show_hidden,
        }
    }

    /// Read the directory, sorted by name.
    fn entries(&self) -> Result<Vec<Record>, ExpandError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if !self.show_hidden && is_hidden(&entry.path()) {
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            records.push(path_record(&path, self.show_hidden)?);
        }
        Ok(records)
    }
}

impl Expandable for DirListing {
    fn kind(&self) -> &str {
        "dir-listing"
    }

    fn fields(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("path".to_string(), self.path.display().to_string())])
    }

    fn policy(&self) -> ExpansionPolicy {
        ExpansionPolicy::Deferred
    }

    fn children(&self, _store: &Store) -> Result<Vec<Record>, ExpandError> {
        let records = self.entries()?;
        tracing::debug!(path = %self.path.display(), entries = records.len(), "directory listed");
        Ok(records)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Build the record for a single path: a listable directory or a file
/// carrying its size.
pub fn path_record(path: &Path, show_hidden: bool) -> Result<Record, ExpandError> {
    let metadata = std::fs::metadata(path)?;
    let id = path.display().to_string();

    let record = if metadata.is_dir() {
        Record::new(id, dir_ns()).with_payload(Payload::expandable(DirListing::new(path, show_hidden)))
    } else {
        Record::new(id, file_ns()).with_payload(serde_json::json!({ "size": metadata.len() }))
    };

    Ok(if is_hidden(path) {
        record.with_tag(HIDDEN_TAG)
    } else {
        record
    })
}

/// The filesystem provider with its `list` service.
pub fn provider(show_hidden: bool) -> Provider {
    let list = Service::new(
        LIST_SERVICE_ID,
        "List a path",
        vec![ArgDef::required("path", "Path")],
        move |_store: &Store, args: &ServiceArgs| {
            let path = args
                .get("path")
                .ok_or_else(|| ServiceError::Failed("path argument missing".to_string()))?;
            let record = path_record(Path::new(path), show_hidden)
                .map_err(|e| ServiceError::Failed(format!("{path}: {e}")))?;
            Ok(vec![record])
        },
    );
    Provider::new(PROVIDER_ID).with_service(list)
}
