//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::AppConfig;
use crate::fs;
use crate::output::{RecordInput, RecordJson};
use arbor_core::{Namespace, ProviderRegistry, Record, RecordId, ServiceArgs, Store, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a record file for `load` (100 MB).
const MAX_LOAD_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Resolve `path` to an existing regular file no larger than `max_size`.
fn validate_file(path: &Path, max_size: u64) -> Result<PathBuf, StoreError> {
    let canonical = path.canonicalize().map_err(|e| {
        StoreError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(StoreError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    let metadata = std::fs::metadata(&canonical)
        .map_err(|e| StoreError::Io(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > max_size {
        return Err(StoreError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(canonical)
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// LS COMMAND
// =============================================================================

/// One line of a listed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRow {
    pub level: usize,
    pub record: Record,
}

/// List `path` through the filesystem provider and expand directories down
/// to `depth` levels. Rows come back in display order.
pub fn list_tree(
    store: &Store,
    show_hidden: bool,
    path: &Path,
    depth: usize,
) -> Result<Vec<TreeRow>, StoreError> {
    let mut registry = ProviderRegistry::new();
    registry.register(fs::provider(show_hidden))?;

    let args = ServiceArgs::from([("path".to_string(), path.display().to_string())]);
    let roots = registry.invoke(store, fs::PROVIDER_ID, fs::LIST_SERVICE_ID, &args)?;
    store.add(roots.clone()).wait()?;

    let mut order = Vec::new();
    for root in &roots {
        order.push((0, root.id.clone()));
        walk(store, root, 0, depth, &mut order)?;
    }

    // Re-read so rows reflect what expansion stored.
    Ok(order
        .into_iter()
        .filter_map(|(level, id)| store.get(&id).map(|record| TreeRow { level, record }))
        .collect())
}

fn walk(
    store: &Store,
    record: &Record,
    level: usize,
    depth: usize,
    order: &mut Vec<(usize, RecordId)>,
) -> Result<(), StoreError> {
    if level >= depth {
        return Ok(());
    }
    for child in store.children(record)? {
        order.push((level + 1, child.id.clone()));
        walk(store, &child, level + 1, depth, order)?;
    }
    Ok(())
}

/// Show a path as a tree.
pub fn cmd_ls(
    config: &AppConfig,
    json_mode: bool,
    path: &Path,
    depth: usize,
) -> Result<(), StoreError> {
    tracing::info!(path = %path.display(), depth, "listing");

    let store = Store::with_config(config.store.clone())?;
    let rows = list_tree(&store, config.fs.show_hidden, path, depth);
    store.shutdown();
    let rows = rows?;

    if json_mode {
        let output: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                serde_json::json!({
                    "level": row.level,
                    "record": RecordJson::from(&row.record),
                })
            })
            .collect();
        print_json(&serde_json::Value::Array(output));
        return Ok(());
    }

    for row in &rows {
        let name = if row.level == 0 {
            row.record.id.to_string()
        } else {
            Path::new(row.record.id.as_str())
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| row.record.id.to_string())
        };
        let suffix = if row.record.ns.kind == "dir" { "/" } else { "" };
        println!("{}{}{}", "  ".repeat(row.level), name, suffix);
    }

    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Outcome of loading a record file.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// Records read from the file.
    pub loaded: usize,
    /// Change notifications seen by the load listener.
    pub notifications: usize,
    /// Stored records, filtered by namespace if one was given, sorted by id.
    pub records: Vec<Record>,
}

/// Read plain records from a JSON array and `set` them into `store`.
pub fn load_records(
    store: &Store,
    file: &Path,
    ns: Option<&Namespace>,
) -> Result<LoadReport, StoreError> {
    let validated = validate_file(file, MAX_LOAD_FILE_SIZE)?;
    let contents = std::fs::read(&validated)
        .map_err(|e| StoreError::Io(format!("Read file: {}", e)))?;
    let inputs: Vec<RecordInput> = serde_json::from_slice(&contents)
        .map_err(|e| StoreError::Io(format!("Invalid record file: {}", e)))?;
    let records = inputs
        .into_iter()
        .map(RecordInput::into_record)
        .collect::<Result<Vec<_>, _>>()?;
    let loaded = records.len();

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    let watched = ns.cloned();
    store
        .add_listener(
            "load",
            move |r| watched.as_ref().is_none_or(|ns| &r.ns == ns),
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .wait()?;
    store.set(records).wait()?;

    let records = match ns {
        Some(ns) => store.filter_by_ns(ns),
        None => store.filter(|_| true),
    };

    Ok(LoadReport {
        loaded,
        notifications: notifications.load(Ordering::SeqCst),
        records,
    })
}

/// Load records from a file and print them.
pub fn cmd_load(
    config: &AppConfig,
    json_mode: bool,
    quiet: bool,
    file: &Path,
    ns: Option<&str>,
) -> Result<(), StoreError> {
    tracing::info!(file = %file.display(), "loading records");

    let ns = ns.map(str::parse::<Namespace>).transpose()?;
    let store = Store::with_config(config.store.clone())?;
    let report = load_records(&store, file, ns.as_ref());
    store.shutdown();
    let report = report?;

    if json_mode {
        let records: Vec<RecordJson> = report.records.iter().map(RecordJson::from).collect();
        print_json(&serde_json::json!({
            "loaded": report.loaded,
            "notifications": report.notifications,
            "records": records,
        }));
        return Ok(());
    }

    for record in &report.records {
        let value = record
            .payload
            .as_value()
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!("{}  {}  {}", record.id, record.ns, value);
    }
    if !quiet {
        println!();
        println!(
            "Loaded {} records ({} shown, {} change notifications)",
            report.loaded,
            report.records.len(),
            report.notifications
        );
    }

    Ok(())
}

// =============================================================================
// CONFIG COMMAND
// =============================================================================

/// Show the effective configuration.
pub fn cmd_config(config: &AppConfig, json_mode: bool) -> Result<(), StoreError> {
    if json_mode {
        let output = serde_json::to_value(config)
            .map_err(|e| StoreError::Config(format!("Cannot render config: {}", e)))?;
        print_json(&output);
        return Ok(());
    }

    println!("Arbor Configuration");
    println!("===================");
    println!("[store]");
    println!("queue_capacity      = {}", config.store.queue_capacity);
    println!("max_expansion_depth = {}", config.store.max_expansion_depth);
    println!();
    println!("[fs]");
    println!("show_hidden         = {}", config.fs.show_hidden);

    Ok(())
}
