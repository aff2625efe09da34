//! Inspect command implementation.

use super::{format_size, open_backend};
use eventide_storage::StorageBackend;
use eventide_store::{scan, LogRecord, StoredEvent};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Physical log size in bytes.
    pub log_size: u64,
    /// Complete records in the log.
    pub record_count: usize,
    /// Snapshot records.
    pub put_records: usize,
    /// Tombstone records.
    pub remove_records: usize,
    /// Bytes of an incomplete trailing record.
    pub torn_bytes: u64,
    /// Events currently stored.
    pub live_events: usize,
    /// Stored events marked dirty.
    pub dirty_events: usize,
    /// Encoded size of the live snapshots.
    pub live_bytes: u64,
    /// Live events per retry count.
    pub retry_histogram: BTreeMap<u32, usize>,
    /// Live events per event type.
    pub event_types: BTreeMap<String, usize>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let backend = open_backend(path)?;
    let result = analyze(&backend, path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Replays the log in memory without touching the file.
pub fn analyze(
    backend: &dyn StorageBackend,
    path: &Path,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let scan = scan(backend)?;

    let mut put_records = 0;
    let mut remove_records = 0;
    let mut live: HashMap<String, (StoredEvent, u64)> = HashMap::new();
    for scanned in &scan.records {
        match &scanned.record {
            LogRecord::Put(stored) => {
                put_records += 1;
                live.insert(stored.id().to_string(), (stored.clone(), scanned.len));
            }
            LogRecord::Remove(id) => {
                remove_records += 1;
                live.remove(id);
            }
        }
    }

    let mut retry_histogram = BTreeMap::new();
    let mut event_types = BTreeMap::new();
    for (stored, _) in live.values() {
        *retry_histogram.entry(stored.retry_count).or_insert(0) += 1;
        *event_types
            .entry(stored.event.event_type.clone())
            .or_insert(0) += 1;
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: scan.total_len,
        record_count: scan.records.len(),
        put_records,
        remove_records,
        torn_bytes: scan.total_len - scan.valid_len,
        live_events: live.len(),
        dirty_events: live.values().filter(|(s, _)| s.dirty).count(),
        live_bytes: live.values().map(|(_, len)| len).sum(),
        retry_histogram,
        event_types,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Eventide Store Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:           {}", format_size(result.log_size));
    println!("  Records:        {}", result.record_count);
    println!("  Put records:    {}", result.put_records);
    println!("  Remove records: {}", result.remove_records);
    if result.torn_bytes > 0 {
        println!("  Torn tail:      {} (dropped on next open)", format_size(result.torn_bytes));
    }
    println!();
    println!("Events:");
    println!("  Live:       {}", result.live_events);
    println!("  Dirty:      {}", result.dirty_events);
    println!("  Live bytes: {}", format_size(result.live_bytes));

    if !result.retry_histogram.is_empty() {
        println!();
        println!("Retry counts:");
        for (retries, count) in &result.retry_histogram {
            println!("  {:>3} retries: {} events", retries, count);
        }
    }

    if !result.event_types.is_empty() {
        println!();
        println!("Event types:");
        for (event_type, count) in &result.event_types {
            println!("  {}: {}", event_type, count);
        }
    }
}
