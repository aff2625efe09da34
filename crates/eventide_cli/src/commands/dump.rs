//! Dump command implementation.

use super::open_backend;
use eventide_storage::StorageBackend;
use eventide_store::{scan, LogRecord};
use serde::Serialize;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Framed length in bytes.
    pub len: u64,
    /// Record kind.
    pub kind: String,
    /// Event the record applies to.
    pub event_id: String,
    /// Event type (snapshots only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Retry count (snapshots only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Dirty flag (snapshots only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dirty: Option<bool>,
    /// Insertion sequence (snapshots only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let backend = open_backend(path)?;
    let records = read_records(&backend, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

/// Reads up to `limit` records from the start of the log.
pub fn read_records(
    backend: &dyn StorageBackend,
    limit: Option<usize>,
) -> Result<Vec<RecordInfo>, Box<dyn std::error::Error>> {
    let scan = scan(backend)?;
    let records = scan
        .records
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|scanned| {
            let mut info = RecordInfo {
                offset: scanned.offset,
                len: scanned.len,
                kind: format!("{:?}", scanned.record.kind()).to_uppercase(),
                event_id: scanned.record.event_id().to_string(),
                event_type: None,
                retry_count: None,
                dirty: None,
                sequence: None,
            };
            if let LogRecord::Put(stored) = scanned.record {
                info.event_type = Some(stored.event.event_type);
                info.retry_count = Some(stored.retry_count);
                info.dirty = Some(stored.dirty);
                info.sequence = Some(stored.sequence);
            }
            info
        })
        .collect();
    Ok(records)
}

fn print_text_output(records: &[RecordInfo]) {
    println!("{:>10}  {:>6}  {:<6}  {:<38}  DETAILS", "OFFSET", "LEN", "KIND", "EVENT");
    println!("{}", "-".repeat(90));

    for record in records {
        let details = match (&record.event_type, record.retry_count, record.dirty) {
            (Some(event_type), Some(retries), Some(dirty)) => format!(
                "type={} retries={}{}",
                event_type,
                retries,
                if dirty { " dirty" } else { "" }
            ),
            _ => String::new(),
        };
        println!(
            "{:>10}  {:>6}  {:<6}  {:<38}  {}",
            record.offset, record.len, record.kind, record.event_id, details
        );
    }

    println!();
    println!("Total: {} records", records.len());
}
