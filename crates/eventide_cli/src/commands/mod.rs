//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod purge;

use eventide_storage::FileBackend;
use eventide_store::{EventStore, StoreConfig};
use std::path::Path;

/// Opens the backend of an existing event log.
pub fn open_backend(path: &Path) -> Result<FileBackend, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("No event log found at {:?}", path).into());
    }
    Ok(FileBackend::open(path)?)
}

/// Opens an existing event log as a store, replaying it.
pub fn open_store(path: &Path) -> Result<EventStore<FileBackend>, Box<dyn std::error::Error>> {
    let backend = open_backend(path)?;
    Ok(EventStore::open(backend, StoreConfig::default())?)
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
