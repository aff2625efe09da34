//! Purge command implementation.

use super::open_store;
use std::path::Path;
use tracing::info;

/// Runs the purge command.
pub fn run(path: &Path, max_retries: u32, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(path)?;

    let doomed: Vec<String> = store
        .iter()
        .filter(|s| s.dirty || s.retry_count >= max_retries)
        .map(|s| s.id().to_string())
        .collect();

    println!("Purging {:?} (max retries {})", path, max_retries);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();
    for id in &doomed {
        println!("  {}", id);
    }
    println!();

    if dry_run {
        println!("{} of {} events would be removed", doomed.len(), store.len());
        return Ok(());
    }

    let removed = store.remove_dirty_and_exhausted(max_retries)?;
    info!(removed, remaining = store.len(), "Purged event log");
    println!("✓ Removed {} events, {} remain", removed, store.len());
    Ok(())
}
