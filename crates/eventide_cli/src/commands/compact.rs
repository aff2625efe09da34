//! Compact command implementation.

use super::{format_size, open_store};
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(path)?;
    let stats = store.stats();

    println!("Compacting event log at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();
    println!("Compaction Analysis:");
    println!("  Live events: {}", stats.events);
    println!("  Size before: {}", format_size(stats.log_bytes));
    println!("  Size after:  {}", format_size(stats.live_bytes));
    println!(
        "  Space saved: {} ({:.1}%)",
        format_size(stats.log_bytes.saturating_sub(stats.live_bytes)),
        if stats.log_bytes > 0 {
            (stats.log_bytes.saturating_sub(stats.live_bytes)) as f64 / stats.log_bytes as f64
                * 100.0
        } else {
            0.0
        }
    );

    if dry_run {
        return Ok(());
    }

    println!();
    if stats.log_bytes > stats.live_bytes {
        println!("Performing compaction...");
        let report = store.compact()?;
        println!(
            "✓ Compaction complete: {} -> {}",
            format_size(report.bytes_before),
            format_size(report.bytes_after)
        );
    } else {
        println!("No compaction needed - log is already optimal");
    }

    Ok(())
}
