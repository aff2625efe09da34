//! Eventide CLI
//!
//! Offline tools for Eventide event store files.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics without modifying the file
//! - `dump` - Dump log records for debugging
//! - `purge` - Remove dirty and retry-exhausted events
//! - `compact` - Rewrite the log with only live events

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Eventide command-line store tools.
#[derive(Parser)]
#[command(name = "eventide")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the event log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump log records for debugging
    Dump {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Remove dirty events and events that ran out of retries
    Purge {
        /// Retry count at which an event is removed
        #[arg(short, long, default_value = "3")]
        max_retries: u32,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Rewrite the log with only live events
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Event log path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Dump { limit, format } => {
            let path = cli.path.ok_or("Event log path required for dump")?;
            commands::dump::run(&path, limit, &format)?;
        }
        Commands::Purge {
            max_retries,
            dry_run,
        } => {
            let path = cli.path.ok_or("Event log path required for purge")?;
            commands::purge::run(&path, max_retries, dry_run)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Event log path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Version => {
            println!("Eventide CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
