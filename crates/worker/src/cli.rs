//! Command-line arguments.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

/// Combat-log ingestion worker.
#[derive(Parser, Debug)]
#[command(name = "raidlog-worker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the persistent retry queue until interrupted.
    Run,

    /// Watch a log directory for one event, alongside the retry queue.
    Watch(WatchArgs),

    /// Record permalinks, log files or directories of log files for an event.
    Ingest {
        #[arg(short, long)]
        event: String,

        /// Permalinks, log files or directories (walked recursively).
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Drop and rebuild every metric row of an event.
    Recompute {
        #[arg(short, long)]
        event: String,
    },

    /// Repair missing metrics, then print the event summary as JSON.
    Summary {
        #[arg(short, long)]
        event: String,
    },
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[arg(short, long)]
    pub event: String,

    /// Event start (RFC 3339).
    #[arg(long)]
    pub start: DateTime<Utc>,

    /// Event end (RFC 3339).
    #[arg(long)]
    pub end: DateTime<Utc>,

    /// Log directory; defaults to `LOG_DIR`.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Channel the event was announced in.
    #[arg(long)]
    pub channel: Option<i64>,
}
