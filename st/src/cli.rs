//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SmartTrack - fitness tracker core
#[derive(Parser, Debug)]
#[command(
    name = "st",
    about = "Run and manage the SmartTrack application core",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/smarttrack/logs/smarttrack.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Store directory (overrides config)
    #[arg(short, long, global = true)]
    pub store: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Boot the application, render the initial route and flush on exit
    Start {
        /// Initial route (defaults to the configured default route)
        #[arg(short, long)]
        route: Option<String>,

        /// Keep all data in memory
        #[arg(long)]
        memory: bool,
    },

    /// Export every document as one JSON file
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a previously exported JSON file
    Import {
        /// File to import
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Print one document
    Get {
        /// Storage key, full (`smarttrack_sessions`) or short (`sessions`)
        #[arg(required = true)]
        key: String,
    },

    /// Show how many bytes the stored documents use
    Size,

    /// Remove legacy keys and sessions older than a year
    Cleanup,

    /// Delete every document
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// List storage keys and whether each holds data
    Keys,
}
