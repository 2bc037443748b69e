//! CLI argument parsing for kvstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kv")]
#[command(author, version, about = "Inspect and edit a kvstore directory", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides config)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the value stored under a key
    Get {
        /// Key to read
        #[arg(required = true)]
        key: String,
    },

    /// Store a JSON value under a key
    Set {
        /// Key to write
        #[arg(required = true)]
        key: String,

        /// JSON document to store
        #[arg(required = true)]
        value: String,
    },

    /// Delete a key
    Remove {
        /// Key to delete
        #[arg(required = true)]
        key: String,
    },

    /// List all keys
    Keys,

    /// Show total stored bytes
    Size,
}
