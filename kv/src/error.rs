//! Error types for key-value backends

use std::path::PathBuf;
use thiserror::Error;

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum KvError {
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    #[error("Quota exceeded: {needed} bytes needed, limit is {limit} bytes")]
    QuotaExceeded { needed: u64, limit: u64 },

    #[error("Store is locked by another owner: {}", .0.display())]
    Locked(PathBuf),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for backend operations
pub type KvResult<T> = Result<T, KvError>;
