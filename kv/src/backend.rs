//! Backend trait shared by the file and memory stores

use async_trait::async_trait;

use crate::error::{KvError, KvResult};

/// Raw string storage keyed by name
///
/// Implementations only move strings around; serialization, caching and
/// validation belong to the caller. All methods take `&self` so a backend can
/// be shared behind an `Arc`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Read a value. `Ok(None)` means the key is absent.
    async fn get_item(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set_item(&self, key: &str, value: &str) -> KvResult<()>;

    /// Delete a value. Deleting an absent key is not an error.
    async fn remove_item(&self, key: &str) -> KvResult<()>;

    /// List all keys currently stored, sorted.
    async fn keys(&self) -> KvResult<Vec<String>>;

    /// Short human-readable description (for logs)
    fn describe(&self) -> String;
}

/// Check that a key is usable on every backend
///
/// Keys are non-empty and limited to ASCII alphanumerics, `_`, `-` and `.`,
/// and may not start with `.` (reserved for lock and temp files).
pub fn validate_key(key: &str) -> KvResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(KvError::InvalidKey(key.to_string()))
    }
}

/// Bytes an entry counts against the quota (key plus value)
pub fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}
