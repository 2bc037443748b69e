//! File-backed store: one JSON file per key

use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::{KvBackend, entry_size, validate_key};
use crate::error::{KvError, KvResult};

const LOCK_FILE: &str = ".lock";
const VALUE_EXT: &str = "json";

/// Directory-backed store
///
/// Holds an exclusive advisory lock on `<dir>/.lock` for as long as it lives,
/// so two owners can never interleave writes to the same directory.
pub struct FileBackend {
    /// Base path for storage
    base_path: PathBuf,
    /// Optional cap on the total bytes stored
    quota: Option<u64>,
    /// Held from the quota check through the rename
    write_lock: Mutex<()>,
    /// Keeps the advisory lock alive; released on drop
    _lock: File,
}

impl FileBackend {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(base_path.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .map_err(|_| KvError::Locked(base_path.clone()))?;

        debug!(?base_path, "Opened file store");
        Ok(Self {
            base_path,
            quota: None,
            write_lock: Mutex::new(()),
            _lock: lock,
        })
    }

    /// Set the byte quota (`None` = unlimited)
    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    /// Directory this store lives in
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", key, VALUE_EXT))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!(".{}.{}.tmp", key, VALUE_EXT))
    }

    /// Bytes used by every entry except `key`
    async fn used_bytes_excluding(&self, key: &str) -> KvResult<u64> {
        let mut used = 0u64;
        for other in self.keys().await? {
            if other == key {
                continue;
            }
            if let Some(value) = self.get_item(&other).await? {
                used += entry_size(&other, &value);
            }
        }
        Ok(used)
    }
}

#[async_trait]
impl KvBackend for FileBackend {
    async fn get_item(&self, key: &str) -> KvResult<Option<String>> {
        validate_key(key)?;
        match tokio::fs::read_to_string(self.item_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> KvResult<()> {
        validate_key(key)?;
        debug!(key, bytes = value.len(), "FileBackend::set_item");
        let _guard = self.write_lock.lock().await;

        if let Some(limit) = self.quota {
            let needed = self.used_bytes_excluding(key).await? + entry_size(key, value);
            if needed > limit {
                return Err(KvError::QuotaExceeded { needed, limit });
            }
        }

        // Write then rename so readers never observe a partial value
        let temp = self.temp_path(key);
        tokio::fs::write(&temp, value).await?;
        tokio::fs::rename(&temp, self.item_path(key)).await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> KvResult<()> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.item_path(key)).await {
            Ok(()) => {
                info!(key, "Removed item");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> KvResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && !name.starts_with('.')
                && let Some(key) = name.strip_suffix(&format!(".{}", VALUE_EXT))
            {
                keys.push(key.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.base_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_remove() {
        let temp = TempDir::new().unwrap();
        let store = FileBackend::open(temp.path()).unwrap();

        store.set_item("smarttrack_settings", "{\"theme\":\"dark\"}").await.unwrap();
        assert_eq!(
            store.get_item("smarttrack_settings").await.unwrap().as_deref(),
            Some("{\"theme\":\"dark\"}")
        );

        store.remove_item("smarttrack_settings").await.unwrap();
        assert_eq!(store.get_item("smarttrack_settings").await.unwrap(), None);

        // Removing twice is fine
        store.remove_item("smarttrack_settings").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_skip_lock_and_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = FileBackend::open(temp.path()).unwrap();

        store.set_item("b", "2").await.unwrap();
        store.set_item("a", "1").await.unwrap();
        fs::write(temp.path().join(".a.json.tmp"), "junk").unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let store = FileBackend::open(temp.path()).unwrap();
            store.set_item("k", "[1,2,3]").await.unwrap();
        }
        let store = FileBackend::open(temp.path()).unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn test_second_open_is_locked() {
        let temp = TempDir::new().unwrap();
        let _first = FileBackend::open(temp.path()).unwrap();
        let second = FileBackend::open(temp.path());
        assert!(matches!(second, Err(KvError::Locked(_))));
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_write_and_keeps_old_value() {
        let temp = TempDir::new().unwrap();
        let store = FileBackend::open(temp.path()).unwrap().with_quota(Some(20));

        store.set_item("k", "small").await.unwrap();
        let err = store.set_item("k", "this value is far too large").await.unwrap_err();
        assert!(matches!(err, KvError::QuotaExceeded { limit: 20, .. }));
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("small"));

        // Replacing a value only counts the new size
        store.set_item("k", "0123456789012345678").await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_quota_holds_for_concurrent_writes_to_different_keys() {
        let value = "x".repeat(60);
        for _ in 0..50 {
            let temp = TempDir::new().unwrap();
            let store = std::sync::Arc::new(FileBackend::open(temp.path()).unwrap().with_quota(Some(100)));

            let (a, b) = (store.clone(), store.clone());
            let (va, vb) = (value.clone(), value.clone());
            let first = tokio::spawn(async move { a.set_item("a", &va).await });
            let second = tokio::spawn(async move { b.set_item("b", &vb).await });
            let (first, second) = tokio::join!(first, second);

            let accepted = [first.unwrap(), second.unwrap()].iter().filter(|r| r.is_ok()).count();
            assert_eq!(accepted, 1);
            assert_eq!(store.keys().await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_invalid_key_never_touches_disk() {
        let temp = TempDir::new().unwrap();
        let store = FileBackend::open(temp.path()).unwrap();
        assert!(matches!(
            store.set_item("../outside", "x").await,
            Err(KvError::InvalidKey(_))
        ));
        assert!(!temp.path().parent().unwrap().join("outside.json").exists());
    }
}
