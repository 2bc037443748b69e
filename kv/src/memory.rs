//! In-memory store with the same semantics as the file store

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{KvBackend, entry_size, validate_key};
use crate::error::{KvError, KvResult};

/// In-memory backend
///
/// Used for tests and for running without a data directory. The
/// `set_unavailable` switch makes every operation fail, which lets callers
/// exercise their degraded paths.
#[derive(Default)]
pub struct MemoryBackend {
    items: Mutex<BTreeMap<String, String>>,
    quota: Option<u64>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte quota (`None` = unlimited)
    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = quota;
        self
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> KvResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("memory backend switched off".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> KvResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| KvError::Unavailable("memory backend poisoned".to_string()))
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get_item(&self, key: &str) -> KvResult<Option<String>> {
        self.check_available()?;
        validate_key(key)?;
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> KvResult<()> {
        self.check_available()?;
        validate_key(key)?;
        let mut items = self.lock()?;

        if let Some(limit) = self.quota {
            let used: u64 = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = used + entry_size(key, value);
            if needed > limit {
                return Err(KvError::QuotaExceeded { needed, limit });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> KvResult<()> {
        self.check_available()?;
        validate_key(key)?;
        self.lock()?.remove(key);
        Ok(())
    }

    async fn keys(&self) -> KvResult<Vec<String>> {
        self.check_available()?;
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
