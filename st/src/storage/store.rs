//! Storage - cached, validated document store over a key-value backend
//!
//! The in-memory cache is the source of truth for reads. The backend is only
//! read during `init` (and on a cache miss before it); every write goes
//! through the cache first and is then persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Months, NaiveDate, Utc};
use kvstore::{KvBackend, KvError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::keys::StorageKey;
use super::validation::validate;
use crate::events::{EventBus, names};
use crate::notify::{Notification, Notifier};

/// Sentinel key written and removed by the availability probe
const PROBE_KEY: &str = "__storage_test__";

/// Whether writes reach the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageMode {
    /// Writes are persisted to the backend
    Persistent,
    /// Backend unusable or disabled; data lives only in the cache
    MemoryOnly,
}

/// Storage settings
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Version string stamped into exports
    pub version: String,
    /// Obsolete keys removed by `cleanup`
    pub legacy_keys: Vec<String>,
    /// Skip the backend entirely
    pub memory_only: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            legacy_keys: Vec::new(),
            memory_only: false,
        }
    }
}

/// Bytes used by the persisted documents
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageSize {
    pub bytes: u64,
    pub kb: f64,
    pub mb: f64,
}

impl StorageSize {
    fn from_bytes(bytes: u64) -> Self {
        let round = |v: f64| (v * 100.0).round() / 100.0;
        Self {
            bytes,
            kb: round(bytes as f64 / 1024.0),
            mb: round(bytes as f64 / (1024.0 * 1024.0)),
        }
    }
}

/// What a cleanup pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub legacy_keys_removed: usize,
    pub sessions_pruned: usize,
}

/// Full snapshot of every storage key, in the export/import wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Current value of each storage key (null when absent)
    #[serde(flatten)]
    pub data: BTreeMap<String, Value>,
    #[serde(rename = "exportDate")]
    pub export_date: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Error)]
enum PersistError {
    #[error("backend: {0}")]
    Backend(#[from] KvError),

    #[error("serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cached, validated store for the fixed set of domain documents
pub struct Storage {
    backend: Arc<dyn KvBackend>,
    bus: EventBus,
    notifier: Option<Arc<dyn Notifier>>,
    options: StorageOptions,
    memory_only: AtomicBool,
    cache: RwLock<HashMap<StorageKey, Option<Value>>>,
    unsaved: AtomicBool,
    /// Serializes cache-update-then-persist per key
    write_locks: [Mutex<()>; StorageKey::ALL.len()],
}

impl Storage {
    pub fn new(backend: Arc<dyn KvBackend>, bus: EventBus, options: StorageOptions) -> Self {
        debug!(backend = %backend.describe(), memory_only = options.memory_only, "Storage::new");
        let memory_only = AtomicBool::new(options.memory_only);
        Self {
            backend,
            bus,
            notifier: None,
            options,
            memory_only,
            cache: RwLock::new(HashMap::new()),
            unsaved: AtomicBool::new(false),
            write_locks: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    /// Attach a notifier for user-facing failure messages
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn cache_read(&self) -> RwLockReadGuard<'_, HashMap<StorageKey, Option<Value>>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn cache_write(&self) -> RwLockWriteGuard<'_, HashMap<StorageKey, Option<Value>>> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, notification: Notification) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(notification);
        }
    }

    pub fn mode(&self) -> StorageMode {
        if self.memory_only.load(Ordering::SeqCst) {
            StorageMode::MemoryOnly
        } else {
            StorageMode::Persistent
        }
    }

    fn is_memory_only(&self) -> bool {
        self.memory_only.load(Ordering::SeqCst)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved.load(Ordering::SeqCst)
    }

    /// Probe the backend, load every key into the cache, then clean up
    ///
    /// Never fails: an unusable backend downgrades to memory-only mode and
    /// unreadable documents are cached as absent.
    pub async fn init(&self) -> StorageMode {
        debug!("Storage::init: called");
        if !self.is_memory_only() && !self.probe().await {
            warn!(backend = %self.backend.describe(), "Persistent storage unavailable, using memory-only mode");
            self.memory_only.store(true, Ordering::SeqCst);
        }

        let mut loaded = 0;
        for key in StorageKey::ALL {
            let value = self.load(key).await;
            if value.is_some() {
                loaded += 1;
            }
            self.cache_write().insert(key, value);
        }
        info!(loaded, mode = ?self.mode(), "Storage initialized");

        let report = self.cleanup().await;
        debug!(?report, "Storage::init: cleanup finished");
        self.mode()
    }

    /// Write, read back and delete a sentinel key
    async fn probe(&self) -> bool {
        let result: Result<bool, KvError> = async {
            self.backend.set_item(PROBE_KEY, PROBE_KEY).await?;
            let read = self.backend.get_item(PROBE_KEY).await?;
            self.backend.remove_item(PROBE_KEY).await?;
            Ok(read.as_deref() == Some(PROBE_KEY))
        }
        .await;

        match result {
            Ok(ok) => ok,
            Err(e) => {
                debug!(error = %e, "Storage::probe: backend failed");
                false
            }
        }
    }

    /// Read one document from the backend; parse failures yield `None`
    async fn load(&self, key: StorageKey) -> Option<Value> {
        if self.is_memory_only() {
            return None;
        }
        match self.backend.get_item(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Null) => None,
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(%key, error = %e, "Failed to parse stored document, treating as absent");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(%key, error = %e, "Failed to read stored document, treating as absent");
                None
            }
        }
    }

    async fn persist(&self, key: StorageKey, value: &Value) -> Result<(), PersistError> {
        if self.is_memory_only() {
            return Ok(());
        }
        if value.is_null() {
            self.backend.remove_item(key.as_str()).await?;
        } else {
            let raw = serde_json::to_string(value)?;
            self.backend.set_item(key.as_str(), &raw).await?;
        }
        Ok(())
    }

    /// Current value for a key (`None` when absent)
    pub async fn get(&self, key: StorageKey) -> Option<Value> {
        if let Some(cached) = self.cache_read().get(&key) {
            return cached.clone();
        }
        debug!(%key, "Storage::get: cache miss");
        let value = self.load(key).await;
        self.cache_write().insert(key, value.clone());
        value
    }

    /// Current value deserialized into `T`; `None` when absent or mis-shaped
    pub async fn get_as<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(%key, error = %e, "Stored document does not match the expected type");
                None
            }
        }
    }

    /// Validate, cache and persist a document
    ///
    /// `Value::Null` deletes the persisted entry and caches the key as absent.
    /// Returns false when validation or persistence fails; a failed persist
    /// leaves the cache updated and the unsaved flag set for the next auto-save.
    pub async fn set(&self, key: StorageKey, value: Value) -> bool {
        let _guard = self.write_locks[key.index()].lock().await;

        if !value.is_null()
            && let Err(e) = validate(key, &value)
        {
            warn!(%key, error = %e, "Rejected invalid document");
            self.notify(Notification::error(format!("Invalid data for {}", key)));
            return false;
        }

        let cached = if value.is_null() { None } else { Some(value.clone()) };
        self.cache_write().insert(key, cached);
        self.unsaved.store(true, Ordering::SeqCst);

        if let Err(e) = self.persist(key, &value).await {
            error!(%key, error = %e, "Failed to persist document");
            self.notify(Notification::error(format!("Failed to save {}", key)));
            return false;
        }

        debug!(%key, "Storage::set: saved");
        self.bus
            .emit(names::STORAGE_SAVED, json!({ "key": key.as_str(), "value": value }));
        true
    }

    /// Serialize `value` and store it
    pub async fn set_as<T: Serialize>(&self, key: StorageKey, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value).await,
            Err(e) => {
                error!(%key, error = %e, "Failed to serialize document");
                self.notify(Notification::error(format!("Failed to save {}", key)));
                false
            }
        }
    }

    /// Drop a key from the cache and the backend
    pub async fn remove(&self, key: StorageKey) -> bool {
        let _guard = self.write_locks[key.index()].lock().await;
        debug!(%key, "Storage::remove: called");

        self.cache_write().remove(&key);
        self.unsaved.store(true, Ordering::SeqCst);

        if !self.is_memory_only()
            && let Err(e) = self.backend.remove_item(key.as_str()).await
        {
            error!(%key, error = %e, "Failed to remove document");
            return false;
        }

        self.bus.emit(names::STORAGE_REMOVED, json!({ "key": key.as_str() }));
        true
    }

    /// Re-validate and re-persist every cached key
    ///
    /// Best effort: individual failures are logged and the unsaved flag is
    /// cleared regardless.
    pub async fn save_all(&self) -> bool {
        if !self.has_unsaved_changes() {
            debug!("Storage::save_all: nothing to save");
            return true;
        }

        let snapshot: Vec<(StorageKey, Value)> = {
            let cache = self.cache_read();
            StorageKey::ALL
                .into_iter()
                .filter_map(|key| cache.get(&key).map(|v| (key, v.clone().unwrap_or(Value::Null))))
                .collect()
        };

        let total = snapshot.len();
        let mut saved = 0;
        for (key, value) in snapshot {
            if self.set(key, value).await {
                saved += 1;
            }
        }

        self.unsaved.store(false, Ordering::SeqCst);
        info!(saved, total, "Saved all data");
        true
    }

    /// Flush only when there are unsaved changes. Returns true if a flush ran.
    pub async fn auto_save(&self) -> bool {
        if self.has_unsaved_changes() {
            debug!("Storage::auto_save: flushing");
            self.save_all().await;
            true
        } else {
            false
        }
    }

    /// Deep snapshot of every key plus export metadata
    pub async fn export_data(&self) -> ExportDocument {
        let mut data = BTreeMap::new();
        for key in StorageKey::ALL {
            data.insert(key.as_str().to_string(), self.get(key).await.unwrap_or(Value::Null));
        }
        ExportDocument {
            data,
            export_date: Utc::now(),
            version: self.options.version.clone(),
        }
    }

    /// Write every storage key present in `data`
    ///
    /// Emits `storage:imported` with the number of accepted keys and a backup
    /// taken before any write. Returns true when every present key was accepted.
    pub async fn import_data(&self, data: &Value) -> bool {
        let Some(map) = data.as_object() else {
            warn!("Import rejected: document is not an object");
            return false;
        };

        let backup = self.export_data().await;
        let mut imported = 0;
        let mut failed = 0;

        for key in StorageKey::ALL {
            if let Some(value) = map.get(key.as_str()) {
                if self.set(key, value.clone()).await {
                    imported += 1;
                } else {
                    failed += 1;
                }
            }
        }

        info!(imported, failed, "Import finished");
        self.bus.emit(
            names::STORAGE_IMPORTED,
            json!({ "imported": imported, "failed": failed, "backup": backup }),
        );
        failed == 0
    }

    /// Remove legacy keys and prune sessions older than a year
    pub async fn cleanup(&self) -> CleanupReport {
        self.cleanup_at(Utc::now()).await
    }

    /// `cleanup` against an explicit clock
    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();

        if !self.is_memory_only() {
            for legacy in &self.options.legacy_keys {
                let removed = async {
                    if self.backend.get_item(legacy).await?.is_none() {
                        return Ok(false);
                    }
                    self.backend.remove_item(legacy).await?;
                    Ok::<bool, KvError>(true)
                }
                .await;
                match removed {
                    Ok(true) => report.legacy_keys_removed += 1,
                    Ok(false) => {}
                    Err(e) => warn!(key = %legacy, error = %e, "Failed to remove legacy key"),
                }
            }
        }

        let cutoff = now.checked_sub_months(Months::new(12)).unwrap_or(now);
        if let Some(Value::Array(sessions)) = self.get(StorageKey::Sessions).await {
            let before = sessions.len();
            let kept: Vec<Value> = sessions
                .into_iter()
                .filter(|session| !session_is_older_than(session, cutoff))
                .collect();
            let pruned = before - kept.len();

            if pruned > 0 {
                if self.set(StorageKey::Sessions, Value::Array(kept)).await {
                    info!(pruned, %cutoff, "Pruned old sessions");
                    report.sessions_pruned = pruned;
                } else {
                    warn!(pruned, "Session pruning rejected, sessions left unchanged");
                }
            }
        }

        report
    }

    /// Remove every key from the cache and the backend
    pub async fn clear(&self) -> bool {
        debug!("Storage::clear: called");
        let mut ok = true;
        for key in StorageKey::ALL {
            let _guard = self.write_locks[key.index()].lock().await;
            self.cache_write().remove(&key);
            if !self.is_memory_only()
                && let Err(e) = self.backend.remove_item(key.as_str()).await
            {
                error!(%key, error = %e, "Failed to clear document");
                ok = false;
            }
        }
        self.unsaved.store(false, Ordering::SeqCst);
        info!("Storage cleared");
        self.bus.emit(names::STORAGE_CLEARED, Value::Null);
        ok
    }

    /// Serialized size of every persisted storage key
    pub async fn get_storage_size(&self) -> StorageSize {
        if self.is_memory_only() {
            return StorageSize::from_bytes(0);
        }
        let mut bytes = 0u64;
        for key in StorageKey::ALL {
            if let Ok(Some(raw)) = self.backend.get_item(key.as_str()).await {
                bytes += raw.len() as u64;
            }
        }
        StorageSize::from_bytes(bytes)
    }
}

/// Sessions with an unparseable date are kept
fn session_is_older_than(session: &Value, cutoff: DateTime<Utc>) -> bool {
    session
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_session_date)
        .is_some_and(|date| date < cutoff)
}

fn parse_session_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotificationKind, RecordingNotifier};
    use chrono::TimeZone;
    use kvstore::MemoryBackend;

    fn exercise(id: &str) -> Value {
        json!({"id": id, "name": "Squat", "muscleGroup": "legs", "isUnilateral": false})
    }

    async fn storage_with(backend: Arc<MemoryBackend>) -> (Storage, EventBus, Arc<RecordingNotifier>) {
        let bus = EventBus::with_defaults();
        let notifier = Arc::new(RecordingNotifier::new());
        let storage = Storage::new(backend, bus.clone(), StorageOptions::default()).with_notifier(notifier.clone());
        storage.init().await;
        (storage, bus, notifier)
    }

    async fn storage() -> (Storage, EventBus, Arc<RecordingNotifier>) {
        storage_with(Arc::new(MemoryBackend::new())).await
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (storage, bus, _) = storage().await;
        let doc = json!([exercise("e1")]);

        assert!(storage.set(StorageKey::Exercises, doc.clone()).await);
        assert_eq!(storage.get(StorageKey::Exercises).await, Some(doc.clone()));
        assert!(storage.has_unsaved_changes());

        let saved = bus.filter_events("^storage:saved$").unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].data["key"], "smarttrack_exercises");
        assert_eq!(saved[0].data["value"], doc);
    }

    #[tokio::test]
    async fn test_invalid_set_leaves_value_unchanged() {
        let (storage, bus, notifier) = storage().await;
        let good = json!([exercise("e1")]);
        storage.set(StorageKey::Exercises, good.clone()).await;
        bus.clear_history();

        let bad = json!([{"name": "No id", "muscleGroup": "legs", "isUnilateral": false}]);
        assert!(!storage.set(StorageKey::Exercises, bad).await);

        assert_eq!(storage.get(StorageKey::Exercises).await, Some(good));
        assert_eq!(notifier.count(NotificationKind::Error), 1);
        assert!(bus.filter_events("^storage:saved$").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_deletes_persisted_entry() {
        let backend = Arc::new(MemoryBackend::new());
        let (storage, _, _) = storage_with(backend.clone()).await;

        storage.set(StorageKey::Settings, json!({"units": "kg"})).await;
        assert!(backend.get_item("smarttrack_settings").await.unwrap().is_some());

        assert!(storage.set(StorageKey::Settings, Value::Null).await);
        assert!(backend.get_item("smarttrack_settings").await.unwrap().is_none());
        assert_eq!(storage.get(StorageKey::Settings).await, None);
    }

    #[tokio::test]
    async fn test_init_loads_and_tolerates_corrupt_documents() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_item("smarttrack_settings", "{\"units\":\"lb\"}").await.unwrap();
        backend.set_item("smarttrack_sessions", "{not json").await.unwrap();

        let (storage, _, _) = storage_with(backend).await;

        assert_eq!(storage.mode(), StorageMode::Persistent);
        assert_eq!(storage.get(StorageKey::Settings).await, Some(json!({"units": "lb"})));
        assert_eq!(storage.get(StorageKey::Sessions).await, None);
    }

    #[tokio::test]
    async fn test_unavailable_backend_falls_back_to_memory() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_unavailable(true);
        let (storage, _, _) = storage_with(backend.clone()).await;

        assert_eq!(storage.mode(), StorageMode::MemoryOnly);
        assert!(storage.set(StorageKey::Exercises, json!([exercise("e1")])).await);
        assert_eq!(storage.get(StorageKey::Exercises).await, Some(json!([exercise("e1")])));
        assert_eq!(storage.get_storage_size().await.bytes, 0);
    }

    #[tokio::test]
    async fn test_write_through_failure_returns_false_and_notifies() {
        let backend = Arc::new(MemoryBackend::new());
        let (storage, _, notifier) = storage_with(backend.clone()).await;
        backend.set_unavailable(true);

        assert!(!storage.set(StorageKey::Records, json!({"bench": 100})).await);
        assert_eq!(
            notifier.notifications().last().map(|n| n.message.clone()),
            Some("Failed to save smarttrack_records".to_string())
        );
        // Cache keeps the value so the next auto-save can retry
        assert_eq!(storage.get(StorageKey::Records).await, Some(json!({"bench": 100})));
        assert!(storage.has_unsaved_changes());

        backend.set_unavailable(false);
        assert!(storage.auto_save().await);
        assert_eq!(
            backend.get_item("smarttrack_records").await.unwrap().as_deref(),
            Some("{\"bench\":100}")
        );
        assert!(!storage.has_unsaved_changes());
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_a_failed_save() {
        let backend = Arc::new(MemoryBackend::new().with_quota(Some(64)));
        let (storage, _, notifier) = storage_with(backend).await;

        let huge = json!({"blob": "x".repeat(200)});
        assert!(!storage.set(StorageKey::Photos, huge).await);
        assert_eq!(notifier.count(NotificationKind::Error), 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let backend = Arc::new(MemoryBackend::new());
        let (storage, bus, _) = storage_with(backend.clone()).await;
        storage.set(StorageKey::Programs, json!([{"name": "5x5"}])).await;
        let size_before = storage.get_storage_size().await.bytes;
        assert!(size_before > 0);

        assert!(storage.remove(StorageKey::Programs).await);
        assert_eq!(storage.get(StorageKey::Programs).await, None);
        assert_eq!(storage.get_storage_size().await.bytes, 0);
        assert_eq!(bus.filter_events("^storage:removed$").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_all_and_auto_save() {
        let backend = Arc::new(MemoryBackend::new());
        let (storage, _, _) = storage_with(backend.clone()).await;

        assert!(!storage.auto_save().await);
        assert!(storage.save_all().await);

        storage.set(StorageKey::Settings, json!({"units": "kg"})).await;
        assert!(storage.auto_save().await);
        assert!(!storage.has_unsaved_changes());
        assert!(!storage.auto_save().await);
    }

    #[tokio::test]
    async fn test_export_clear_import_restores() {
        let (storage, bus, _) = storage().await;
        storage.set(StorageKey::Exercises, json!([exercise("e1")])).await;
        storage
            .set(StorageKey::Gamification, json!({"level": 2, "xp": 150, "badges": []}))
            .await;

        let exported = storage.export_data().await;
        let exported_json = serde_json::to_value(&exported).unwrap();
        assert!(exported_json["exportDate"].is_string());
        assert_eq!(exported_json["smarttrack_photos"], Value::Null);

        assert!(storage.clear().await);
        assert_eq!(storage.get(StorageKey::Exercises).await, None);
        assert!(!storage.has_unsaved_changes());

        assert!(storage.import_data(&exported_json).await);
        for key in StorageKey::ALL {
            let expected = exported.data[key.as_str()].clone();
            assert_eq!(storage.get(key).await.unwrap_or(Value::Null), expected, "{}", key);
        }

        let imported = bus.filter_events("^storage:imported$").unwrap();
        assert_eq!(imported[0].data["imported"], 10);
        // Backup was taken before the import wrote anything
        assert_eq!(imported[0].data["backup"]["smarttrack_exercises"], Value::Null);
    }

    #[tokio::test]
    async fn test_export_is_independent_of_cache() {
        let (storage, _, _) = storage().await;
        storage.set(StorageKey::Settings, json!({"units": "kg"})).await;

        let mut exported = storage.export_data().await;
        exported
            .data
            .insert("smarttrack_settings".to_string(), json!({"units": "lb"}));

        assert_eq!(storage.get(StorageKey::Settings).await, Some(json!({"units": "kg"})));
    }

    #[tokio::test]
    async fn test_import_rejects_non_object_and_reports_partial_failure() {
        let (storage, _, _) = storage().await;
        assert!(!storage.import_data(&json!([1, 2])).await);

        let doc = json!({
            "smarttrack_settings": {"units": "kg"},
            "smarttrack_exercises": "not an array",
            "unrelated": 5
        });
        assert!(!storage.import_data(&doc).await);
        assert_eq!(storage.get(StorageKey::Settings).await, Some(json!({"units": "kg"})));
        assert_eq!(storage.get(StorageKey::Exercises).await, None);
    }

    #[tokio::test]
    async fn test_cleanup_prunes_sessions_older_than_a_year() {
        let (storage, _, _) = storage().await;
        storage
            .set(
                StorageKey::Sessions,
                json!([
                    {"id": "s1", "date": "2020-01-01", "exercises": []},
                    {"id": "s2", "date": "2021-06-01T10:00:00Z", "exercises": []},
                    {"id": "s3", "date": "sometime", "exercises": []}
                ]),
            )
            .await;

        let now = Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap();
        let report = storage.cleanup_at(now).await;

        assert_eq!(report.sessions_pruned, 1);
        let ids: Vec<String> = storage
            .get(StorageKey::Sessions)
            .await
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }

    #[tokio::test]
    async fn test_cleanup_reports_nothing_when_rewrite_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .set_item(
                "smarttrack_sessions",
                r#"[{"id":"old","date":"2020-01-01","exercises":[]},{"id":"bad","date":"2099-06-01"}]"#,
            )
            .await
            .unwrap();
        let storage = Storage::new(backend.clone(), EventBus::with_defaults(), StorageOptions::default());
        storage.init().await;

        let report = storage.cleanup().await;

        assert_eq!(report.sessions_pruned, 0);
        let stored = storage.get(StorageKey::Sessions).await.unwrap();
        assert_eq!(stored.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_legacy_keys() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_item("smarttrack_temp", "1").await.unwrap();
        let bus = EventBus::with_defaults();
        let options = StorageOptions {
            legacy_keys: vec!["smarttrack_temp".to_string()],
            ..Default::default()
        };
        let storage = Storage::new(backend.clone(), bus, options);

        // init runs cleanup
        storage.init().await;
        assert!(backend.get_item("smarttrack_temp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Settings {
            units: String,
        }

        let (storage, _, _) = storage().await;
        assert!(
            storage
                .set_as(StorageKey::Settings, &Settings { units: "kg".to_string() })
                .await
        );
        assert_eq!(
            storage.get_as::<Settings>(StorageKey::Settings).await,
            Some(Settings { units: "kg".to_string() })
        );
        assert_eq!(storage.get_as::<Vec<u32>>(StorageKey::Settings).await, None);
    }

    #[tokio::test]
    async fn test_concurrent_sets_on_one_key_are_serialized() {
        let (storage, _, _) = storage().await;
        let storage = Arc::new(storage);

        let mut handles = Vec::new();
        for i in 0..20 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.set(StorageKey::Analytics, json!({ "n": i })).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let cached = storage.get(StorageKey::Analytics).await.unwrap();
        let persisted: Value = serde_json::from_str(
            &storage
                .backend
                .get_item("smarttrack_analytics")
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(cached, persisted);
    }

    #[tokio::test]
    async fn test_storage_size() {
        let (storage, _, _) = storage().await;
        storage.set(StorageKey::Settings, json!({"a": 1})).await;
        let size = storage.get_storage_size().await;
        assert_eq!(size.bytes, "{\"a\":1}".len() as u64);
        assert_eq!(size.kb, 0.01);
    }
}
