//! Business modules: exercise library, session log, gamification
//!
//! Each module loads its slice of storage during `init` and afterwards reacts
//! only to bus events. Listener callbacks are synchronous, so storage work is
//! handed to a task on the current runtime.

use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::module::{AppContext, AppModule, Capability};
use super::seed::default_gamification;
use crate::events::{EventBus, names};
use crate::storage::{Storage, StorageKey};

/// XP for finishing any session
pub const XP_PER_SESSION: u64 = 50;
/// Extra XP per exercise performed in a session
pub const XP_PER_EXERCISE: u64 = 10;
/// XP needed for each level
pub const XP_PER_LEVEL: u64 = 500;

const FIRST_WORKOUT_BADGE: &str = "first-workout";

/// Run `task` on the current runtime
fn spawn_task<F>(task: F) -> eyre::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|e| eyre::eyre!("no async runtime: {}", e))?;
    handle.spawn(task);
    Ok(())
}

fn array_of(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// In-memory view of the exercise library
#[derive(Default)]
pub struct ExerciseLibrary {
    exercises: Arc<RwLock<Vec<Value>>>,
}

impl ExerciseLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exercises(&self) -> Vec<Value> {
        self.exercises.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self) -> usize {
        self.exercises.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn reload(storage: &Storage, bus: &EventBus, slot: &RwLock<Vec<Value>>) -> usize {
        let exercises = array_of(storage.get(StorageKey::Exercises).await);
        let count = exercises.len();
        *slot.write().unwrap_or_else(|e| e.into_inner()) = exercises;
        bus.emit(names::EXERCISES_LOADED, json!({ "count": count }));
        count
    }
}

#[async_trait]
impl AppModule for ExerciseLibrary {
    fn name(&self) -> &'static str {
        "exercises"
    }

    fn requires(&self) -> &'static [Capability] {
        &[Capability::Storage]
    }

    async fn init(&self, ctx: &AppContext) -> eyre::Result<()> {
        let storage = ctx.storage()?;
        let count = Self::reload(&storage, &ctx.bus, &self.exercises).await;
        info!(count, "Exercise library loaded");

        for trigger in [names::STORAGE_IMPORTED, names::STORAGE_CLEARED] {
            let storage = storage.clone();
            let bus = ctx.bus.clone();
            let slot = self.exercises.clone();
            ctx.bus.on(trigger, move |_event| {
                let storage = storage.clone();
                let bus = bus.clone();
                let slot = slot.clone();
                spawn_task(async move {
                    ExerciseLibrary::reload(&storage, &bus, &slot).await;
                })
            });
        }
        Ok(())
    }
}

/// Persists completed sessions
///
/// Listens for `session:completed` (payload: the session object), fills in
/// missing `id`/`date`/`exercises`, appends it to the stored sessions and
/// emits `session:saved`.
#[derive(Default)]
pub struct SessionLog {
    write_lock: Arc<Mutex<()>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(storage: &Storage, bus: &EventBus, lock: &Mutex<()>, session: Value) -> eyre::Result<()> {
        let Value::Object(mut session) = session else {
            return Err(eyre::eyre!("session payload must be an object"));
        };
        session
            .entry("id")
            .or_insert_with(|| json!(Uuid::now_v7().to_string()));
        session
            .entry("date")
            .or_insert_with(|| json!(Utc::now().format("%Y-%m-%d").to_string()));
        session.entry("exercises").or_insert_with(|| json!([]));

        let _guard = lock.lock().await;
        let mut sessions = array_of(storage.get(StorageKey::Sessions).await);
        sessions.push(Value::Object(session.clone()));
        let total = sessions.len();

        if !storage.set(StorageKey::Sessions, Value::Array(sessions)).await {
            return Err(eyre::eyre!("Failed to save session {}", session["id"]));
        }
        debug!(id = %session["id"], total, "SessionLog::record: saved");
        bus.emit(names::SESSION_SAVED, json!({ "session": session, "total": total }));
        Ok(())
    }
}

#[async_trait]
impl AppModule for SessionLog {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn requires(&self) -> &'static [Capability] {
        &[Capability::Storage]
    }

    async fn init(&self, ctx: &AppContext) -> eyre::Result<()> {
        let storage = ctx.storage()?;
        let existing = array_of(storage.get(StorageKey::Sessions).await).len();
        info!(existing, "Session log ready");

        let bus = ctx.bus.clone();
        let lock = self.write_lock.clone();
        ctx.bus.on(names::SESSION_COMPLETED, move |event| {
            let storage = storage.clone();
            let bus = bus.clone();
            let lock = lock.clone();
            let session = event.data.clone();
            spawn_task(async move {
                if let Err(e) = SessionLog::record(&storage, &bus, &lock, session).await {
                    error!(error = %e, "Failed to record session");
                }
            })
        });
        Ok(())
    }
}

/// XP awarded for a saved session
pub fn xp_for_session(session: &Value) -> u64 {
    let exercises = session
        .get("exercises")
        .and_then(Value::as_array)
        .map_or(0, Vec::len) as u64;
    XP_PER_SESSION + XP_PER_EXERCISE * exercises
}

/// Level reached with `xp` total experience
pub fn level_for_xp(xp: u64) -> u64 {
    xp / XP_PER_LEVEL + 1
}

/// Awards XP and levels for saved sessions
#[derive(Default)]
pub struct Gamification {
    write_lock: Arc<Mutex<()>>,
}

impl Gamification {
    pub fn new() -> Self {
        Self::default()
    }

    async fn award(storage: &Storage, bus: &EventBus, lock: &Mutex<()>, session: &Value) -> eyre::Result<()> {
        let _guard = lock.lock().await;
        let mut profile: Map<String, Value> = match storage.get(StorageKey::Gamification).await {
            Some(Value::Object(profile)) => profile,
            _ => match default_gamification() {
                Value::Object(profile) => profile,
                _ => Map::new(),
            },
        };

        let number = |field: &str| profile.get(field).and_then(Value::as_f64).unwrap_or(0.0).max(0.0) as u64;
        let previous_xp = number("xp");
        let previous_level = number("level").max(1);

        let gained = xp_for_session(session);
        let xp = previous_xp + gained;
        let level = level_for_xp(xp).max(previous_level);

        profile.insert("xp".to_string(), json!(xp));
        profile.insert("level".to_string(), json!(level));
        let badges = profile.entry("badges").or_insert_with(|| json!([]));
        if let Value::Array(badges) = badges
            && !badges.iter().any(|b| b == FIRST_WORKOUT_BADGE)
        {
            badges.push(json!(FIRST_WORKOUT_BADGE));
        }

        if !storage.set(StorageKey::Gamification, Value::Object(profile)).await {
            return Err(eyre::eyre!("Failed to save gamification profile"));
        }

        bus.emit(
            names::GAMIFICATION_XP_GAINED,
            json!({ "amount": gained, "xp": xp, "level": level }),
        );
        if level > previous_level {
            info!(level, previous_level, "Level up");
            bus.emit(
                names::GAMIFICATION_LEVEL_UP,
                json!({ "level": level, "previous": previous_level }),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl AppModule for Gamification {
    fn name(&self) -> &'static str {
        "gamification"
    }

    fn requires(&self) -> &'static [Capability] {
        &[Capability::Storage]
    }

    async fn init(&self, ctx: &AppContext) -> eyre::Result<()> {
        let storage = ctx.storage()?;
        let bus = ctx.bus.clone();
        let lock = self.write_lock.clone();
        ctx.bus.on(names::SESSION_SAVED, move |event| {
            let storage = storage.clone();
            let bus = bus.clone();
            let lock = lock.clone();
            let session = event.data.get("session").cloned().unwrap_or(Value::Null);
            spawn_task(async move {
                if let Err(e) = Gamification::award(&storage, &bus, &lock, &session).await {
                    error!(error = %e, "Failed to award XP");
                }
            })
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::module::Capabilities;
    use crate::config::Config;
    use crate::storage::StorageOptions;
    use kvstore::MemoryBackend;
    use crate::events::Event;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn context() -> (AppContext, Arc<Storage>) {
        let bus = EventBus::with_defaults();
        let storage = Arc::new(Storage::new(
            Arc::new(MemoryBackend::new()),
            bus.clone(),
            StorageOptions::default(),
        ));
        storage.init().await;
        let ctx = AppContext {
            bus,
            config: Config::default(),
            capabilities: Capabilities {
                storage: Some(storage.clone()),
                ..Default::default()
            },
        };
        (ctx, storage)
    }

    const WAIT: Duration = Duration::from_secs(2);

    /// Registers before the triggering emit, unlike a lazily polled `wait_for`
    fn expect_event(bus: &EventBus, name: &str) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        bus.once(name, move |event| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(event.clone());
            }
            Ok(())
        })
        .unwrap();
        rx
    }

    async fn received(rx: oneshot::Receiver<Event>) -> Event {
        tokio::time::timeout(WAIT, rx).await.unwrap().unwrap()
    }

    #[test]
    fn test_xp_rules() {
        assert_eq!(xp_for_session(&json!({"exercises": [1, 2, 3]})), 80);
        assert_eq!(xp_for_session(&json!({})), 50);
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(499), 1);
        assert_eq!(level_for_xp(500), 2);
    }

    #[tokio::test]
    async fn test_exercise_library_loads_and_reloads_on_import() {
        let (ctx, storage) = context().await;
        let library = ExerciseLibrary::new();
        library.init(&ctx).await.unwrap();
        assert_eq!(library.count(), 0);

        let doc = json!({
            "smarttrack_exercises": [
                {"id": "e1", "name": "Squat", "muscleGroup": "legs", "isUnilateral": false}
            ]
        });
        let loaded = expect_event(&ctx.bus, names::EXERCISES_LOADED);
        assert!(storage.import_data(&doc).await);
        let loaded = received(loaded).await;

        assert_eq!(loaded.data["count"], 1);
        assert_eq!(library.count(), 1);
    }

    #[tokio::test]
    async fn test_session_log_appends_and_emits() {
        let (ctx, storage) = context().await;
        SessionLog::new().init(&ctx).await.unwrap();

        let saved = expect_event(&ctx.bus, names::SESSION_SAVED);
        let emitted = ctx
            .bus
            .emit(names::SESSION_COMPLETED, json!({"exercises": [{"exerciseId": "e1"}]}));
        assert!(emitted.is_ok());
        let saved = received(saved).await;

        assert_eq!(saved.data["total"], 1);
        let sessions = storage.get(StorageKey::Sessions).await.unwrap();
        assert_eq!(sessions.as_array().unwrap().len(), 1);
        assert!(sessions[0]["id"].is_string());
        assert!(sessions[0]["date"].is_string());
    }

    #[tokio::test]
    async fn test_session_log_rejects_non_object_payload() {
        let (ctx, storage) = context().await;
        let lock = Mutex::new(());
        let result = SessionLog::record(&storage, &ctx.bus, &lock, json!("nope")).await;
        assert!(result.is_err());
        assert_eq!(storage.get(StorageKey::Sessions).await, None);
    }

    #[tokio::test]
    async fn test_gamification_awards_xp_and_levels_up() {
        let (ctx, storage) = context().await;
        storage
            .set(StorageKey::Gamification, json!({"level": 1, "xp": 480, "badges": []}))
            .await;
        Gamification::new().init(&ctx).await.unwrap();

        let level_up = expect_event(&ctx.bus, names::GAMIFICATION_LEVEL_UP);
        ctx.bus.emit(
            names::SESSION_SAVED,
            json!({"session": {"id": "s1", "exercises": [{}, {}]}, "total": 1}),
        );
        let level_up = received(level_up).await;

        assert_eq!(level_up.data["level"], 2);
        let profile = storage.get(StorageKey::Gamification).await.unwrap();
        assert_eq!(profile["xp"], 550);
        assert_eq!(profile["badges"], json!(["first-workout"]));
    }

    #[tokio::test]
    async fn test_completed_session_flows_through_to_xp() {
        let (ctx, storage) = context().await;
        SessionLog::new().init(&ctx).await.unwrap();
        Gamification::new().init(&ctx).await.unwrap();

        let gained = expect_event(&ctx.bus, names::GAMIFICATION_XP_GAINED);
        ctx.bus.emit(names::SESSION_COMPLETED, json!({"id": "s9", "exercises": []}));
        let gained = received(gained).await;

        assert_eq!(gained.data["amount"], 50);
        assert_eq!(storage.get(StorageKey::Gamification).await.unwrap()["xp"], 50);
    }

    #[test]
    fn test_listener_outside_runtime_reports_error() {
        let bus = EventBus::with_defaults();
        bus.on("x", |_| spawn_task(async {}));
        let result = bus.emit("x", Value::Null);
        assert_eq!(result.errors.len(), 1);
    }
}
