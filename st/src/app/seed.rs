//! First-run defaults

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::storage::{Storage, StorageKey};

/// Keys written by a seeding pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub seeded: Vec<StorageKey>,
}

pub fn default_settings() -> Value {
    json!({
        "units": "kg",
        "theme": "auto",
        "restTimerSeconds": 90,
        "autoSave": true,
        "notifications": true
    })
}

pub fn default_exercises() -> Value {
    let library = [
        ("ex-bench-press", "Bench Press", "chest", "barbell", false),
        ("ex-squat", "Back Squat", "legs", "barbell", false),
        ("ex-deadlift", "Deadlift", "back", "barbell", false),
        ("ex-overhead-press", "Overhead Press", "shoulders", "barbell", false),
        ("ex-barbell-row", "Barbell Row", "back", "barbell", false),
        ("ex-pull-up", "Pull-up", "back", "bodyweight", false),
        ("ex-dumbbell-curl", "Dumbbell Curl", "arms", "dumbbell", true),
        ("ex-lunge", "Walking Lunge", "legs", "dumbbell", true),
    ];
    Value::Array(
        library
            .iter()
            .map(|(id, name, muscle_group, equipment, unilateral)| {
                json!({
                    "id": id,
                    "name": name,
                    "muscleGroup": muscle_group,
                    "equipment": equipment,
                    "isUnilateral": unilateral,
                    "isDefault": true
                })
            })
            .collect(),
    )
}

pub fn default_gamification() -> Value {
    json!({ "level": 1, "xp": 0, "badges": [] })
}

/// Load settings, then write each default document whose key is absent
pub async fn seed_defaults(storage: &Storage) -> eyre::Result<SeedReport> {
    debug!("seed_defaults: called");
    let mut report = SeedReport::default();

    let defaults = [
        (StorageKey::Settings, default_settings()),
        (StorageKey::Exercises, default_exercises()),
        (StorageKey::Gamification, default_gamification()),
    ];

    for (key, value) in defaults {
        if storage.get(key).await.is_some() {
            debug!(%key, "seed_defaults: already present");
            continue;
        }
        if !storage.set(key, value).await {
            return Err(eyre::eyre!("Failed to seed {}", key));
        }
        report.seeded.push(key);
    }

    info!(seeded = report.seeded.len(), "Default data ready");
    Ok(report)
}
