//! SmartTrack configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::EventBus;
use crate::router::RouterOptions;
use crate::storage::StorageOptions;

/// Main SmartTrack configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application identity
    pub app: AppConfig,

    /// Event bus tuning
    pub events: EventsConfig,

    /// Persistence settings
    pub storage: StorageConfig,

    /// Navigation settings
    pub router: RouterConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.app.name.trim().is_empty() {
            return Err(eyre::eyre!("app.name must not be empty"));
        }
        if self.events.history_capacity == 0 {
            return Err(eyre::eyre!("events.history-capacity must be at least 1"));
        }
        if self.router.history_capacity == 0 {
            return Err(eyre::eyre!("router.history-capacity must be at least 1"));
        }
        if self.router.default_route.trim().is_empty() || self.router.fallback_route.trim().is_empty() {
            return Err(eyre::eyre!("router.default-route and router.fallback-route must be set"));
        }
        if self.storage.autosave_interval_ms == 0 {
            return Err(eyre::eyre!("storage.autosave-interval-ms must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// Explicit path > `./.smarttrack.yml` > `<config_dir>/smarttrack/smarttrack.yml` > defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the caller falls back to its default level.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::candidates(),
        };
        paths
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|config| config.log_level)
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(".smarttrack.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("smarttrack").join("smarttrack.yml"));
        }
        candidates
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Event bus built from the `events` section
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(
            self.events.history_capacity,
            Duration::from_millis(self.events.wait_timeout_ms),
        )
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            version: self.app.version.clone(),
            legacy_keys: self.storage.legacy_keys.clone(),
            memory_only: self.storage.memory_only,
        }
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            app_name: self.app.name.clone(),
            default_route: self.router.default_route.clone(),
            fallback_route: self.router.fallback_route.clone(),
            history_capacity: self.router.history_capacity,
        }
    }
}

/// Application identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Shown in document titles
    pub name: String,

    /// Stamped into exports and `app:initialized`
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "SmartTrack".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Event bus tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events kept in the in-memory history ring
    #[serde(rename = "history-capacity")]
    pub history_capacity: usize,

    /// Default `wait_for` timeout in milliseconds (0 = wait forever)
    #[serde(rename = "wait-timeout-ms")]
    pub wait_timeout_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: crate::events::DEFAULT_HISTORY_CAPACITY,
            wait_timeout_ms: 5000,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store directory
    pub path: PathBuf,

    /// Byte quota for the store (absent = unlimited)
    #[serde(rename = "quota-bytes")]
    pub quota_bytes: Option<u64>,

    /// Auto-save period in milliseconds
    #[serde(rename = "autosave-interval-ms")]
    pub autosave_interval_ms: u64,

    /// Obsolete keys deleted on every cleanup pass
    #[serde(rename = "legacy-keys")]
    pub legacy_keys: Vec<String>,

    /// Never touch the disk
    #[serde(rename = "memory-only")]
    pub memory_only: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: kvstore::config::default_store_path(),
            quota_bytes: Some(kvstore::DEFAULT_QUOTA_BYTES),
            autosave_interval_ms: 30_000,
            legacy_keys: vec![
                "smarttrack_temp".to_string(),
                "smarttrack_cache".to_string(),
                "smarttrack_old_sessions".to_string(),
            ],
            memory_only: false,
        }
    }
}

impl StorageConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }
}

/// Navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Initial route and `go_back` target on empty history
    #[serde(rename = "default-route")]
    pub default_route: String,

    /// Route used for unknown paths and failed navigations
    #[serde(rename = "fallback-route")]
    pub fallback_route: String,

    /// Entries kept for `go_back`
    #[serde(rename = "history-capacity")]
    pub history_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_route: "dashboard".to_string(),
            fallback_route: "dashboard".to_string(),
            history_capacity: crate::router::DEFAULT_HISTORY_CAPACITY,
        }
    }
}
