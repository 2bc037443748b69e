//! Event types for the SmartTrack event bus
//!
//! Events are loosely typed on purpose: producers and consumers agree on a
//! name (see [`names`]) and a JSON payload, so feature modules never need to
//! share Rust types to talk to each other.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// A single emitted occurrence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID (UUIDv7)
    pub id: String,
    /// Event name, e.g. `storage:saved`
    pub name: String,
    /// Arbitrary payload
    pub data: Value,
    /// Emission time (unix ms)
    pub timestamp: i64,
}

impl Event {
    /// Create a new event stamped with the current time
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A listener that failed during one emission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListenerFailure {
    /// ID of the failing registration
    pub listener_id: String,
    /// Error message (or panic message)
    pub error: String,
}

/// Outcome of a single `emit`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EmitResult {
    /// Number of listeners invoked (durable + one-shot)
    pub listeners_count: usize,
    /// Listeners that returned an error or panicked
    pub errors: Vec<ListenerFailure>,
}

impl EmitResult {
    /// True when every listener completed without error
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of a successful `wait_for`
#[derive(Clone, Debug, PartialEq)]
pub struct WaitedEvent {
    /// Payload of the event that fired
    pub data: Value,
    /// The full event
    pub event: Event,
}

/// Snapshot of bus bookkeeping
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BusStats {
    /// Event names with at least one listener
    pub event_names: usize,
    /// Durable listeners across all events
    pub listeners: usize,
    /// One-shot listeners across all events
    pub once_listeners: usize,
    /// Events currently held in history
    pub history_size: usize,
    /// Maximum events held in history
    pub history_capacity: usize,
    /// Registered middleware functions
    pub middleware: usize,
}

/// Errors from bus operations that can fail
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("Timed out after {timeout_ms}ms waiting for event: {event}")]
    Timeout { event: String, timeout_ms: u128 },

    #[error("Listener for {0} was removed before the event fired")]
    Cancelled(String),

    #[error("Invalid event name: {0:?}")]
    InvalidEventName(String),

    #[error("Invalid event pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Well-known event names crossing module boundaries
pub mod names {
    pub const STORAGE_SAVED: &str = "storage:saved";
    pub const STORAGE_REMOVED: &str = "storage:removed";
    pub const STORAGE_IMPORTED: &str = "storage:imported";
    pub const STORAGE_CLEARED: &str = "storage:cleared";

    pub const ROUTER_BEFORE_NAVIGATE: &str = "router:before-navigate";
    pub const ROUTER_NAVIGATED: &str = "router:navigated";
    /// Namespace for per-route render triggers (`route:{path}`)
    pub const ROUTE_NAMESPACE: &str = "route";

    pub const APP_INITIALIZED: &str = "app:initialized";
    pub const APP_UPDATE_AVAILABLE: &str = "app:update-available";
    pub const EVENTBUS_ERROR: &str = "eventbus:error";
    pub const NOTIFICATION_SHOWN: &str = "notification:shown";

    pub const SESSION_COMPLETED: &str = "session:completed";
    pub const SESSION_SAVED: &str = "session:saved";
    pub const GAMIFICATION_XP_GAINED: &str = "gamification:xp-gained";
    pub const GAMIFICATION_LEVEL_UP: &str = "gamification:level-up";
    pub const EXERCISES_LOADED: &str = "exercises:loaded";
}
