//! Event bus for module orchestration
//!
//! Feature modules never call each other directly. A module that changes
//! something emits an event; every interested module subscribes to it.
//!
//! # Architecture
//!
//! ```text
//!  Storage        Router          Domain modules      Bootstrapper
//!  emits:         emits:          emit:               emits:
//!  - storage:*    - router:*      - session:*         - app:initialized
//!                 - route:{path}  - gamification:*
//!         \           |                 |                 /
//!          v          v                 v                v
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         EVENT BUS                           │
//! │  durable listeners -> one-shot listeners, registration order │
//! │  middleware -> bounded history (ring, FIFO eviction)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use smarttrack::events::{EventBus, names};
//!
//! let bus = EventBus::with_defaults();
//! let sub = bus.on(names::STORAGE_SAVED, |event| {
//!     println!("saved {}", event.data["key"]);
//!     Ok(())
//! });
//! bus.emit(names::STORAGE_SAVED, serde_json::json!({"key": "smarttrack_settings"}));
//! ```

mod bus;
mod namespace;
mod types;

pub use bus::{DEFAULT_HISTORY_CAPACITY, DEFAULT_WAIT_TIMEOUT, EventBus, EventMiddleware, Listener, Subscription};
pub use namespace::Namespace;
pub use types::{BusStats, EmitResult, Event, EventBusError, ListenerFailure, WaitedEvent, names};
