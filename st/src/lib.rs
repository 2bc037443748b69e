//! SmartTrack - event-driven orchestration core for a local-first fitness tracker
//!
//! Feature modules are independent and talk through a publish/subscribe bus.
//! Every domain document lives in a validated, cached key-value store, and a
//! router gates navigation with middleware and guards.
//!
//! # Modules
//!
//! - [`events`] - publish/subscribe bus with bounded history
//! - [`storage`] - cached, validated document store over [`kvstore`]
//! - [`router`] - navigation state machine with middleware, guards and history
//! - [`app`] - five-phase bootstrapper and the feature modules
//! - [`notify`] - user-facing notifications
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod app;
pub mod cli;
pub mod config;
pub mod events;
pub mod notify;
pub mod router;
pub mod storage;

pub use app::{App, AppContext, AppModule, Capabilities, Capability, StartReport};
pub use config::Config;
pub use events::{Event, EventBus, names};
pub use notify::{Notification, NotificationKind, Notifier};
pub use router::{HeadlessViewport, NavigateOptions, Params, RouteConfig, Router, Viewport};
pub use storage::{ExportDocument, Storage, StorageKey, StorageMode};
