//! Application bootstrap and feature modules
//!
//! [`App`] is the composition root: it owns the event bus and the optional
//! capabilities (storage, router, notifier), and brings feature modules up
//! in a fixed five-phase order. Feature modules implement [`AppModule`] and
//! never reference each other directly.

mod bootstrap;
mod domain;
mod module;
mod seed;
mod ui;

pub use bootstrap::{App, ModuleFailure, StartReport};
pub use domain::{
    ExerciseLibrary, Gamification, SessionLog, XP_PER_EXERCISE, XP_PER_LEVEL, XP_PER_SESSION, level_for_xp,
    xp_for_session,
};
pub use module::{AppContext, AppModule, Capabilities, Capability};
pub use seed::{SeedReport, default_exercises, default_gamification, default_settings, seed_defaults};
pub use ui::ToastBridge;
