//! Router - single-page navigation with admission control
//!
//! A navigation passes through, in order: route resolution (unknown paths go
//! to the fallback route, redirects are followed), global middleware,
//! route middleware, the route guard, `router:before-navigate`, the history
//! push, the viewport swap and render, and finally `router:navigated`. Any
//! step returning `false` aborts quietly; an error retries the fallback route
//! once.

mod core;
mod defaults;
mod route;
mod viewport;

pub use self::core::{
    DEFAULT_HISTORY_CAPACITY, HistoryEntry, RouteTable, Router, RouterError, RouterOptions, WeakRouter, describe,
};
pub use defaults::SmartTrackRoutes;
pub use route::{Guard, Middleware, NavigateOptions, Params, Render, RouteConfig, RouteInfo};
pub use viewport::{HeadlessViewport, Viewport, ViewportState};
