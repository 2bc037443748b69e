//! Router - single active route with middleware, guards and history

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::FutureExt;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::route::{Guard, Middleware, NavigateOptions, Params, RouteConfig, RouteInfo};
use super::viewport::Viewport;
use crate::events::{EventBus, names};

/// Default history ring capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Upper bound on chained redirects before giving up
const MAX_REDIRECTS: usize = 8;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Route not found: {0}")]
    NotFound(String),

    #[error("Redirect loop starting at: {0}")]
    RedirectLoop(String),

    #[error("Render failed for {path}: {message}")]
    Render { path: String, message: String },
}

/// Router settings
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Appended to every document title
    pub app_name: String,
    /// Target of `go_back` on empty history
    pub default_route: String,
    /// Target for unknown paths and failed navigations
    pub fallback_route: String,
    pub history_capacity: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            app_name: "SmartTrack".to_string(),
            default_route: "dashboard".to_string(),
            fallback_route: "dashboard".to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// A previously active route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub route: String,
    /// When the route was left (unix ms)
    pub timestamp: i64,
}

/// Installs routes and guards the first time the router is used
pub trait RouteTable: Send + Sync {
    fn install(&self, router: &Router);
}

#[derive(Default)]
struct RouterState {
    initialized: bool,
    routes: HashMap<String, RouteConfig>,
    guards: HashMap<String, Arc<dyn Guard>>,
    middleware: Vec<Arc<dyn Middleware>>,
    current: Option<String>,
    last_params: Params,
    history: VecDeque<HistoryEntry>,
}

struct RouterInner {
    bus: EventBus,
    viewport: Arc<dyn Viewport>,
    table: Option<Arc<dyn RouteTable>>,
    options: RouterOptions,
    state: Mutex<RouterState>,
}

/// Navigation state machine
///
/// Cheap to clone; all clones drive the same route table and history. The
/// state lock is never held across an `.await`, so middleware, guards and
/// renders may call back into the router.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

/// Non-owning router handle for callbacks stored inside the router itself
#[derive(Clone)]
pub struct WeakRouter(Weak<RouterInner>);

impl WeakRouter {
    pub fn upgrade(&self) -> Option<Router> {
        self.0.upgrade().map(|inner| Router { inner })
    }
}

impl Router {
    pub fn new(bus: EventBus, viewport: Arc<dyn Viewport>, options: RouterOptions) -> Self {
        Self::build(bus, viewport, options, None)
    }

    /// Router that installs `table` on first use
    pub fn with_table(
        bus: EventBus,
        viewport: Arc<dyn Viewport>,
        options: RouterOptions,
        table: Arc<dyn RouteTable>,
    ) -> Self {
        Self::build(bus, viewport, options, Some(table))
    }

    fn build(
        bus: EventBus,
        viewport: Arc<dyn Viewport>,
        options: RouterOptions,
        table: Option<Arc<dyn RouteTable>>,
    ) -> Self {
        debug!(?options, has_table = table.is_some(), "Router::new: called");
        Self {
            inner: Arc::new(RouterInner {
                bus,
                viewport,
                table,
                options,
                state: Mutex::new(RouterState::default()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRouter {
        WeakRouter(Arc::downgrade(&self.inner))
    }

    pub fn options(&self) -> &RouterOptions {
        &self.inner.options
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install the route table if that has not happened yet
    pub fn init(&self) {
        {
            let mut state = self.state();
            if state.initialized {
                return;
            }
            state.initialized = true;
        }
        if let Some(table) = &self.inner.table {
            table.install(self);
        }
        info!(routes = self.state().routes.len(), "Router initialized");
    }

    /// Register or overwrite a route
    pub fn define(&self, path: &str, config: RouteConfig) {
        debug!(%path, title = config.title(), "Router::define");
        self.state().routes.insert(path.to_string(), config);
    }

    /// Register or overwrite the guard for a path
    pub fn guard<F, Fut>(&self, path: &str, guard: F)
    where
        F: Fn(Params, NavigateOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        debug!(%path, "Router::guard");
        self.state().guards.insert(path.to_string(), Arc::new(guard));
    }

    /// Append a global middleware
    pub fn use_middleware<F, Fut>(&self, middleware: F)
    where
        F: Fn(String, Params, NavigateOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut state = self.state();
        state.middleware.push(Arc::new(middleware));
        debug!(count = state.middleware.len(), "Router::use_middleware");
    }

    /// Make `from` forward every navigation to `to`
    pub fn redirect(&self, from: &str, to: &str) {
        self.define(from, RouteConfig::redirect(to));
    }

    /// Navigate to `path`. Returns true when the route was rendered.
    ///
    /// On failure the fallback route is tried once; a failure on the fallback
    /// itself returns false.
    pub async fn navigate(&self, path: &str, params: Params, options: NavigateOptions) -> bool {
        debug!(%path, "Router::navigate: called");
        self.init();

        let fallback = self.inner.options.fallback_route.clone();
        let mut target = path.to_string();
        let mut params = params;
        let mut options = options;
        let mut retried = false;

        loop {
            match self.try_navigate(&target, params, options).await {
                Ok(navigated) => return navigated,
                Err(e) => {
                    error!(path = %target, error = %e, "Navigation failed");
                    if retried || target == fallback {
                        return false;
                    }
                    retried = true;
                    target = fallback.clone();
                    params = Params::new();
                    options = NavigateOptions::default();
                }
            }
        }
    }

    /// Navigate with empty params and default options
    pub async fn go(&self, path: &str) -> bool {
        self.navigate(path, Params::new(), NavigateOptions::default()).await
    }

    async fn try_navigate(&self, path: &str, params: Params, options: NavigateOptions) -> Result<bool, RouterError> {
        let (path, route) = self.resolve(path)?;
        let global = self.state().middleware.clone();

        for middleware in global.iter().chain(route.middleware.iter()) {
            if !middleware.handle(path.clone(), params.clone(), options.clone()).await {
                info!(%path, "Navigation cancelled by middleware");
                return Ok(false);
            }
        }

        let guard = self.state().guards.get(&path).cloned();
        if let Some(guard) = guard
            && !guard.check(params.clone(), options.clone()).await
        {
            info!(%path, "Navigation blocked by guard");
            return Ok(false);
        }

        let from = self.state().current.clone();
        self.inner.bus.emit(
            names::ROUTER_BEFORE_NAVIGATE,
            json!({ "from": from, "to": path, "params": params, "options": options }),
        );

        if !options.from_history
            && let Some(previous) = from.as_ref()
            && *previous != path
        {
            self.push_history(previous);
        }

        let viewport = &self.inner.viewport;
        viewport.hide_all();
        viewport.highlight(&path);

        if let Some(render) = route.render.clone() {
            let outcome = AssertUnwindSafe(render.render(params.clone(), options.clone()))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("render panicked".to_string()),
            };
            if let Some(message) = failure {
                return Err(RouterError::Render { path, message });
            }
        }

        viewport.show(&path);
        if !options.preserve_scroll {
            viewport.scroll_to_top();
        }

        {
            let mut state = self.state();
            state.current = Some(path.clone());
            state.last_params = params.clone();
        }
        viewport.set_title(&format!("{} - {}", route.title, self.inner.options.app_name));

        self.inner.bus.emit(
            names::ROUTER_NAVIGATED,
            json!({
                "route": path,
                "params": params,
                "options": options,
                "timestamp": chrono::Utc::now().timestamp_millis(),
            }),
        );
        info!(route = %path, "Navigated");
        Ok(true)
    }

    /// Map a requested path to the route that will be rendered
    ///
    /// Unknown paths resolve to the fallback route; redirects are followed.
    fn resolve(&self, requested: &str) -> Result<(String, RouteConfig), RouterError> {
        let state = self.state();
        let fallback = &self.inner.options.fallback_route;
        let mut path = requested.to_string();

        for _ in 0..=MAX_REDIRECTS {
            let route = match state.routes.get(&path) {
                Some(route) => route,
                None => {
                    error!(%path, %fallback, "Route not found, using fallback");
                    path = fallback.clone();
                    state
                        .routes
                        .get(fallback)
                        .ok_or_else(|| RouterError::NotFound(fallback.clone()))?
                }
            };
            match &route.redirect_to {
                Some(target) => {
                    debug!(from = %path, to = %target, "Router::resolve: redirect");
                    path = target.clone();
                }
                None => return Ok((path, route.clone())),
            }
        }
        Err(RouterError::RedirectLoop(requested.to_string()))
    }

    fn push_history(&self, route: &str) {
        let capacity = self.inner.options.history_capacity;
        let mut state = self.state();
        state.history.push_back(HistoryEntry {
            route: route.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        while state.history.len() > capacity {
            state.history.pop_front();
        }
    }

    /// Return to the most recent history entry, or the default route
    pub async fn go_back(&self) -> bool {
        let previous = self.state().history.pop_back();
        let target = match previous {
            Some(entry) => entry.route,
            None => {
                debug!("Router::go_back: history empty, using default route");
                self.inner.options.default_route.clone()
            }
        };
        self.navigate(&target, Params::new(), NavigateOptions::from_history())
            .await
    }

    /// Forward navigation is not supported
    pub async fn go_forward(&self) -> bool {
        warn!("Router::go_forward: forward navigation is not supported");
        false
    }

    /// Re-render the current route with its last params, leaving history alone
    pub async fn reload(&self) -> bool {
        let (current, params) = {
            let state = self.state();
            (state.current.clone(), state.last_params.clone())
        };
        match current {
            Some(path) => self.navigate(&path, params, NavigateOptions::from_history()).await,
            None => {
                warn!("Router::reload: no current route");
                false
            }
        }
    }

    pub fn current_route(&self) -> Option<String> {
        self.state().current.clone()
    }

    /// History entries, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state().history.iter().cloned().collect()
    }

    /// All defined routes, sorted by path
    pub fn routes(&self) -> Vec<RouteInfo> {
        let state = self.state();
        let mut routes: Vec<RouteInfo> = state
            .routes
            .iter()
            .map(|(path, config)| RouteInfo::new(path, config))
            .collect();
        routes.sort_by(|a, b| a.path.cmp(&b.path));
        routes
    }

    pub fn has_guard(&self, path: &str) -> bool {
        self.state().guards.contains_key(path)
    }
}

/// Current route as JSON, for event payloads and CLI output
pub fn describe(router: &Router) -> Value {
    json!({
        "current": router.current_route(),
        "history": router.history(),
    })
}
