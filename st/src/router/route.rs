//! Route definitions and the pluggable steps of a navigation

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Navigation parameters (free-form JSON object)
pub type Params = Map<String, Value>;

/// Per-navigation flags
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateOptions {
    /// Keep the scroll position instead of jumping to the top
    pub preserve_scroll: bool,
    /// Navigation replays history (back/reload); the previous route is not pushed
    pub from_history: bool,
    /// Caller-defined extras, passed through to middleware, guards and renders
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NavigateOptions {
    pub fn from_history() -> Self {
        Self {
            from_history: true,
            ..Default::default()
        }
    }

    pub fn preserve_scroll(mut self) -> Self {
        self.preserve_scroll = true;
        self
    }
}

/// Draws the screen for a route
#[async_trait]
pub trait Render: Send + Sync {
    async fn render(&self, params: Params, options: NavigateOptions) -> eyre::Result<()>;
}

#[async_trait]
impl<F, Fut> Render for F
where
    F: Fn(Params, NavigateOptions) -> Fut + Send + Sync,
    Fut: Future<Output = eyre::Result<()>> + Send,
{
    async fn render(&self, params: Params, options: NavigateOptions) -> eyre::Result<()> {
        (self)(params, options).await
    }
}

/// Admission check for a single route. `false` aborts the navigation.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(&self, params: Params, options: NavigateOptions) -> bool;
}

#[async_trait]
impl<F, Fut> Guard for F
where
    F: Fn(Params, NavigateOptions) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn check(&self, params: Params, options: NavigateOptions) -> bool {
        (self)(params, options).await
    }
}

/// Runs before every navigation (global) or before one route (route-scoped).
/// `false` aborts the navigation and skips the remaining middleware.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, path: String, params: Params, options: NavigateOptions) -> bool;
}

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(String, Params, NavigateOptions) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn handle(&self, path: String, params: Params, options: NavigateOptions) -> bool {
        (self)(path, params, options).await
    }
}

/// A route definition
///
/// Built with chained setters:
///
/// ```rust,ignore
/// let config = RouteConfig::new("Dashboard")
///     .icon("home")
///     .render(|_params, _options| async { Ok(()) });
/// router.define("dashboard", config);
/// ```
#[derive(Clone, Default)]
pub struct RouteConfig {
    pub(crate) title: String,
    pub(crate) icon: String,
    pub(crate) protected: bool,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) meta: Map<String, Value>,
    pub(crate) render: Option<Arc<dyn Render>>,
    pub(crate) redirect_to: Option<String>,
}

impl RouteConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// A route that forwards every navigation to `target`
    pub fn redirect(target: impl Into<String>) -> Self {
        Self {
            redirect_to: Some(target.into()),
            ..Default::default()
        }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn middleware<F, Fut>(mut self, middleware: F) -> Self
    where
        F: Fn(String, Params, NavigateOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn render<F, Fut>(mut self, render: F) -> Self
    where
        F: Fn(Params, NavigateOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn redirect_target(&self) -> Option<&str> {
        self.redirect_to.as_deref()
    }
}

/// Read-only view of a defined route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub path: String,
    pub title: String,
    pub icon: String,
    pub protected: bool,
    pub meta: Map<String, Value>,
    pub redirect_to: Option<String>,
}

impl RouteInfo {
    pub(crate) fn new(path: &str, config: &RouteConfig) -> Self {
        Self {
            path: path.to_string(),
            title: config.title.clone(),
            icon: config.icon.clone(),
            protected: config.protected,
            meta: config.meta.clone(),
            redirect_to: config.redirect_to.clone(),
        }
    }
}
