//! Five-phase application startup
//!
//! 1. core infrastructure (storage probe/load, router table)
//! 2. application data (settings, default data seeding)
//! 3. business modules
//! 4. UI modules, then the initial navigation
//! 5. finalization (auto-save driver, update listener, `app:initialized`)
//!
//! Each phase completes before the next starts. Failures inside a phase are
//! logged and isolated; only an invalid configuration or a failed initial
//! navigation aborts startup.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use kvstore::KvBackend;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::domain::{ExerciseLibrary, Gamification, SessionLog};
use super::module::{AppContext, AppModule, Capabilities};
use super::seed::seed_defaults;
use super::ui::{ToastBridge, update_message};
use crate::config::Config;
use crate::events::{EventBus, names};
use crate::notify::{Notification, Notifier};
use crate::router::{Router, SmartTrackRoutes, Viewport};
use crate::storage::{Storage, StorageMode};

/// A module whose `init` failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleFailure {
    pub module: String,
    pub error: String,
}

/// What happened during `start`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StartReport {
    pub storage_mode: Option<StorageMode>,
    pub seeded: Vec<String>,
    pub initialized: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<ModuleFailure>,
    pub route: Option<String>,
}

/// The composition root
pub struct App {
    ctx: AppContext,
    viewport: Arc<dyn Viewport>,
    business: Vec<Arc<dyn AppModule>>,
    ui: Vec<Arc<dyn AppModule>>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl App {
    /// App with the given services and no modules
    pub fn new(config: Config, bus: EventBus, capabilities: Capabilities, viewport: Arc<dyn Viewport>) -> Self {
        debug!(
            storage = capabilities.storage.is_some(),
            router = capabilities.router.is_some(),
            notifier = capabilities.notifier.is_some(),
            "App::new: called"
        );
        Self {
            ctx: AppContext {
                bus,
                config,
                capabilities,
            },
            viewport,
            business: Vec::new(),
            ui: Vec::new(),
            autosave: Mutex::new(None),
        }
    }

    /// The full SmartTrack application over `backend`
    pub fn standard(
        config: Config,
        backend: Arc<dyn KvBackend>,
        notifier: Arc<dyn Notifier>,
        viewport: Arc<dyn Viewport>,
    ) -> Self {
        let bus = config.event_bus();
        let storage = Arc::new(
            Storage::new(backend, bus.clone(), config.storage_options()).with_notifier(notifier.clone()),
        );
        let routes = SmartTrackRoutes::new(bus.clone(), Some(storage.clone()), Some(notifier.clone()));
        let router = Router::with_table(bus.clone(), viewport.clone(), config.router_options(), Arc::new(routes));

        let capabilities = Capabilities {
            storage: Some(storage),
            router: Some(router),
            notifier: Some(notifier),
        };
        Self::new(config, bus, capabilities, viewport)
            .with_business_module(Arc::new(ExerciseLibrary::new()))
            .with_business_module(Arc::new(SessionLog::new()))
            .with_business_module(Arc::new(Gamification::new()))
            .with_ui_module(Arc::new(ToastBridge::new()))
    }

    pub fn with_business_module(mut self, module: Arc<dyn AppModule>) -> Self {
        self.business.push(module);
        self
    }

    pub fn with_ui_module(mut self, module: Arc<dyn AppModule>) -> Self {
        self.ui.push(module);
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn storage(&self) -> Option<Arc<Storage>> {
        self.ctx.capabilities.storage.clone()
    }

    pub fn router(&self) -> Option<Router> {
        self.ctx.capabilities.router.clone()
    }

    /// Run all five phases
    ///
    /// `initial_route` overrides the configured default route. On an escaping
    /// failure the viewport shows the fatal error screen and the error is
    /// returned.
    pub async fn start(&self, initial_route: Option<&str>) -> eyre::Result<StartReport> {
        info!(version = %self.ctx.config.app.version, "Starting SmartTrack");
        match self.run_phases(initial_route).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, "Startup failed");
                self.viewport
                    .show_fatal_error(&format!("{} failed to start: {}. Reload to try again.", self.ctx.config.app.name, e));
                Err(e)
            }
        }
    }

    async fn run_phases(&self, initial_route: Option<&str>) -> eyre::Result<StartReport> {
        self.ctx.config.validate()?;
        let mut report = StartReport::default();

        self.init_core(&mut report).await;
        self.load_data(&mut report).await;

        info!("Phase 3: business modules");
        self.init_modules(&self.business, &mut report).await;

        info!("Phase 4: UI modules");
        self.init_modules(&self.ui, &mut report).await;
        self.initial_navigation(initial_route, &mut report).await?;

        self.finalize();
        Ok(report)
    }

    async fn init_core(&self, report: &mut StartReport) {
        info!("Phase 1: core infrastructure");
        let caps = &self.ctx.capabilities;

        match &caps.storage {
            Some(storage) => {
                let mode = storage.init().await;
                if mode == StorageMode::MemoryOnly {
                    warn!("Running without persistent storage; data will be lost on exit");
                }
                report.storage_mode = Some(mode);
            }
            None => warn!("Storage not available, skipping"),
        }

        match &caps.router {
            Some(router) => router.init(),
            None => warn!("Router not available, skipping"),
        }

        if caps.notifier.is_none() {
            warn!("Notifier not available, notifications go to the log only");
        }
    }

    async fn load_data(&self, report: &mut StartReport) {
        info!("Phase 2: application data");
        let Some(storage) = &self.ctx.capabilities.storage else {
            warn!("Storage not available, starting with empty state");
            return;
        };
        match seed_defaults(storage).await {
            Ok(seeded) => {
                report.seeded = seeded.seeded.iter().map(|k| k.to_string()).collect();
            }
            Err(e) => warn!(error = %e, "Failed to load default data, continuing with current state"),
        }
    }

    async fn init_modules(&self, modules: &[Arc<dyn AppModule>], report: &mut StartReport) {
        for module in modules {
            let name = module.name();
            let missing: Vec<String> = module
                .requires()
                .iter()
                .filter(|c| !self.ctx.capabilities.has(**c))
                .map(|c| c.to_string())
                .collect();
            if !missing.is_empty() {
                warn!(module = name, missing = ?missing, "Module skipped, missing capabilities");
                report.skipped.push(name.to_string());
                continue;
            }

            let outcome = AssertUnwindSafe(module.init(&self.ctx)).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("module init panicked".to_string()),
            };
            match failure {
                None => {
                    debug!(module = name, "App::init_modules: initialized");
                    report.initialized.push(name.to_string());
                }
                Some(error) => {
                    error!(module = name, %error, "Module failed to initialize");
                    report.failed.push(ModuleFailure {
                        module: name.to_string(),
                        error,
                    });
                }
            }
        }
    }

    async fn initial_navigation(&self, initial_route: Option<&str>, report: &mut StartReport) -> eyre::Result<()> {
        let Some(router) = &self.ctx.capabilities.router else {
            warn!("Router not available, no initial screen");
            return Ok(());
        };
        let target = initial_route.unwrap_or(&self.ctx.config.router.default_route);
        router.go(target).await;

        // A guard may redirect elsewhere; only ending up nowhere is fatal
        match router.current_route() {
            Some(route) => {
                report.route = Some(route);
                Ok(())
            }
            None => Err(eyre::eyre!("Initial navigation to {} failed", target)),
        }
    }

    fn finalize(&self) {
        info!("Phase 5: finalization");
        if let Some(storage) = &self.ctx.capabilities.storage {
            self.start_autosave(storage.clone());
        }

        let notifier = self.ctx.capabilities.notifier.clone();
        self.ctx.bus.on(names::APP_UPDATE_AVAILABLE, move |event| {
            let message = update_message(&event.data);
            match &notifier {
                Some(notifier) => notifier.notify(Notification::info(message)),
                None => info!(%message, "Update available"),
            }
            Ok(())
        });

        self.ctx.bus.emit(
            names::APP_INITIALIZED,
            json!({
                "version": self.ctx.config.app.version,
                "timestamp": chrono::Utc::now().timestamp_millis(),
            }),
        );
        info!("SmartTrack initialized");
    }

    fn start_autosave(&self, storage: Arc<Storage>) {
        let period = self.ctx.config.storage.autosave_interval();
        debug!(?period, "App::start_autosave: called");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if storage.auto_save().await {
                    debug!("Auto-save flushed pending changes");
                }
            }
        });

        let mut slot = self.autosave.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    pub fn autosave_running(&self) -> bool {
        self.autosave
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the auto-save driver, flush pending changes and detach listeners
    ///
    /// Module listeners hold the storage handle, so they are removed here to
    /// let the backend (and its directory lock) drop with the app.
    pub async fn shutdown(&self) -> bool {
        info!("Shutting down");
        let handle = self.autosave.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            // Resolves once the task, and the storage handle it owns, is dropped
            let _ = handle.await;
        }
        let saved = match &self.ctx.capabilities.storage {
            Some(storage) => storage.save_all().await,
            None => true,
        };
        let removed = self.ctx.bus.off(None, None);
        debug!(removed, "App::shutdown: listeners detached");
        saved
    }
}
