//! The SmartTrack route table

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};

use super::core::{RouteTable, Router, WeakRouter};
use super::route::{NavigateOptions, Params, RouteConfig};
use crate::events::{EventBus, Namespace, names};
use crate::notify::{Notification, Notifier};
use crate::storage::{Storage, StorageKey};

/// (path, title, icon, protected)
const ROUTES: &[(&str, &str, &str, bool)] = &[
    ("dashboard", "Dashboard", "home", false),
    ("exercises", "Exercises", "list", false),
    ("workout", "Workout", "dumbbell", true),
    ("templates", "Templates", "clipboard", false),
    ("analytics", "Analytics", "chart", true),
    ("progress", "Progress", "trending-up", false),
    ("settings", "Settings", "gear", false),
];

/// Application routes and their admission guards
///
/// Each render emits `route:{path}` with the navigation params so that the
/// screen controllers can draw themselves. Guards need storage; without it
/// the routes are defined unguarded.
pub struct SmartTrackRoutes {
    bus: EventBus,
    storage: Option<Arc<Storage>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl SmartTrackRoutes {
    pub fn new(bus: EventBus, storage: Option<Arc<Storage>>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self { bus, storage, notifier }
    }

    fn install_guard(
        &self,
        router: &Router,
        storage: &Arc<Storage>,
        guarded: &'static str,
        required: StorageKey,
        message: &'static str,
        redirect_to: &'static str,
    ) {
        let storage = storage.clone();
        let notifier = self.notifier.clone();
        let router_handle = router.downgrade();

        router.guard(guarded, move |_params, _options| {
            let storage = storage.clone();
            let notifier = notifier.clone();
            let router_handle = router_handle.clone();
            async move {
                if has_entries(&storage, required).await {
                    return true;
                }
                info!(route = guarded, %required, redirect = redirect_to, "Guard rejected navigation");
                if let Some(notifier) = &notifier {
                    notifier.notify(Notification::warning(message));
                }
                redirect(&router_handle, redirect_to).await;
                false
            }
        });
    }
}

impl RouteTable for SmartTrackRoutes {
    fn install(&self, router: &Router) {
        debug!(routes = ROUTES.len(), "SmartTrackRoutes::install: called");
        let namespace = self.bus.create_namespace(names::ROUTE_NAMESPACE);

        for &(path, title, icon, protected) in ROUTES {
            router.define(
                path,
                RouteConfig::new(title)
                    .icon(icon)
                    .protected(protected)
                    .render(render_via(namespace.clone(), path)),
            );
        }
        router.redirect("home", "dashboard");

        if let Some(storage) = &self.storage {
            self.install_guard(
                router,
                storage,
                "workout",
                StorageKey::Exercises,
                "Add at least one exercise before starting a workout",
                "exercises",
            );
            self.install_guard(
                router,
                storage,
                "analytics",
                StorageKey::Sessions,
                "Complete a workout to see analytics",
                "dashboard",
            );
        }
    }
}

/// Render that hands the screen over to whoever listens on `route:{path}`
fn render_via(
    namespace: Namespace,
    path: &'static str,
) -> impl Fn(Params, NavigateOptions) -> std::future::Ready<eyre::Result<()>> + Send + Sync + 'static {
    move |params, options| {
        namespace.emit(path, json!({ "params": params, "options": options }));
        std::future::ready(Ok(()))
    }
}

async fn has_entries(storage: &Storage, key: StorageKey) -> bool {
    matches!(storage.get(key).await, Some(Value::Array(items)) if !items.is_empty())
}

async fn redirect(router: &WeakRouter, target: &str) {
    if let Some(router) = router.upgrade() {
        router.navigate(target, Params::new(), NavigateOptions::default()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotificationKind, RecordingNotifier};
    use crate::router::{HeadlessViewport, RouterOptions};
    use crate::storage::StorageOptions;
    use kvstore::MemoryBackend;

    struct Fixture {
        bus: EventBus,
        storage: Arc<Storage>,
        notifier: Arc<RecordingNotifier>,
        router: Router,
    }

    async fn fixture() -> Fixture {
        let bus = EventBus::with_defaults();
        let storage = Arc::new(Storage::new(
            Arc::new(MemoryBackend::new()),
            bus.clone(),
            StorageOptions::default(),
        ));
        storage.init().await;
        let notifier = Arc::new(RecordingNotifier::new());
        let table = SmartTrackRoutes::new(bus.clone(), Some(storage.clone()), Some(notifier.clone()));
        let router = Router::with_table(
            bus.clone(),
            Arc::new(HeadlessViewport::new()),
            RouterOptions::default(),
            Arc::new(table),
        );
        Fixture {
            bus,
            storage,
            notifier,
            router,
        }
    }

    #[tokio::test]
    async fn test_installs_application_routes() {
        let f = fixture().await;
        f.router.init();

        let paths: Vec<String> = f.router.routes().into_iter().map(|r| r.path).collect();
        for path in ["dashboard", "exercises", "workout", "templates", "analytics", "progress", "settings", "home"] {
            assert!(paths.contains(&path.to_string()), "missing {}", path);
        }
        assert!(f.router.has_guard("workout"));
        assert!(f.router.has_guard("analytics"));
        assert!(!f.router.has_guard("dashboard"));
    }

    #[tokio::test]
    async fn test_render_emits_route_event() {
        let f = fixture().await;
        assert!(f.router.go("progress").await);

        let events = f.bus.filter_events("^route:progress$").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["options"]["fromHistory"], false);
    }

    #[tokio::test]
    async fn test_home_redirects_to_dashboard() {
        let f = fixture().await;
        assert!(f.router.go("home").await);
        assert_eq!(f.router.current_route().as_deref(), Some("dashboard"));
    }

    #[tokio::test]
    async fn test_workout_guard_redirects_without_exercises() {
        let f = fixture().await;
        f.router.go("dashboard").await;

        assert!(!f.router.go("workout").await);
        assert_eq!(f.router.current_route().as_deref(), Some("exercises"));
        assert_eq!(f.notifier.count(NotificationKind::Warning), 1);
    }

    #[tokio::test]
    async fn test_workout_guard_allows_with_exercises() {
        let f = fixture().await;
        f.storage
            .set(
                StorageKey::Exercises,
                json!([{"id": "e1", "name": "Squat", "muscleGroup": "legs", "isUnilateral": false}]),
            )
            .await;

        assert!(f.router.go("workout").await);
        assert_eq!(f.router.current_route().as_deref(), Some("workout"));
        assert!(f.notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_analytics_guard_redirects_to_dashboard() {
        let f = fixture().await;
        f.router.go("settings").await;

        assert!(!f.router.go("analytics").await);
        assert_eq!(f.router.current_route().as_deref(), Some("dashboard"));
        assert!(f.bus.filter_events("^route:analytics$").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_routes_without_storage_are_unguarded() {
        let bus = EventBus::with_defaults();
        let router = Router::with_table(
            bus.clone(),
            Arc::new(HeadlessViewport::new()),
            RouterOptions::default(),
            Arc::new(SmartTrackRoutes::new(bus, None, None)),
        );
        assert!(router.go("workout").await);
        assert!(!router.has_guard("workout"));
    }
}
