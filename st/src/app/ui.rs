//! UI modules

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::module::{AppContext, AppModule, Capability};
use crate::events::{Event, EventBus, names};
use crate::notify::{Notification, Notifier};

/// Turns domain events into toasts
///
/// Every toast shown is echoed as `notification:shown` so other parts of the
/// UI (and tests) can observe it.
#[derive(Debug, Default)]
pub struct ToastBridge;

impl ToastBridge {
    pub fn new() -> Self {
        Self
    }

    fn toast_for(event: &Event) -> Option<Notification> {
        let data = &event.data;
        match event.name.as_str() {
            names::STORAGE_IMPORTED => {
                let imported = data["imported"].as_u64().unwrap_or(0);
                let failed = data["failed"].as_u64().unwrap_or(0);
                Some(if failed == 0 {
                    Notification::success(format!("Imported {} items", imported))
                } else {
                    Notification::warning(format!("Imported {} items, {} failed", imported, failed))
                })
            }
            names::STORAGE_CLEARED => Some(Notification::info("All data cleared")),
            names::SESSION_SAVED => Some(Notification::success("Workout saved")),
            names::GAMIFICATION_LEVEL_UP => {
                let level = data["level"].as_u64().unwrap_or(0);
                Some(Notification::success(format!("Level up! You reached level {}", level)))
            }
            _ => None,
        }
    }

    fn show(bus: &EventBus, notifier: &Arc<dyn Notifier>, notification: Notification) {
        let echo = json!({ "kind": notification.kind, "message": notification.message });
        notifier.notify(notification);
        bus.emit(names::NOTIFICATION_SHOWN, echo);
    }
}

#[async_trait]
impl AppModule for ToastBridge {
    fn name(&self) -> &'static str {
        "toasts"
    }

    fn requires(&self) -> &'static [Capability] {
        &[Capability::Notifier]
    }

    async fn init(&self, ctx: &AppContext) -> eyre::Result<()> {
        let notifier = ctx
            .notifier()
            .ok_or_else(|| eyre::eyre!("notifier is not available"))?;

        for trigger in [
            names::STORAGE_IMPORTED,
            names::STORAGE_CLEARED,
            names::SESSION_SAVED,
            names::GAMIFICATION_LEVEL_UP,
        ] {
            let bus = ctx.bus.clone();
            let notifier = notifier.clone();
            ctx.bus.on(trigger, move |event| {
                if let Some(notification) = ToastBridge::toast_for(event) {
                    ToastBridge::show(&bus, &notifier, notification);
                }
                Ok(())
            });
        }
        Ok(())
    }
}

/// Toast text for an `app:update-available` payload
pub(crate) fn update_message(data: &Value) -> String {
    match data.get("version").and_then(Value::as_str) {
        Some(version) => format!("Version {} is available. Reload to update.", version),
        None => "A new version is available. Reload to update.".to_string(),
    }
}
