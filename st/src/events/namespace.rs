//! Namespaced view over the event bus

use serde_json::Value;
use tracing::debug;

use super::bus::{EventBus, Subscription};
use super::types::{EmitResult, Event};

/// Prefixes every event name with `"{prefix}:"`
///
/// Lets a module keep its events to itself without a separate bus instance.
#[derive(Clone)]
pub struct Namespace {
    bus: EventBus,
    prefix: String,
}

impl Namespace {
    pub(crate) fn new(bus: EventBus, prefix: &str) -> Self {
        debug!(prefix, "Namespace::new");
        Self {
            bus,
            prefix: prefix.to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully qualified name for a namespaced event
    pub fn event_name(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    pub fn on<F>(&self, name: &str, callback: F) -> Option<Subscription>
    where
        F: Fn(&Event) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.bus.on(&self.event_name(name), callback)
    }

    pub fn once<F>(&self, name: &str, callback: F) -> Option<Subscription>
    where
        F: Fn(&Event) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.bus.once(&self.event_name(name), callback)
    }

    /// Remove listeners; with no event name, every listener in the namespace
    pub fn off(&self, name: Option<&str>, listener_id: Option<&str>) -> usize {
        match name {
            Some(name) => self.bus.off(Some(&self.event_name(name)), listener_id),
            None => self.bus.off_prefix(&format!("{}:", self.prefix)),
        }
    }

    pub fn emit(&self, name: &str, data: Value) -> EmitResult {
        self.bus.emit(&self.event_name(name), data)
    }

    pub async fn emit_async(&self, name: &str, data: Value) -> EmitResult {
        self.bus.emit_async(&self.event_name(name), data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_namespace_prefixes_names() {
        let bus = EventBus::with_defaults();
        let ns = bus.create_namespace("workout");
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        bus.on("workout:started", move |e| {
            *s.lock().unwrap() = Some(e.data.clone());
            Ok(())
        })
        .unwrap();

        let result = ns.emit("started", json!({"id": 1}));
        assert_eq!(result.listeners_count, 1);
        assert_eq!(*seen.lock().unwrap(), Some(json!({"id": 1})));
        assert_eq!(ns.event_name("started"), "workout:started");
    }

    #[test]
    fn test_namespace_off_clears_only_its_events() {
        let bus = EventBus::with_defaults();
        let ns = bus.create_namespace("timer");
        ns.on("tick", |_| Ok(())).unwrap();
        ns.once("done", |_| Ok(())).unwrap();
        bus.on("timerless", |_| Ok(())).unwrap();

        assert_eq!(ns.off(None, None), 2);
        assert_eq!(bus.get_event_names(), vec!["timerless".to_string()]);
    }

    #[tokio::test]
    async fn test_namespace_emit_async() {
        let bus = EventBus::with_defaults();
        let ns = bus.create_namespace("route");
        ns.once("dashboard", |_| Ok(())).unwrap();
        let result = ns.emit_async("dashboard", Value::Null).await;
        assert_eq!(result.listeners_count, 1);
        assert_eq!(bus.get_listener_count("route:dashboard"), 0);
    }
}
