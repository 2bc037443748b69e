//! Event Bus - central pub/sub hub for SmartTrack modules
//!
//! Listeners run synchronously inside `emit`, in registration order, durable
//! listeners before one-shot listeners. The bus never holds its lock while a
//! listener runs, so listeners may freely emit, subscribe or unsubscribe.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::namespace::Namespace;
use super::types::{BusStats, EmitResult, Event, EventBusError, ListenerFailure, WaitedEvent, names};

/// Default number of events kept in history
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Default `wait_for` timeout
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Listener callback. An `Err` or a panic counts as a failed invocation.
pub type Listener = Arc<dyn Fn(&Event) -> eyre::Result<()> + Send + Sync>;

/// Transform applied to every event before dispatch. `None` keeps the event as is.
pub type EventMiddleware = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

#[derive(Clone)]
struct Registration {
    id: String,
    callback: Listener,
}

struct BusState {
    listeners: HashMap<String, Vec<Registration>>,
    once_listeners: HashMap<String, Vec<Registration>>,
    history: VecDeque<Event>,
    history_capacity: usize,
    middleware: Vec<EventMiddleware>,
    wait_timeout: Duration,
}

impl BusState {
    fn remove_by_id(&mut self, event_name: &str, listener_id: &str) -> usize {
        let mut removed = 0;
        for registry in [&mut self.listeners, &mut self.once_listeners] {
            if let Some(list) = registry.get_mut(event_name) {
                let before = list.len();
                list.retain(|r| r.id != listener_id);
                removed += before - list.len();
                if list.is_empty() {
                    registry.remove(event_name);
                }
            }
        }
        removed
    }

    fn remove_matching(&mut self, matches: impl Fn(&str) -> bool) -> usize {
        let mut removed = 0;
        for registry in [&mut self.listeners, &mut self.once_listeners] {
            registry.retain(|name, list| {
                if matches(name) {
                    removed += list.len();
                    false
                } else {
                    true
                }
            });
        }
        removed
    }
}

/// Handle returned by `on`/`once`
///
/// Dropping it does NOT unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Clone, Debug)]
pub struct Subscription {
    bus: Weak<Mutex<BusState>>,
    event: String,
    id: String,
}

impl Subscription {
    /// Listener ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event name this listener is registered for
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove exactly this listener. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(state) = self.bus.upgrade() else {
            return false;
        };
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove_by_id(&self.event, &self.id) > 0
    }
}

/// Process-wide publish/subscribe hub
///
/// Cheap to clone; all clones share the same registries and history.
#[derive(Clone)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    /// Create a bus with the given history capacity and default `wait_for` timeout
    pub fn new(history_capacity: usize, wait_timeout: Duration) -> Self {
        debug!(history_capacity, ?wait_timeout, "EventBus::new: creating event bus");
        Self {
            state: Arc::new(Mutex::new(BusState {
                listeners: HashMap::new(),
                once_listeners: HashMap::new(),
                history: VecDeque::with_capacity(history_capacity),
                history_capacity,
                middleware: Vec::new(),
                wait_timeout,
            })),
        }
    }

    /// Create a bus with default settings
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_WAIT_TIMEOUT)
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        // Listeners never run under the lock, so poisoning only follows a
        // panic inside the bus itself; the state is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a durable listener
    ///
    /// Returns `None` (and logs) when the event name is empty.
    pub fn on<F>(&self, event_name: &str, callback: F) -> Option<Subscription>
    where
        F: Fn(&Event) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.register(event_name, Arc::new(callback), false)
    }

    /// Register a listener that is removed after its first invocation
    pub fn once<F>(&self, event_name: &str, callback: F) -> Option<Subscription>
    where
        F: Fn(&Event) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.register(event_name, Arc::new(callback), true)
    }

    fn register(&self, event_name: &str, callback: Listener, once: bool) -> Option<Subscription> {
        if event_name.trim().is_empty() {
            error!(once, "EventBus::register: event name must not be empty, listener ignored");
            return None;
        }

        let id = Uuid::now_v7().to_string();
        debug!(event = event_name, %id, once, "EventBus::register");

        let mut state = self.state();
        let registry = if once {
            &mut state.once_listeners
        } else {
            &mut state.listeners
        };
        registry.entry(event_name.to_string()).or_default().push(Registration {
            id: id.clone(),
            callback,
        });

        Some(Subscription {
            bus: Arc::downgrade(&self.state),
            event: event_name.to_string(),
            id,
        })
    }

    /// Remove listeners
    ///
    /// - `(None, _)`: every listener of every event
    /// - `(Some(name), None)`: every listener of `name`
    /// - `(Some(name), Some(id))`: exactly one listener
    ///
    /// Returns the number of registrations removed.
    pub fn off(&self, event_name: Option<&str>, listener_id: Option<&str>) -> usize {
        debug!(?event_name, ?listener_id, "EventBus::off");
        let mut state = self.state();
        match (event_name, listener_id) {
            (None, _) => state.remove_matching(|_| true),
            (Some(name), None) => state.remove_matching(|n| n == name),
            (Some(name), Some(id)) => state.remove_by_id(name, id),
        }
    }

    /// Remove every listener whose event name starts with `prefix`
    pub(crate) fn off_prefix(&self, prefix: &str) -> usize {
        self.state().remove_matching(|n| n.starts_with(prefix))
    }

    /// Register a middleware applied to every emitted event, in registration order
    pub fn use_middleware<F>(&self, middleware: F)
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        let mut state = self.state();
        state.middleware.push(Arc::new(middleware));
        debug!(count = state.middleware.len(), "EventBus::use_middleware");
    }

    /// Emit an event synchronously
    ///
    /// Every durable listener runs, then every one-shot listener. One-shot
    /// listeners are detached as a group before any of them runs, so a
    /// re-entrant emit of the same event never fires them twice. Listeners
    /// registered during this emit are not invoked by it.
    pub fn emit(&self, event_name: &str, data: Value) -> EmitResult {
        let middleware = self.state().middleware.clone();
        let mut event = Event::new(event_name, data);
        for transform in &middleware {
            if let Some(transformed) = transform(event.clone()) {
                event = transformed;
            }
        }

        let (durable, once) = {
            let mut state = self.state();
            state.history.push_back(event.clone());
            while state.history.len() > state.history_capacity {
                state.history.pop_front();
            }
            let durable = state.listeners.get(&event.name).cloned().unwrap_or_default();
            let once = state.once_listeners.remove(&event.name).unwrap_or_default();
            (durable, once)
        };

        let mut result = EmitResult {
            listeners_count: durable.len() + once.len(),
            errors: Vec::new(),
        };

        for registration in durable.iter().chain(once.iter()) {
            if let Some(message) = invoke(registration, &event) {
                error!(event = %event.name, listener_id = %registration.id, error = %message, "Listener failed");
                result.errors.push(ListenerFailure {
                    listener_id: registration.id.clone(),
                    error: message,
                });
            }
        }

        debug!(
            event = %event.name,
            listeners = result.listeners_count,
            errors = result.errors.len(),
            "EventBus::emit"
        );

        if !result.errors.is_empty() && event.name != names::EVENTBUS_ERROR {
            self.schedule_error_report(&event.name, &result.errors);
        }

        result
    }

    /// Emit on the next scheduler tick
    pub async fn emit_async(&self, event_name: &str, data: Value) -> EmitResult {
        tokio::task::yield_now().await;
        self.emit(event_name, data)
    }

    /// Report listener failures as an `eventbus:error` event on a later tick
    fn schedule_error_report(&self, event_name: &str, errors: &[ListenerFailure]) {
        let data = json!({ "event": event_name, "errors": errors });
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let bus = self.clone();
                handle.spawn(async move {
                    bus.emit(names::EVENTBUS_ERROR, data);
                });
            }
            Err(_) => {
                warn!(event = event_name, "No async runtime, dropping eventbus:error report");
            }
        }
    }

    /// Wait for the next occurrence of an event
    ///
    /// A zero timeout waits forever. On timeout the internal listener is
    /// removed before the error is returned.
    pub async fn wait_for(&self, event_name: &str, timeout: Duration) -> Result<WaitedEvent, EventBusError> {
        debug!(event = event_name, ?timeout, "EventBus::wait_for");
        let (tx, rx) = oneshot::channel::<Event>();
        let tx = Mutex::new(Some(tx));

        let subscription = self
            .once(event_name, move |event| {
                if let Some(tx) = tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(event.clone());
                }
                Ok(())
            })
            .ok_or_else(|| EventBusError::InvalidEventName(event_name.to_string()))?;

        let event = if timeout.is_zero() {
            rx.await
                .map_err(|_| EventBusError::Cancelled(event_name.to_string()))?
        } else {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(event)) => event,
                Ok(Err(_)) => return Err(EventBusError::Cancelled(event_name.to_string())),
                Err(_) => {
                    subscription.unsubscribe();
                    return Err(EventBusError::Timeout {
                        event: event_name.to_string(),
                        timeout_ms: timeout.as_millis(),
                    });
                }
            }
        };

        Ok(WaitedEvent {
            data: event.data.clone(),
            event,
        })
    }

    /// `wait_for` with the bus's configured default timeout
    pub async fn wait_for_default(&self, event_name: &str) -> Result<WaitedEvent, EventBusError> {
        let timeout = self.state().wait_timeout;
        self.wait_for(event_name, timeout).await
    }

    /// Create a view of this bus that prefixes event names with `"{prefix}:"`
    pub fn create_namespace(&self, prefix: &str) -> Namespace {
        Namespace::new(self.clone(), prefix)
    }

    // === Introspection ===

    /// Event names that currently have at least one listener, sorted
    pub fn get_event_names(&self) -> Vec<String> {
        let state = self.state();
        let mut names: Vec<String> = state
            .listeners
            .keys()
            .chain(state.once_listeners.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Durable plus one-shot listeners registered for an event
    pub fn get_listener_count(&self, event_name: &str) -> usize {
        let state = self.state();
        state.listeners.get(event_name).map_or(0, Vec::len) + state.once_listeners.get(event_name).map_or(0, Vec::len)
    }

    pub fn get_stats(&self) -> BusStats {
        let event_names = self.get_event_names().len();
        let state = self.state();
        BusStats {
            event_names,
            listeners: state.listeners.values().map(Vec::len).sum(),
            once_listeners: state.once_listeners.values().map(Vec::len).sum(),
            history_size: state.history.len(),
            history_capacity: state.history_capacity,
            middleware: state.middleware.len(),
        }
    }

    /// The most recent `limit` events (all when `None`), oldest first
    pub fn get_history(&self, limit: Option<usize>) -> Vec<Event> {
        let state = self.state();
        let skip = limit.map_or(0, |l| state.history.len().saturating_sub(l));
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.state().history.clear();
    }

    /// History events whose name matches a regular expression
    pub fn filter_events(&self, pattern: &str) -> Result<Vec<Event>, EventBusError> {
        let regex = regex::Regex::new(pattern)?;
        let state = self.state();
        Ok(state.history.iter().filter(|e| regex.is_match(&e.name)).cloned().collect())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Run one listener, returning its failure message if it errored or panicked
fn invoke(registration: &Registration, event: &Event) -> Option<String> {
    match catch_unwind(AssertUnwindSafe(|| (registration.callback)(event))) {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("listener panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("listener panicked: {}", s)
    } else {
        "listener panicked".to_string()
    }
}
