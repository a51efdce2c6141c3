//! Synchronous in-process event bus shared by the host and its extensions.
//!
//! Delivery happens inside `emit`, in subscription order. Nothing is
//! buffered: a handler subscribed after an emission never sees it.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

/// Event handler. An `Err` or a panic is logged and does not stop delivery
/// to the remaining handlers.
pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

struct Subscriber {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: HashMap<String, Vec<Subscriber>>,
}

/// Publish/subscribe channel. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventBus").field("events", &inner.subscribers.len()).finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `event`.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(event.to_string())
            .or_default()
            .push(Subscriber { id, handler: Arc::new(handler) });

        Subscription { bus: Arc::downgrade(&self.inner), event: event.to_string(), id }
    }

    /// Deliver `payload` to every current subscriber of `event`.
    ///
    /// Returns how many handlers completed without error.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        // Snapshot so handlers may subscribe or emit re-entrantly.
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock();
            match inner.subscribers.get(event) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.handler)).collect(),
                None => return 0,
            }
        };

        tracing::debug!(event, subscribers = handlers.len(), "Emitting event");

        let mut delivered = 0;
        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(event, cause = %format!("{e:#}"), "Event handler failed");
                }
                Err(panic) => {
                    tracing::warn!(event, cause = %panic_message(panic.as_ref()), "Event handler panicked");
                }
            }
        }
        delivered
    }

    /// Number of handlers subscribed to `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.lock().subscribers.get(event).map_or(0, Vec::len)
    }
}

fn remove(inner: &Mutex<BusInner>, event: &str, id: u64) -> bool {
    let mut inner = inner.lock();
    let Some(subs) = inner.subscribers.get_mut(event) else {
        return false;
    };
    let before = subs.len();
    subs.retain(|s| s.id != id);
    let removed = subs.len() != before;
    if subs.is_empty() {
        inner.subscribers.remove(event);
    }
    removed
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<Mutex<BusInner>>,
    event: String,
    id: u64,
}

impl Subscription {
    /// Event this subscription listens to.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the handler. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        self.bus.upgrade().is_some_and(|inner| remove(&inner, &self.event, self.id))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |name: &str| -> Handler {
                let log = Arc::clone(&log);
                let name = name.to_string();
                Arc::new(move |payload: &Value| {
                    log.lock().push(format!("{name}:{payload}"));
                    Ok(())
                })
            }
        };
        (log, make)
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let first = make("first");
        let second = make("second");
        bus.subscribe("x", move |p| first(p));
        bus.subscribe("x", move |p| second(p));

        assert_eq!(bus.emit("x", json!(1)), 2);
        assert_eq!(*log.lock(), ["first:1", "second:1"]);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let second = make("second");
        bus.subscribe("x", |_| anyhow::bail!("boom"));
        bus.subscribe("x", |_| panic!("kaboom"));
        bus.subscribe("x", move |p| second(p));

        assert_eq!(bus.emit("x", json!("P")), 1);
        assert_eq!(*log.lock(), ["second:\"P\""]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let handler = make("h");
        let sub = bus.subscribe("test:event", move |p| handler(p));

        bus.emit("test:event", json!({"ok": true}));
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        bus.emit("test:event", json!({"ok": true}));

        assert_eq!(log.lock().len(), 1);
        assert_eq!(bus.subscriber_count("test:event"), 0);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.emit("x", json!(1));
        let late = make("late");
        bus.subscribe("x", move |p| late(p));

        assert!(log.lock().is_empty());
        assert_eq!(bus.emit("unknown", Value::Null), 0);
    }

    #[test]
    fn test_reentrant_emit() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let inner = make("inner");
        bus.subscribe("inner", move |p| inner(p));

        let relay = bus.clone();
        bus.subscribe("outer", move |p| {
            relay.emit("inner", p.clone());
            Ok(())
        });

        bus.emit("outer", json!(7));
        assert_eq!(*log.lock(), ["inner:7"]);
    }
}
