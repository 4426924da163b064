//! Event name keyed listener registry with synchronous fan-out.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde_json::Value;

/// A callback registered for one event name.
///
/// Identity is the `Arc` allocation: registering a clone of the same
/// `Listener` twice for one event keeps a single entry.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

type ListenerMap = HashMap<String, Vec<Listener>>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Subscribe/unsubscribe/fan-out registry keyed by event name.
///
/// Cloning shares the same listener table.
#[derive(Clone, Default)]
pub struct EventRegistry {
    listeners: Arc<RwLock<ListenerMap>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `event`. Returns a handle that removes it again.
    pub fn on(&self, event: impl Into<String>, listener: Listener) -> Subscription {
        let event = event.into();
        {
            let mut listeners = self.write();
            let entry = listeners.entry(event.clone()).or_default();
            if !entry.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                entry.push(listener.clone());
            }
        }

        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            event,
            listener,
        }
    }

    /// Remove one listener, or every listener for `event` when `None`
    pub fn off(&self, event: &str, listener: Option<&Listener>) {
        remove(&self.listeners, event, listener);
    }

    /// Call every listener registered for `event`, in registration order.
    ///
    /// A panicking listener is logged and skipped; the others still run.
    /// Returns the number of listeners that completed normally.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        // Snapshot so listeners can (un)subscribe while being called
        let snapshot: Vec<Listener> = match self.read().get(event) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    let cause = cause
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| cause.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(event = %event, cause = %cause, "Event listener panicked");
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.read().get(event).map_or(0, Vec::len)
    }

    /// Drop every listener for every event
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ListenerMap> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ListenerMap> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove(listeners: &RwLock<ListenerMap>, event: &str, listener: Option<&Listener>) {
    let mut listeners = listeners.write().unwrap_or_else(PoisonError::into_inner);
    match listener {
        Some(listener) => {
            if let Some(entry) = listeners.get_mut(event) {
                entry.retain(|l| !Arc::ptr_eq(l, listener));
                if entry.is_empty() {
                    listeners.remove(event);
                }
            }
        }
        None => {
            listeners.remove(event);
        }
    }
}

/// Handle returned by [`EventRegistry::on`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    listeners: Weak<RwLock<ListenerMap>>,
    event: String,
    listener: Listener,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            remove(&listeners, &self.event, Some(&self.listener));
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
