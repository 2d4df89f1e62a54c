//! In-process pub/sub for push channel and connectivity events.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use tracing::trace;

/// Name of an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A live alert.
    Alert,
    /// Fresh measurements for the current batch.
    Measurement,
    /// Connectivity changed; payload is `{"status": ...}`.
    Connection,
    /// Any other message type received from the push channel.
    Other(String),
}

impl EventKind {
    /// Map a wire `type` string to an event kind.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "alert" => Self::Alert,
            "measurement" => Self::Measurement,
            "connection" => Self::Connection,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name of this event kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Alert => "alert",
            Self::Measurement => "measurement",
            Self::Connection => "connection",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, EventKind, Handler)>,
}

/// Handler registry shared by the sync client and its push channel.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.lock().handlers.len();
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler for `kind`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or disposed.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, kind, Arc::new(handler)));

        Subscription {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Invoke every handler registered for `kind`, in registration order.
    ///
    /// Returns the number of handlers invoked. Handlers may subscribe or
    /// dispose during delivery; such changes apply from the next emit.
    pub fn emit(&self, kind: &EventKind, payload: &Value) -> usize {
        let handlers: Vec<Handler> = self
            .lock()
            .handlers
            .iter()
            .filter(|(_, k, _)| k == kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();

        trace!(event = %kind, handlers = handlers.len(), "Emitting event");
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    /// Number of handlers currently registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.lock()
            .handlers
            .iter()
            .filter(|(_, k, _)| k == kind)
            .count()
    }
}

/// Registration handle returned by [`EventBus::on`].
#[must_use = "dropping a Subscription unregisters its handler"]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Subscription {
    /// Unregister the handler now.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.handlers.retain(|(id, _, _)| *id != self.id);
        }
    }
}
