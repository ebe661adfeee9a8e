use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::warn;

/// Event names emitted over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Reconnect,
    Notification,
}

/// Lifecycle signals broadcast by a supervisor.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Connect,
    Disconnect { reason: Option<String> },
    Reconnect { reason: Option<String> },
    Notification { channel: String, payload: String },
}

impl LifecycleEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::Reconnect { .. } => EventKind::Reconnect,
            Self::Notification { .. } => EventKind::Notification,
        }
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
type Handler =
    Arc<dyn Fn(LifecycleEvent) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Typed lifecycle broadcaster with at most one subscriber per event kind.
///
/// Subscribing replaces any previous subscriber for that kind; consumers that
/// need fan-out do it downstream of their single subscription. Emission never
/// surfaces a handler failure to the emitter — failures are logged and
/// swallowed so the supervisor's state machine cannot be derailed by user
/// callbacks.
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Handler>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(LifecycleEvent) -> BoxFuture<'static, Result<(), HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        self.lock().insert(kind, Arc::new(handler));
    }

    /// Drop the subscriber for `kind`, if any.
    pub fn unsubscribe(&self, kind: EventKind) {
        self.lock().remove(&kind);
    }

    /// Deliver `event` to its subscriber, if any. Handler errors are logged,
    /// never propagated.
    pub async fn emit(&self, event: LifecycleEvent) {
        let handler = self.lock().get(&event.kind()).cloned();
        let Some(handler) = handler else { return };
        let kind = event.kind();
        if let Err(error) = handler(event).await {
            warn!(?kind, %error, "event subscriber failed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Handler>> {
        match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
