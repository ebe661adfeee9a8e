use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tracing::warn;

use crate::driver::{QueryHandle, ResourceFactory};
use crate::error::PgSteadyError;
use crate::events::{EventKind, LifecycleEvent};
use crate::supervisor::Supervisor;

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Per-channel callback bundle. `on_data` is required; the rest are optional.
///
/// `on_data` receives the payload parsed as JSON when it parses, or
/// `Value::String` with the raw text when it does not. An error returned from
/// `on_data` is routed to `on_error` of the same subscription.
pub struct ChannelHooks {
    on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    on_disconnect: Option<Box<dyn Fn() + Send + Sync>>,
    on_data: Box<dyn Fn(Value) -> Result<(), CallbackError> + Send + Sync>,
    on_error: Option<Box<dyn Fn(&PgSteadyError) + Send + Sync>>,
}

impl ChannelHooks {
    pub fn new(
        on_data: impl Fn(Value) -> Result<(), CallbackError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_connect: None,
            on_disconnect: None,
            on_data: Box::new(on_data),
            on_error: None,
        }
    }

    #[must_use]
    pub fn on_connect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_disconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&PgSteadyError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    fn connected(&self) {
        if let Some(hook) = &self.on_connect {
            hook();
        }
    }

    fn disconnected(&self) {
        if let Some(hook) = &self.on_disconnect {
            hook();
        }
    }

    fn failed(&self, error: &PgSteadyError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

/// Durable set of `LISTEN` subscriptions over a supervised session.
///
/// Subscriptions survive reconnects: on every supervisor `Reconnect` the
/// manager re-issues `LISTEN` for each mapped channel in order, invoking
/// `on_connect` again on success and that subscription's `on_error` on
/// failure (continuing with the rest). Inbound notifications are
/// demultiplexed by channel name.
///
/// Only meaningful over the single-connection supervisor shape —
/// notifications require a dedicated session — but generic over the factory
/// so the machinery can be exercised against in-process drivers.
pub struct NotificationManager<F: ResourceFactory> {
    supervisor: Arc<Supervisor<F>>,
    channels: Mutex<BTreeMap<String, Arc<ChannelHooks>>>,
    is_shutting_down: AtomicBool,
}

impl<F: ResourceFactory> NotificationManager<F> {
    /// Wire a manager to `supervisor`'s event bus. Replaces any previous
    /// subscriber for the `Reconnect`, `Disconnect` and `Notification`
    /// events.
    pub fn new(supervisor: Arc<Supervisor<F>>) -> Arc<Self> {
        let manager = Arc::new(Self {
            supervisor,
            channels: Mutex::new(BTreeMap::new()),
            is_shutting_down: AtomicBool::new(false),
        });
        Self::register_handlers(&manager);
        manager
    }

    fn register_handlers(manager: &Arc<Self>) {
        let bus = manager.supervisor.events();

        let weak = Arc::downgrade(manager);
        bus.subscribe(EventKind::Reconnect, move |_event| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(manager) = weak.upgrade() {
                    manager.resubscribe_all().await;
                }
                Ok(())
            })
        });

        let weak: Weak<Self> = Arc::downgrade(manager);
        bus.subscribe(EventKind::Disconnect, move |_event| {
            if let Some(manager) = weak.upgrade() {
                manager.notify_disconnected();
            }
            Box::pin(async { Ok(()) })
        });

        let weak: Weak<Self> = Arc::downgrade(manager);
        bus.subscribe(EventKind::Notification, move |event| {
            if let (Some(manager), LifecycleEvent::Notification { channel, payload }) =
                (weak.upgrade(), event)
            {
                manager.dispatch(&channel, &payload);
            }
            Box::pin(async { Ok(()) })
        });
    }

    /// Subscribe to `channel`.
    ///
    /// # Errors
    /// `Shutdown` once shutdown has begun, `ChannelConflict` when the channel
    /// is already mapped, or the `LISTEN` failure (in which case the mapping
    /// is removed again).
    pub async fn listen(&self, channel: &str, hooks: ChannelHooks) -> Result<(), PgSteadyError> {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            return Err(PgSteadyError::Shutdown);
        }
        let hooks = Arc::new(hooks);
        {
            let mut channels = self.lock();
            if channels.contains_key(channel) {
                return Err(PgSteadyError::ChannelConflict(channel.to_string()));
            }
            channels.insert(channel.to_string(), hooks.clone());
        }
        if let Err(error) = self.issue(&listen_statement(channel)).await {
            self.lock().remove(channel);
            return Err(error);
        }
        hooks.connected();
        Ok(())
    }

    /// Drop the subscription for `channel`. The subscription is considered
    /// gone from the caller's view even when the `UNLISTEN` itself fails —
    /// that failure is logged and swallowed.
    ///
    /// # Errors
    /// `ChannelUnknown` when the channel is not mapped.
    pub async fn unlisten(&self, channel: &str) -> Result<(), PgSteadyError> {
        let hooks = self
            .lock()
            .remove(channel)
            .ok_or_else(|| PgSteadyError::ChannelUnknown(channel.to_string()))?;
        if let Err(error) = self.issue(&unlisten_statement(channel)).await {
            warn!(channel, %error, "UNLISTEN failed, subscription dropped anyway");
        }
        hooks.disconnected();
        Ok(())
    }

    /// Channels currently subscribed, in iteration order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Stop accepting subscriptions, shut the supervisor down and clear the
    /// map.
    ///
    /// # Errors
    /// Propagates the supervisor's shutdown error.
    pub async fn shutdown(&self) -> Result<(), PgSteadyError> {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        let result = self.supervisor.shutdown().await;
        self.lock().clear();
        result
    }

    async fn issue(&self, sql: &str) -> Result<(), PgSteadyError> {
        let handle = self.supervisor.acquire().await?;
        handle.run_batch(sql).await
    }

    /// Re-issue `LISTEN` for every mapping after a reconnect. Per-channel
    /// failures go to that subscription's `on_error`; the rest continue.
    async fn resubscribe_all(&self) {
        let entries: Vec<(String, Arc<ChannelHooks>)> = self
            .lock()
            .iter()
            .map(|(channel, hooks)| (channel.clone(), hooks.clone()))
            .collect();
        for (channel, hooks) in entries {
            match self.issue(&listen_statement(&channel)).await {
                Ok(()) => hooks.connected(),
                Err(error) => {
                    warn!(channel, %error, "re-subscribe failed");
                    hooks.failed(&error);
                }
            }
        }
    }

    fn notify_disconnected(&self) {
        let hooks: Vec<Arc<ChannelHooks>> = self.lock().values().cloned().collect();
        for hook in hooks {
            hook.disconnected();
        }
    }

    fn dispatch(&self, channel: &str, payload: &str) {
        if payload.is_empty() {
            return;
        }
        let Some(hooks) = self.lock().get(channel).cloned() else {
            return;
        };
        let value = serde_json::from_str::<Value>(payload)
            .unwrap_or_else(|_| Value::String(payload.to_string()));
        if let Err(error) = (hooks.on_data)(value) {
            let error = PgSteadyError::SubscriberError {
                channel: channel.to_string(),
                message: error.to_string(),
            };
            hooks.failed(&error);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Arc<ChannelHooks>>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Channel names are double-quoted to preserve case; embedded quotes are
/// doubled.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn listen_statement(channel: &str) -> String {
    format!("LISTEN {}", quote_ident(channel))
}

fn unlisten_statement(channel: &str) -> String {
    format!("UNLISTEN {}", quote_ident(channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted_for_case() {
        assert_eq!(listen_statement("orders"), "LISTEN \"orders\"");
        assert_eq!(listen_statement("Orders"), "LISTEN \"Orders\"");
        assert_eq!(unlisten_statement("orders"), "UNLISTEN \"orders\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
