use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::driver::{DriverEvent, PoolFactory, PoolMetrics, ResourceFactory};
use crate::error::PgSteadyError;
use crate::events::{EventBus, LifecycleEvent};
use crate::gate::{CloseReason, Gate};
use crate::probe::{ConnectionProbe, DEFAULT_PROBE_TIMEOUT};
use crate::retry::backoff;

/// Lifecycle phases of a supervised resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Connecting,
    Ready,
    Reconnecting,
    Destroying,
    ShutDown,
}

/// Supervisor tuning.
#[derive(Clone, Copy, Debug)]
pub struct SupervisorOptions {
    pub probe_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Owns the driver resource and drives its state machine: connect → verify →
/// open gate → detect failure → close gate → destroy → reconnect with
/// backoff.
///
/// Runtime failures never surface to callers from here; they are logged and
/// routed into the reconnect loop. Callers interact through
/// [`Supervisor::acquire`] and [`Supervisor::shutdown`]; everything the
/// supervisor wants to tell the world goes out over the [`EventBus`].
pub struct Supervisor<F: ResourceFactory> {
    factory: F,
    gate: Gate,
    bus: Arc<EventBus>,
    probe: ConnectionProbe,
    resource: RwLock<Option<F::Resource>>,
    state: Mutex<SupervisorState>,
    events: mpsc::UnboundedSender<DriverEvent>,
    is_shutting_down: AtomicBool,
    is_reconnecting: AtomicBool,
}

impl<F: ResourceFactory> Supervisor<F> {
    /// Connect, verify, open the gate and start fault monitoring.
    ///
    /// # Errors
    /// Initial connect or probe failure is fatal and propagates; runtime
    /// failures after a successful start never do.
    pub async fn start(
        factory: F,
        bus: Arc<EventBus>,
        options: SupervisorOptions,
    ) -> Result<Arc<Self>, PgSteadyError> {
        let (events, inbox) = mpsc::unbounded_channel();
        let supervisor = Arc::new(Self {
            factory,
            gate: Gate::new(),
            bus,
            probe: ConnectionProbe::new(options.probe_timeout),
            resource: RwLock::new(None),
            state: Mutex::new(SupervisorState::Connecting),
            events,
            is_shutting_down: AtomicBool::new(false),
            is_reconnecting: AtomicBool::new(false),
        });

        supervisor.establish().await?;
        supervisor.set_state(SupervisorState::Ready);
        let released = supervisor.gate.open();
        debug!(released, "gate opened");
        supervisor.bus.emit(LifecycleEvent::Connect).await;

        tokio::spawn(Self::monitor(Arc::downgrade(&supervisor), inbox));

        Ok(supervisor)
    }

    /// Wait for readiness and hand out a live handle.
    ///
    /// # Errors
    /// `Shutdown` when the supervisor is shutting down (checked both before
    /// and after the gate), or the factory's acquire error.
    pub async fn acquire(&self) -> Result<F::Handle, PgSteadyError> {
        if self.is_shutting_down() {
            return Err(PgSteadyError::Shutdown);
        }
        self.gate.wait().await?;
        if self.is_shutting_down() {
            return Err(PgSteadyError::Shutdown);
        }
        let guard = self.resource.read().await;
        let resource = guard
            .as_ref()
            .ok_or_else(|| PgSteadyError::ConnectionError("connection is gone".to_string()))?;
        self.factory.acquire(resource).await
    }

    /// Stop admitting work and tear the resource down. Idempotent; internal
    /// destroy failures are logged, never raised.
    pub async fn shutdown(&self) -> Result<(), PgSteadyError> {
        if self.is_shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.set_state(SupervisorState::Destroying);
        self.bus
            .emit(LifecycleEvent::Disconnect {
                reason: Some("shutdown".to_string()),
            })
            .await;
        let rejected = self.gate.close_with(CloseReason::Shutdown);
        if rejected > 0 {
            debug!(rejected, "gate closed, pending waiters rejected");
        }
        if let Some(resource) = self.resource.write().await.take() {
            if let Err(error) = self.factory.destroy(resource).await {
                warn!(%error, "destroying connection resource failed");
            }
        }
        self.set_state(SupervisorState::ShutDown);
        info!("supervisor shut down");
        Ok(())
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// The bus this supervisor signals on.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[must_use]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Create and verify a fresh resource, then install it.
    async fn establish(&self) -> Result<(), PgSteadyError> {
        let resource = self.factory.create(self.events.clone()).await?;
        if let Err(error) = self.probe_resource(&resource).await {
            if let Err(destroy_error) = self.factory.destroy(resource).await {
                warn!(%destroy_error, "destroying unverified resource failed");
            }
            return Err(error);
        }
        *self.resource.write().await = Some(resource);
        Ok(())
    }

    async fn probe_resource(&self, resource: &F::Resource) -> Result<(), PgSteadyError> {
        let handle = self.factory.acquire(resource).await?;
        self.probe.run(&handle).await
    }

    /// Consume driver signals for the supervisor's lifetime. Stale-resource
    /// events are tolerated: fault handling re-verifies whatever resource is
    /// current before tearing anything down. Holds only a weak reference so
    /// a dropped supervisor is not kept alive by its own monitor.
    async fn monitor(weak: Weak<Self>, mut inbox: mpsc::UnboundedReceiver<DriverEvent>) {
        while let Some(event) = inbox.recv().await {
            let Some(supervisor) = weak.upgrade() else {
                break;
            };
            if supervisor.is_shutting_down() {
                break;
            }
            match event {
                DriverEvent::Notification { channel, payload } => {
                    supervisor
                        .bus
                        .emit(LifecycleEvent::Notification { channel, payload })
                        .await;
                }
                DriverEvent::Error(reason) => supervisor.verify_or_reconnect(&reason).await,
                DriverEvent::Closed => {
                    supervisor.reconnect("connection ended".to_string()).await;
                }
            }
        }
    }

    /// A driver error does not always mean the connection is dead: probe the
    /// current resource and only reconnect when the probe fails.
    async fn verify_or_reconnect(&self, reason: &str) {
        warn!(reason, "driver fault reported");
        let healthy = {
            let guard = self.resource.read().await;
            match guard.as_ref() {
                None => false,
                Some(resource) => self.probe_resource(resource).await.is_ok(),
            }
        };
        if healthy {
            debug!("connection still alive after driver fault");
            return;
        }
        self.reconnect(reason.to_string()).await;
    }

    /// Unbounded reconnect loop: destroy stale, create fresh, verify, reopen
    /// the gate. Only shutdown stops it. The gate is closed silently so
    /// callers park and ride out the outage instead of failing.
    async fn reconnect(&self, reason: String) {
        if self.is_shutting_down() || self.is_reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        self.gate.close();
        self.set_state(SupervisorState::Reconnecting);
        info!(%reason, "connection lost, reconnecting");

        let mut attempt: u32 = 0;
        while !self.is_shutting_down() {
            attempt += 1;
            if let Some(stale) = self.resource.write().await.take() {
                if let Err(error) = self.factory.destroy(stale).await {
                    warn!(%error, "destroying stale resource failed");
                }
            }
            match self.establish().await {
                Ok(()) => {
                    if self.is_shutting_down() {
                        // Shutdown raced the reconnect; the fresh resource
                        // must not outlive it.
                        if let Some(resource) = self.resource.write().await.take() {
                            if let Err(error) = self.factory.destroy(resource).await {
                                warn!(%error, "destroying post-shutdown resource failed");
                            }
                        }
                        break;
                    }
                    self.set_state(SupervisorState::Ready);
                    let released = self.gate.open();
                    info!(attempt, released, "reconnected");
                    self.bus
                        .emit(LifecycleEvent::Reconnect {
                            reason: Some(reason.clone()),
                        })
                        .await;
                    break;
                }
                Err(error) => {
                    let wait = backoff::delay(attempt, &backoff::RECONNECT);
                    warn!(attempt, %error, ?wait, "reconnect attempt failed");
                    tokio::time::sleep(wait).await;
                }
            }
        }
        self.is_reconnecting.store(false, Ordering::SeqCst);
    }

    fn set_state(&self, next: SupervisorState) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next;
    }
}

impl Supervisor<PoolFactory> {
    /// Sample pool occupancy.
    ///
    /// # Errors
    /// `ConnectionError` when no pool is currently installed (mid-reconnect
    /// or after shutdown).
    pub async fn metrics(&self) -> Result<PoolMetrics, PgSteadyError> {
        let guard = self.resource.read().await;
        let pool = guard
            .as_ref()
            .ok_or_else(|| PgSteadyError::ConnectionError("pool is gone".to_string()))?;
        Ok(self.factory.metrics(pool))
    }
}
