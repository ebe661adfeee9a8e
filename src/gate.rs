use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::PgSteadyError;

/// Why a gate rejected its waiters.
#[derive(Clone, Debug)]
pub enum CloseReason {
    /// The layer is shutting down; no more work will be admitted.
    Shutdown,
    /// The connection went away for the stated reason.
    ConnectionLost(String),
}

impl From<CloseReason> for PgSteadyError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Shutdown => PgSteadyError::Shutdown,
            CloseReason::ConnectionLost(message) => PgSteadyError::ConnectionError(message),
        }
    }
}

struct GateInner {
    open: bool,
    waiters: Vec<oneshot::Sender<Result<(), CloseReason>>>,
}

/// Readiness barrier serializing request admission against connection
/// availability.
///
/// Created closed. [`Gate::open`] releases every parked waiter; a silent
/// [`Gate::close`] parks new callers without failing anyone (they ride out
/// the blip and are released on the next open), while
/// [`Gate::close_with`] fails every current waiter with the given reason.
///
/// The inner mutex is never held across an await point: waiters are drained
/// under the lock and completed after it is released.
pub struct Gate {
    inner: Mutex<GateInner>,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                open: false,
                waiters: Vec::new(),
            }),
        }
    }

    /// Release all parked waiters. Returns how many were released; 0 and
    /// no-op when the gate is already open.
    pub fn open(&self) -> usize {
        let waiters = {
            let mut inner = self.lock();
            if inner.open {
                return 0;
            }
            inner.open = true;
            std::mem::take(&mut inner.waiters)
        };
        waiters
            .into_iter()
            .filter_map(|waiter| waiter.send(Ok(())).ok())
            .count()
    }

    /// Close silently: existing waiters stay parked and are carried over to
    /// the next open; new callers queue.
    pub fn close(&self) {
        self.lock().open = false;
    }

    /// Close and fail every current waiter with `reason`. Returns how many
    /// waiters were rejected. Idempotent on an already-closed, empty gate.
    pub fn close_with(&self, reason: CloseReason) -> usize {
        let waiters = {
            let mut inner = self.lock();
            inner.open = false;
            std::mem::take(&mut inner.waiters)
        };
        waiters
            .into_iter()
            .filter_map(|waiter| waiter.send(Err(reason.clone())).ok())
            .count()
    }

    /// Wait for the gate to open. Completes immediately when open; otherwise
    /// parks until the next [`Gate::open`] (`Ok`) or
    /// [`Gate::close_with`] (`Err`). Dropping the returned future abandons
    /// the slot without waking anyone else.
    pub async fn wait(&self) -> Result<(), CloseReason> {
        let receiver = {
            let mut inner = self.lock();
            if inner.open {
                return Ok(());
            }
            // Purge slots whose waiters were cancelled.
            inner.waiters.retain(|waiter| !waiter.is_closed());
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            rx
        };
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CloseReason::ConnectionLost("gate dropped".to_string())),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Count of live parked waiters.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.lock()
            .waiters
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
