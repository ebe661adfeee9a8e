// Retrying request executors layered over a supervisor.
//
// Both executors share the same skeleton: fail fast once shutdown begins,
// count the request in flight, acquire a handle through the gate per attempt,
// and back off between transient failures. They differ only in the
// per-attempt body (single statement vs BEGIN/COMMIT-bracketed batch).

pub mod query;
pub mod transaction;

pub use query::QueryExecutor;
pub use transaction::TxExecutor;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::info;

use crate::error::PgSteadyError;

/// Default bound on shutdown quiescence.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between in-flight polls while draining.
const QUIESCENCE_POLL: Duration = Duration::from_secs(1);

/// RAII in-flight accounting; decrements on every exit path.
pub(crate) struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    pub(crate) fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Poll `active` until it reaches zero, logging each change, failing with
/// `ShutdownTimeout` when `timeout` elapses first. Requests submitted before
/// shutdown are allowed to finish; the caller has already started rejecting
/// new ones.
pub(crate) async fn drain(
    active: &Arc<AtomicUsize>,
    what: &str,
    timeout: Duration,
) -> Result<(), PgSteadyError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_reported: Option<usize> = None;
    loop {
        let pending = active.load(Ordering::SeqCst);
        if pending == 0 {
            info!(what, "drained, shutdown can proceed");
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PgSteadyError::ShutdownTimeout { pending });
        }
        if last_reported != Some(pending) {
            info!(what, pending, "waiting for in-flight requests");
            last_reported = Some(pending);
        }
        tokio::time::sleep(QUIESCENCE_POLL).await;
    }
}
