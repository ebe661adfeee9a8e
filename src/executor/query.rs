use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::warn;

use super::InFlightGuard;
use crate::driver::{QueryHandle, ResourceFactory};
use crate::error::PgSteadyError;
use crate::results::ResultSet;
use crate::retry::{backoff, classify};
use crate::supervisor::Supervisor;
use crate::types::RowValues;

/// Retrying single-statement executor.
///
/// Transient failures (per [`classify::is_retriable`]) are retried up to
/// `max_attempts` with bounded, jittered backoff; everything else surfaces
/// immediately. Pooled handles are released back to the pool after every
/// attempt, success or failure.
pub struct QueryExecutor<F: ResourceFactory> {
    supervisor: Arc<Supervisor<F>>,
    max_attempts: u32,
    active_requests: Arc<AtomicUsize>,
    is_shutting_down: AtomicBool,
}

impl<F: ResourceFactory> QueryExecutor<F> {
    /// `max_attempts` is floored at 1: one attempt means no retry.
    #[must_use]
    pub fn new(supervisor: Arc<Supervisor<F>>, max_attempts: u32) -> Self {
        Self {
            supervisor,
            max_attempts: max_attempts.max(1),
            active_requests: Arc::new(AtomicUsize::new(0)),
            is_shutting_down: AtomicBool::new(false),
        }
    }

    /// Run one statement with retry.
    ///
    /// # Errors
    /// `Shutdown` once shutdown has begun; otherwise the last attempt's
    /// error, or the first non-retriable one.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            return Err(PgSteadyError::Shutdown);
        }
        let _in_flight = InFlightGuard::enter(&self.active_requests);

        let mut attempt: u32 = 1;
        loop {
            let handle = self.supervisor.acquire().await?;
            match handle.run(sql, params).await {
                Ok(rows) => return Ok(rows),
                Err(error) => {
                    if attempt >= self.max_attempts || !classify::is_retriable(&error) {
                        return Err(error);
                    }
                    // Return the pooled handle before sleeping.
                    drop(handle);
                    let wait = backoff::delay(attempt, &backoff::REQUEST);
                    warn!(attempt, %error, ?wait, "transient failure, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Refuse new work and wait for in-flight requests to drain.
    ///
    /// # Errors
    /// `ShutdownTimeout` when requests are still in flight at `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PgSteadyError> {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        super::drain(&self.active_requests, "query executor", timeout).await
    }

    #[must_use]
    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
