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
use crate::types::QueryAndParams;

/// Retrying multi-statement transaction executor.
///
/// Each attempt brackets the whole batch in `BEGIN`/`COMMIT` on one handle,
/// executing statements in input order. Any failure after `BEGIN` triggers a
/// `ROLLBACK` (whose own failure is logged and swallowed) before the original
/// error is considered for retry. The batch retries as a unit; there is no
/// partial re-execution.
pub struct TxExecutor<F: ResourceFactory> {
    supervisor: Arc<Supervisor<F>>,
    max_attempts: u32,
    active_requests: Arc<AtomicUsize>,
    is_shutting_down: AtomicBool,
}

impl<F: ResourceFactory> TxExecutor<F> {
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

    /// Run the batch as one transaction, returning each statement's rows in
    /// input order.
    ///
    /// # Errors
    /// `Shutdown` once shutdown has begun; otherwise the last attempt's
    /// error, or the first non-retriable one.
    pub async fn execute(
        &self,
        batch: &[QueryAndParams],
    ) -> Result<Vec<ResultSet>, PgSteadyError> {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            return Err(PgSteadyError::Shutdown);
        }
        let _in_flight = InFlightGuard::enter(&self.active_requests);

        let mut attempt: u32 = 1;
        loop {
            let handle = self.supervisor.acquire().await?;
            match Self::run_once(&handle, batch).await {
                Ok(results) => return Ok(results),
                Err(error) => {
                    if attempt >= self.max_attempts || !classify::is_retriable(&error) {
                        return Err(error);
                    }
                    drop(handle);
                    let wait = backoff::delay(attempt, &backoff::REQUEST);
                    warn!(attempt, %error, ?wait, "transaction failed transiently, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_once(
        handle: &F::Handle,
        batch: &[QueryAndParams],
    ) -> Result<Vec<ResultSet>, PgSteadyError> {
        handle.run_batch("BEGIN").await?;
        match Self::apply(handle, batch).await {
            Ok(results) => Ok(results),
            Err(error) => {
                if let Err(rollback_error) = handle.run_batch("ROLLBACK").await {
                    warn!(%rollback_error, "rollback failed after aborted transaction");
                }
                Err(error)
            }
        }
    }

    async fn apply(
        handle: &F::Handle,
        batch: &[QueryAndParams],
    ) -> Result<Vec<ResultSet>, PgSteadyError> {
        let mut results = Vec::with_capacity(batch.len());
        for step in batch {
            results.push(handle.run(&step.query, &step.params).await?);
        }
        handle.run_batch("COMMIT").await?;
        Ok(results)
    }

    /// Refuse new work and wait for in-flight transactions to drain.
    ///
    /// # Errors
    /// `ShutdownTimeout` when transactions are still in flight at `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PgSteadyError> {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        super::drain(&self.active_requests, "transaction executor", timeout).await
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
