use std::time::Duration;

use crate::driver::QueryHandle;
use crate::error::PgSteadyError;

/// Default bound on the liveness check.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Statement issued to prove a handle can still serve traffic.
pub const PROBE_STATEMENT: &str = "SELECT 1";

/// Bounded-timeout liveness check.
///
/// Races `SELECT 1` against a timer. The timer winning maps to
/// [`PgSteadyError::ProbeTimeout`]; the driver winning with an empty row set
/// maps to [`PgSteadyError::ProbeFailed`]. The timer is dropped on every exit
/// path.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionProbe {
    timeout: Duration,
}

impl ConnectionProbe {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue the probe statement through `handle`.
    ///
    /// # Errors
    /// `ProbeTimeout` when the timer wins, `ProbeFailed` on an empty row set,
    /// or the driver's own error.
    pub async fn run<H>(&self, handle: &H) -> Result<(), PgSteadyError>
    where
        H: QueryHandle + ?Sized,
    {
        let rows = tokio::time::timeout(self.timeout, handle.run(PROBE_STATEMENT, &[]))
            .await
            .map_err(|_| PgSteadyError::ProbeTimeout(self.timeout))??;
        if rows.is_empty() {
            return Err(PgSteadyError::ProbeFailed);
        }
        Ok(())
    }
}

impl Default for ConnectionProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}
