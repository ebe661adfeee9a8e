use std::time::Duration;

use thiserror::Error;

/// Errors produced by the access layer.
///
/// Driver errors pass through transparently; everything the layer itself
/// detects (configuration gaps, shutdown races, probe outcomes) gets its own
/// variant so callers can match on the failure kind instead of parsing
/// messages.
#[derive(Debug, Error)]
pub enum PgSteadyError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] bb8::RunError<tokio_postgres::Error>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// A database-style failure carrying an explicit SQLSTATE or OS error
    /// code. Produced by in-process drivers (tests, adapters); real
    /// `tokio_postgres` failures keep their native type above.
    #[error("SQL state {code}: {message}")]
    SqlState { code: String, message: String },

    #[error("Shutdown in progress")]
    Shutdown,

    #[error("Shutdown timed out with {pending} request(s) still in flight")]
    ShutdownTimeout { pending: usize },

    #[error("Liveness probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("Liveness probe returned no rows")]
    ProbeFailed,

    #[error("Already listening on channel \"{0}\"")]
    ChannelConflict(String),

    #[error("No subscription for channel \"{0}\"")]
    ChannelUnknown(String),

    #[error("Notification handler for channel \"{channel}\" failed: {message}")]
    SubscriberError { channel: String, message: String },

    /// Composite failure from a facade shutdown where one or more subordinate
    /// shutdowns failed.
    #[error("Shutdown finished with {} failure(s): [{}]", .0.len(), format_causes(.0))]
    ShutdownAggregate(Vec<PgSteadyError>),
}

impl PgSteadyError {
    /// True for the variant raised when a request arrives after shutdown
    /// began.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

fn format_causes(errors: &[PgSteadyError]) -> String {
    let causes: Vec<String> = errors.iter().map(ToString::to_string).collect();
    causes.join("; ")
}
