// Driver seam between the supervisor and the wire-level PostgreSQL stack.
//
// The supervisor is generic over a `ResourceFactory` with three capabilities
// (create, acquire, destroy); the single-connection and pooled shapes are the
// two production implementations. Fault and notification signals flow back
// over one shared channel for the supervisor's whole lifetime, so events from
// a stale resource are harmless — fault handling always re-verifies whatever
// resource is current.

pub mod params;
pub mod pool;
pub mod postgres;
pub mod session;

pub use pool::{PgPoolManager, PoolFactory, PoolMetrics};
pub use session::{PgSession, SessionFactory};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PgSteadyError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Asynchronous signals surfaced by a live resource.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// The driver reported an error; the connection may or may not be dead.
    Error(String),
    /// The connection ended.
    Closed,
    /// An inbound `NOTIFY` on a subscribed channel.
    Notification { channel: String, payload: String },
}

/// A live handle capable of executing SQL. Executors only ever call these two
/// methods; they never close the handle (pooled handles return to the pool on
/// drop, session handles are shared).
#[async_trait]
pub trait QueryHandle: Send + Sync {
    /// Run a parameterized statement, returning its rows.
    async fn run(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, PgSteadyError>;

    /// Run one or more statements that produce no row set
    /// (`BEGIN`/`COMMIT`/`ROLLBACK`/`LISTEN`/`UNLISTEN`).
    async fn run_batch(&self, sql: &str) -> Result<(), PgSteadyError>;
}

/// Abstraction over the two underlying driver shapes: an owned session whose
/// `acquire` hands out the same handle every time, and a pool whose `acquire`
/// performs a checkout.
///
/// Ownership of the resource is exclusive to the supervisor that created it;
/// only the supervisor calls `destroy`.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// Long-lived resource owned by the supervisor.
    type Resource: Send + Sync + 'static;
    /// Short-lived handle used for one request.
    type Handle: QueryHandle + Send + Sync + 'static;

    /// Establish the resource, wiring its fault/notification signals to
    /// `events`.
    async fn create(
        &self,
        events: mpsc::UnboundedSender<DriverEvent>,
    ) -> Result<Self::Resource, PgSteadyError>;

    /// Hand out a handle for one request.
    async fn acquire(&self, resource: &Self::Resource) -> Result<Self::Handle, PgSteadyError>;

    /// Tear the resource down. Failures are reported but the resource is
    /// considered gone either way.
    async fn destroy(&self, resource: Self::Resource) -> Result<(), PgSteadyError>;
}
