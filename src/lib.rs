/*!
 * pg-steady - a resilient access layer over PostgreSQL
 *
 * This crate turns a flaky, lifecycle-sensitive database connection (or pool
 * of connections) into a steady, gated, retry-aware request surface.
 * Application code calls `execute`/`transaction`/`listen` and never worries
 * about reconnects, transient faults, or in-flight shutdowns.
 *
 * # Features
 *
 * - Readiness gate that parks requests during outages instead of failing them
 * - Connection supervisor with verify-then-reconnect and jittered backoff
 * - Retrying executors for single statements and whole transactions,
 *   classifying PostgreSQL SQLSTATEs and OS network codes as transient
 * - Durable LISTEN subscriptions that re-subscribe across reconnects
 * - Graceful, idempotent shutdown that drains in-flight work
 *
 * # Example
 *
 * ```rust,no_run
 * use pg_steady::prelude::*;
 *
 * async fn pool_example() -> Result<(), PgSteadyError> {
 *     let settings = ConnectionSettings::builder()
 *         .host("localhost")
 *         .port(5432)
 *         .database("mydatabase")
 *         .user("user")
 *         .password("password")
 *         .build()?;
 *
 *     let pool = Pool::connect(PoolSettings::new(settings, 0, 4)?).await?;
 *
 *     let rows = pool
 *         .execute("SELECT * FROM users WHERE id = $1", &[RowValues::Int(1)])
 *         .await?;
 *     for row in rows.results {
 *         println!("user: {:?}", row.get("name"));
 *     }
 *
 *     pool.shutdown().await?;
 *     Ok(())
 * }
 *
 * async fn listen_example() -> Result<(), PgSteadyError> {
 *     let settings = ConnectionSettings::builder()
 *         .host("localhost")
 *         .port(5432)
 *         .database("mydatabase")
 *         .user("user")
 *         .password("password")
 *         .build()?;
 *
 *     let client = NotificationClient::connect(settings).await?;
 *     client
 *         .listen(
 *             "orders",
 *             ChannelHooks::new(|payload| {
 *                 println!("order event: {payload}");
 *                 Ok(())
 *             }),
 *         )
 *         .await?;
 *     Ok(())
 * }
 * ```
 */

#![forbid(unsafe_code)]

// Re-export everything that should be part of the public API
pub mod prelude {
    //! Convenient imports for common functionality.

    pub use crate::client::{Client, NotificationClient, Pool};
    pub use crate::config::{ClientOptions, ConnectionSettings, PoolSettings};
    pub use crate::error::PgSteadyError;
    pub use crate::notify::ChannelHooks;
    pub use crate::results::{DbRow, ResultSet};
    pub use crate::types::{QueryAndParams, RowValues};
}

// Core modules
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod gate;
pub mod notify;
pub mod probe;
pub mod results;
pub mod retry;
pub mod supervisor;
pub mod types;

// Direct exports of frequently used types
pub use client::{Client, NotificationClient, Pool};
pub use config::{ClientOptions, ConnectionSettings, PoolSettings};
pub use driver::{DriverEvent, PoolMetrics, QueryHandle, ResourceFactory};
pub use error::PgSteadyError;
pub use events::{EventBus, EventKind, LifecycleEvent};
pub use executor::{QueryExecutor, TxExecutor};
pub use gate::{CloseReason, Gate};
pub use notify::{ChannelHooks, NotificationManager};
pub use probe::ConnectionProbe;
pub use results::{DbRow, ResultSet};
pub use retry::{is_retriable, is_retriable_code};
pub use supervisor::{Supervisor, SupervisorOptions, SupervisorState};
pub use types::{QueryAndParams, RowValues};
