use std::future::{Future, poll_fn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bb8::{ManageConnection, Pool, PooledConnection};
use tokio::sync::mpsc;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

use super::{DriverEvent, ResourceFactory};
use crate::config::PoolSettings;
use crate::error::PgSteadyError;
use crate::probe::PROBE_STATEMENT;

/// bb8 manager for supervised Postgres clients. Each client's connection task
/// forwards driver faults to the supervisor; clean per-client closes are
/// routine pool recycling and are not reported.
pub struct PgPoolManager {
    config: tokio_postgres::Config,
    events: mpsc::UnboundedSender<DriverEvent>,
}

impl PgPoolManager {
    #[must_use]
    pub fn new(
        config: tokio_postgres::Config,
        events: mpsc::UnboundedSender<DriverEvent>,
    ) -> Self {
        Self { config, events }
    }
}

impl ManageConnection for PgPoolManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let config = self.config.clone();
        let events = self.events.clone();
        async move {
            let (client, mut connection) = config.connect(NoTls).await?;
            tokio::spawn(async move {
                loop {
                    match poll_fn(|cx| connection.poll_message(cx)).await {
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            let _ = events.send(DriverEvent::Error(error.to_string()));
                            break;
                        }
                        None => break,
                    }
                }
            });
            Ok(client)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query(PROBE_STATEMENT).await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

/// Point-in-time pool occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolMetrics {
    pub total: u32,
    pub idle: u32,
    pub active: u32,
    pub waiting: usize,
}

/// Factory for the pooled shape: `create` builds the pool, `acquire` performs
/// a checkout. Checked-out handles return to the pool on drop.
pub struct PoolFactory {
    settings: PoolSettings,
    waiting: Arc<AtomicUsize>,
}

impl PoolFactory {
    #[must_use]
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sample occupancy from the pool plus the checkout-wait gauge.
    #[must_use]
    pub fn metrics(&self, pool: &Pool<PgPoolManager>) -> PoolMetrics {
        let state = pool.state();
        PoolMetrics {
            total: state.connections,
            idle: state.idle_connections,
            active: state.connections - state.idle_connections,
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl ResourceFactory for PoolFactory {
    type Resource = Pool<PgPoolManager>;
    type Handle = PooledConnection<'static, PgPoolManager>;

    async fn create(
        &self,
        events: mpsc::UnboundedSender<DriverEvent>,
    ) -> Result<Pool<PgPoolManager>, PgSteadyError> {
        let mut config = self.settings.connection.pg_config();
        config.connect_timeout(self.settings.connect_timeout);
        let manager = PgPoolManager::new(config, events);

        Pool::builder()
            .max_size(self.settings.max)
            .min_idle(Some(self.settings.min))
            .connection_timeout(self.settings.connect_timeout)
            .idle_timeout(Some(self.settings.idle_timeout))
            .max_lifetime(Some(self.settings.max_lifetime))
            .build(manager)
            .await
            .map_err(|e| {
                PgSteadyError::ConnectionError(format!("failed to create Postgres pool: {e}"))
            })
    }

    async fn acquire(
        &self,
        resource: &Pool<PgPoolManager>,
    ) -> Result<PooledConnection<'static, PgPoolManager>, PgSteadyError> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let checkout = resource.get_owned().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        checkout.map_err(PgSteadyError::PoolError)
    }

    async fn destroy(&self, resource: Pool<PgPoolManager>) -> Result<(), PgSteadyError> {
        // bb8 closes idle connections when the pool is dropped; outstanding
        // checkouts close as they are returned.
        debug!("destroying connection pool");
        drop(resource);
        Ok(())
    }
}
