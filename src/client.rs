use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientOptions, ConnectionSettings, PoolSettings};
use crate::driver::{PoolFactory, PoolMetrics, SessionFactory};
use crate::error::PgSteadyError;
use crate::events::EventBus;
use crate::executor::{DEFAULT_SHUTDOWN_TIMEOUT, QueryExecutor, TxExecutor};
use crate::notify::{ChannelHooks, NotificationManager};
use crate::results::ResultSet;
use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::types::{QueryAndParams, RowValues};

/// Single-connection client: one supervised session shared by the query and
/// transaction executors.
pub struct Client {
    supervisor: Arc<Supervisor<SessionFactory>>,
    queries: QueryExecutor<SessionFactory>,
    transactions: TxExecutor<SessionFactory>,
}

impl Client {
    /// Connect with default options.
    ///
    /// # Errors
    /// Initial connect or probe failure is fatal and propagates.
    pub async fn connect(settings: ConnectionSettings) -> Result<Self, PgSteadyError> {
        Self::connect_with(settings, ClientOptions::default()).await
    }

    /// Connect with explicit retry/probe options.
    ///
    /// # Errors
    /// Initial connect or probe failure is fatal and propagates.
    pub async fn connect_with(
        settings: ConnectionSettings,
        options: ClientOptions,
    ) -> Result<Self, PgSteadyError> {
        let bus = Arc::new(EventBus::new());
        let supervisor = Supervisor::start(
            SessionFactory::new(settings),
            bus,
            SupervisorOptions {
                probe_timeout: options.probe_timeout,
            },
        )
        .await?;
        Ok(Self {
            queries: QueryExecutor::new(supervisor.clone(), options.max_attempts),
            transactions: TxExecutor::new(supervisor.clone(), options.max_attempts),
            supervisor,
        })
    }

    /// Run one statement with retry.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        self.queries.execute(sql, params).await
    }

    /// Run a batch as one transaction with retry.
    pub async fn transaction(
        &self,
        batch: &[QueryAndParams],
    ) -> Result<Vec<ResultSet>, PgSteadyError> {
        self.transactions.execute(batch).await
    }

    /// The lifecycle event bus for this client.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        self.supervisor.events()
    }

    /// Shut down with the default quiescence timeout.
    pub async fn shutdown(&self) -> Result<(), PgSteadyError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Quiesce both executors, then tear the supervisor down, aggregating
    /// any subordinate failures.
    ///
    /// # Errors
    /// `ShutdownAggregate` collecting every subordinate failure.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), PgSteadyError> {
        let mut failures = Vec::new();
        if let Err(error) = self.queries.shutdown(timeout).await {
            failures.push(error);
        }
        if let Err(error) = self.transactions.shutdown(timeout).await {
            failures.push(error);
        }
        if let Err(error) = self.supervisor.shutdown().await {
            failures.push(error);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PgSteadyError::ShutdownAggregate(failures))
        }
    }
}

/// Pooled client: a supervised connection pool shared by the query and
/// transaction executors.
pub struct Pool {
    supervisor: Arc<Supervisor<PoolFactory>>,
    queries: QueryExecutor<PoolFactory>,
    transactions: TxExecutor<PoolFactory>,
}

impl Pool {
    /// Build the pool with default options.
    ///
    /// # Errors
    /// Initial pool creation or probe failure is fatal and propagates.
    pub async fn connect(settings: PoolSettings) -> Result<Self, PgSteadyError> {
        Self::connect_with(settings, ClientOptions::default()).await
    }

    /// Build the pool with explicit retry/probe options.
    ///
    /// # Errors
    /// Initial pool creation or probe failure is fatal and propagates.
    pub async fn connect_with(
        settings: PoolSettings,
        options: ClientOptions,
    ) -> Result<Self, PgSteadyError> {
        let bus = Arc::new(EventBus::new());
        let supervisor = Supervisor::start(
            PoolFactory::new(settings),
            bus,
            SupervisorOptions {
                probe_timeout: options.probe_timeout,
            },
        )
        .await?;
        Ok(Self {
            queries: QueryExecutor::new(supervisor.clone(), options.max_attempts),
            transactions: TxExecutor::new(supervisor.clone(), options.max_attempts),
            supervisor,
        })
    }

    /// Run one statement with retry on a checked-out connection.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, PgSteadyError> {
        self.queries.execute(sql, params).await
    }

    /// Run a batch as one transaction with retry on a checked-out
    /// connection.
    pub async fn transaction(
        &self,
        batch: &[QueryAndParams],
    ) -> Result<Vec<ResultSet>, PgSteadyError> {
        self.transactions.execute(batch).await
    }

    /// Sample pool occupancy: `{total, idle, active, waiting}`.
    pub async fn metrics(&self) -> Result<PoolMetrics, PgSteadyError> {
        self.supervisor.metrics().await
    }

    /// The lifecycle event bus for this pool.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        self.supervisor.events()
    }

    /// Shut down with the default quiescence timeout.
    pub async fn shutdown(&self) -> Result<(), PgSteadyError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Quiesce both executors, then tear the supervisor down, aggregating
    /// any subordinate failures.
    ///
    /// # Errors
    /// `ShutdownAggregate` collecting every subordinate failure.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), PgSteadyError> {
        let mut failures = Vec::new();
        if let Err(error) = self.queries.shutdown(timeout).await {
            failures.push(error);
        }
        if let Err(error) = self.transactions.shutdown(timeout).await {
            failures.push(error);
        }
        if let Err(error) = self.supervisor.shutdown().await {
            failures.push(error);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(PgSteadyError::ShutdownAggregate(failures))
        }
    }
}

/// Notification client: a dedicated supervised session carrying a durable
/// `LISTEN` subscription set. Querying is delegated to a [`Client`]; this
/// shape is notifications only.
pub struct NotificationClient {
    supervisor: Arc<Supervisor<SessionFactory>>,
    notifications: Arc<NotificationManager<SessionFactory>>,
}

impl NotificationClient {
    /// Connect with default options.
    ///
    /// # Errors
    /// Initial connect or probe failure is fatal and propagates.
    pub async fn connect(settings: ConnectionSettings) -> Result<Self, PgSteadyError> {
        Self::connect_with(settings, ClientOptions::default()).await
    }

    /// Connect with explicit probe options.
    ///
    /// # Errors
    /// Initial connect or probe failure is fatal and propagates.
    pub async fn connect_with(
        settings: ConnectionSettings,
        options: ClientOptions,
    ) -> Result<Self, PgSteadyError> {
        let bus = Arc::new(EventBus::new());
        let supervisor = Supervisor::start(
            SessionFactory::new(settings),
            bus,
            SupervisorOptions {
                probe_timeout: options.probe_timeout,
            },
        )
        .await?;
        let notifications = NotificationManager::new(supervisor.clone());
        Ok(Self {
            supervisor,
            notifications,
        })
    }

    /// Subscribe to `channel`; the subscription survives reconnects.
    pub async fn listen(&self, channel: &str, hooks: ChannelHooks) -> Result<(), PgSteadyError> {
        self.notifications.listen(channel, hooks).await
    }

    /// Drop the subscription for `channel`.
    pub async fn unlisten(&self, channel: &str) -> Result<(), PgSteadyError> {
        self.notifications.unlisten(channel).await
    }

    /// Channels currently subscribed.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.notifications.subscriptions()
    }

    /// The lifecycle event bus for this client.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        self.supervisor.events()
    }

    /// Shut down the manager and its supervisor.
    pub async fn shutdown(&self) -> Result<(), PgSteadyError> {
        self.notifications.shutdown().await
    }
}
