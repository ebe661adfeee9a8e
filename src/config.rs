use std::time::Duration;

use crate::error::PgSteadyError;
use crate::probe::DEFAULT_PROBE_TIMEOUT;

/// Default checkout/connect timeout applied to pools when unset.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Default idle timeout applied to pooled connections when unset.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(60_000);
/// Default maximum lifetime applied to pooled connections when unset.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(600);

/// Where and how to reach the database. All five fields are required; use
/// [`ConnectionSettings::builder`] to get missing-field validation.
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectionSettings {
    #[must_use]
    pub fn builder() -> ConnectionSettingsBuilder {
        ConnectionSettingsBuilder::default()
    }

    pub(crate) fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password);
        config
    }
}

/// Fluent builder for [`ConnectionSettings`].
#[derive(Clone, Debug, Default)]
pub struct ConnectionSettingsBuilder {
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

impl ConnectionSettingsBuilder {
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Validate that every required field is present.
    ///
    /// # Errors
    /// Returns `PgSteadyError::ConfigError` naming the first missing field.
    pub fn build(self) -> Result<ConnectionSettings, PgSteadyError> {
        let host = required(self.host, "host")?;
        let port = self
            .port
            .ok_or_else(|| PgSteadyError::ConfigError("port is required".to_string()))?;
        let database = required(self.database, "database")?;
        let user = required(self.user, "user")?;
        let password = required(self.password, "password")?;
        Ok(ConnectionSettings {
            host,
            port,
            database,
            user,
            password,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, PgSteadyError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PgSteadyError::ConfigError(format!("{field} is required"))),
    }
}

/// Sizing and lifetime knobs for the pooled variant.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    pub connection: ConnectionSettings,
    /// Connections kept warm. Zero is allowed.
    pub min: u32,
    /// Upper bound on open connections. At least 2.
    pub max: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl PoolSettings {
    /// Validate pool bounds and apply the default timeouts.
    ///
    /// # Errors
    /// Returns `PgSteadyError::ConfigError` when `max < 2` or `min > max`.
    pub fn new(connection: ConnectionSettings, min: u32, max: u32) -> Result<Self, PgSteadyError> {
        if max < 2 {
            return Err(PgSteadyError::ConfigError(
                "pool max must be at least 2".to_string(),
            ));
        }
        if min > max {
            return Err(PgSteadyError::ConfigError(
                "pool min must not exceed max".to_string(),
            ));
        }
        Ok(Self {
            connection,
            min,
            max,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
        })
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }
}

/// Facade-level tuning shared by all client shapes.
#[derive(Clone, Copy, Debug)]
pub struct ClientOptions {
    /// Attempts allowed per request, floored at 1 by the executors.
    pub max_attempts: u32,
    /// Bound on the liveness probe.
    pub probe_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}
