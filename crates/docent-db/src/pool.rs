//! Connection pool tuning for the persistence layer.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use docent_core::{Error, Result};

/// PostgreSQL pool tuning.
///
/// The defaults suit a single engine host against a lightly loaded
/// upload-cache table. Override them through the builder methods or the
/// `DOCENT_DB_*` environment variables.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long `acquire` waits for a free connection.
    pub connect_timeout: Duration,
    /// Idle connections are reaped after this long.
    pub idle_timeout: Duration,
    /// Connections are recycled after this long regardless of use.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read pool tuning from the environment.
    ///
    /// `DOCENT_DB_MAX_CONNECTIONS`, `DOCENT_DB_MIN_CONNECTIONS`,
    /// `DOCENT_DB_CONNECT_TIMEOUT_SECS`, and `DOCENT_DB_IDLE_TIMEOUT_SECS`
    /// override the defaults when set to parseable values.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            max_connections: var("DOCENT_DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: var("DOCENT_DB_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout: Duration::from_secs(var(
                "DOCENT_DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
            idle_timeout: Duration::from_secs(var(
                "DOCENT_DB_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
            max_lifetime: defaults.max_lifetime,
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Open a pool against `database_url` with this tuning.
    pub async fn connect(&self, database_url: &str) -> Result<PgPool> {
        let started = Instant::now();

        let mut options = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout);
        if let Some(lifetime) = self.max_lifetime {
            options = options.max_lifetime(lifetime);
        }

        let pool = options
            .connect(database_url)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "pool",
            op = "connect",
            max_connections = self.max_connections,
            pool_size = pool.size(),
            pool_idle = pool.num_idle(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Connection pool ready"
        );
        Ok(pool)
    }
}
