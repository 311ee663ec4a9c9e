//! Database connection pool management.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use newnerd_core::{defaults, Error, Result};

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection acquire timeout.
    pub connect_timeout: Duration,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::POOL_MAX_CONNECTIONS,
            min_connections: defaults::POOL_MIN_CONNECTIONS,
            connect_timeout: Duration::from_secs(defaults::POOL_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::POOL_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(defaults::POOL_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overrides read through `lookup`:
    ///
    /// - `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS` (clamped to the max)
    /// - `DATABASE_ACQUIRE_TIMEOUT_SECS`, `DATABASE_IDLE_TIMEOUT_SECS`
    /// - `DATABASE_MAX_LIFETIME_SECS` (`0` keeps connections for the pool's lifetime)
    ///
    /// Unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| -> Option<u64> { lookup(key)?.trim().parse().ok() };
        let mut config = Self::default();

        if let Some(n) = read("DATABASE_MAX_CONNECTIONS").and_then(|n| u32::try_from(n).ok()) {
            config.max_connections = n.max(1);
        }
        if let Some(n) = read("DATABASE_MIN_CONNECTIONS").and_then(|n| u32::try_from(n).ok()) {
            config.min_connections = n;
        }
        config.min_connections = config.min_connections.min(config.max_connections);

        if let Some(secs) = read("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read("DATABASE_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read("DATABASE_MAX_LIFETIME_SECS") {
            config.max_lifetime = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config
    }
}

/// Create a new PostgreSQL connection pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Create a new PostgreSQL connection pool with custom configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Creating database connection pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout);

    if let Some(max_lifetime) = config.max_lifetime {
        options = options.max_lifetime(max_lifetime);
    }

    let pool = options
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Log current pool health. Warns when no idle connections remain.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections, potential exhaustion"
        );
    }
}
