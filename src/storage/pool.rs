//! # Database Connection Pool Management
//!
//! Provides the PostgreSQL connection pool used by the authorization store.

use crate::config::DatabaseConfig;
use crate::errors::{Error, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Pool, Postgres};

/// Type alias for the database connection pool
pub type DbPool = Pool<Postgres>;

/// Connection options for the configured database
pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .application_name("mtls-router")
}

/// Create a database connection pool and verify it with a ping
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_open_connections)
        .min_connections(config.min_connections())
        .acquire_timeout(config.connect_timeout())
        .max_lifetime(config.max_lifetime())
        .idle_timeout(config.max_idle_time())
        .connect_with(connect_options(config))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, database = %config.display_target(), "Failed to create database pool");
            Error::database(e, format!("Failed to connect to database: {}", config.display_target()))
        })?;

    ping(&pool).await?;

    tracing::info!(
        database = %config.display_target(),
        max_connections = config.max_open_connections,
        min_connections = config.min_connections(),
        connect_timeout_ms = config.connect_timeout().as_millis(),
        max_lifetime_ms = config.max_lifetime().map(|d| d.as_millis()),
        idle_timeout_ms = config.max_idle_time().map(|d| d.as_millis()),
        "Database connection pool created"
    );

    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Check database connectivity
pub async fn ping(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| Error::database(e, "Database connectivity check failed"))?;
    Ok(())
}

/// Close the pool, waiting for checked-out connections to be returned
pub async fn close_pool(pool: &PgPool) {
    let stats = get_pool_stats(pool);
    pool.close().await;
    tracing::info!(size = stats.size, idle = stats.idle, "Database connection pool closed");
}

/// Get pool statistics for monitoring
pub fn get_pool_stats(pool: &PgPool) -> PoolStats {
    PoolStats { size: pool.size(), idle: pool.num_idle() }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Total connections in the pool
    pub size: u32,
    /// Number of idle connections
    pub idle: usize,
}

impl PoolStats {
    /// Get the number of active connections
    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle as u32)
    }
}
