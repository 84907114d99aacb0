//! # Database Migration Management
//!
//! The router never writes to the authorization tables in production; the
//! schema is provisioned elsewhere. These embedded migrations create the same
//! tables for development databases and integration tests.

use crate::errors::{Error, Result};
use crate::storage::DbPool;
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    info!(available = MIGRATOR.iter().count(), "Starting database migration process");

    MIGRATOR.run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Migration failed");
        Error::internal(format!("Database migration failed: {}", e))
    })?;

    info!(version = get_migration_version(pool).await?, "Database migrations completed");
    Ok(())
}

/// Get the current migration version (highest applied, 0 if none)
pub async fn get_migration_version(pool: &DbPool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(version) FROM _sqlx_migrations WHERE success = TRUE",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| Error::database(e, "Failed to read applied migrations"))?;

    Ok(version.unwrap_or(0))
}
