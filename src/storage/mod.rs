//! # Storage and Persistence
//!
//! PostgreSQL connectivity and the read-only repositories the authorization
//! store queries.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use crate::config::DatabaseConfig;

pub use migrations::{get_migration_version, run_migrations};
pub use pool::{close_pool, connect_options, create_pool, get_pool_stats, ping, DbPool, PoolStats};
pub use repositories::{BackendHostRepository, SqlxBackendHostRepository};
