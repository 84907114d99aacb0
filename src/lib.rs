//! # mtls-router
//!
//! A TCP router that authenticates clients by X.509 certificate and forwards
//! each connection to the backend host named by its routing key, if the
//! client's organization, user or team grants it access.
//!
//! ## Architecture
//!
//! ```text
//! client --TLS(mTLS)--> ProxyServer --> ConnectionHandler
//!                                          |-- Authenticator (chain + SAN identity)
//!                                          |-- KeyDelivery   (stream line or SNI)
//!                                          |-- Router        (PostgreSQL grants)
//!                                          '-- splice        (backend TCP)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mtls_router::{config::AppConfig, proxy::ProxyServer, routing::AuthorizationStore, Result};
//! use mtls_router::storage::{create_pool, SqlxBackendHostRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::default();
//!     let pool = create_pool(&config.database).await?;
//!     let store = AuthorizationStore::new(Arc::new(SqlxBackendHostRepository::new(pool)));
//!     let server = ProxyServer::from_config(&config, Arc::new(store)).await?;
//!     server.run().await
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod storage;
pub mod utils;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
