//! # Structured Logging
//!
//! Subscriber setup and span macros for the router. `RUST_LOG` overrides the
//! configured level when set.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};

/// Create a tracing span for one client connection.
///
/// Identity and routing fields start empty and are recorded as the handler
/// learns them:
///
/// ```rust,ignore
/// let span = connection_span!(peer_addr);
/// span.record("user_id", identity.user_id.as_str());
/// ```
#[macro_export]
macro_rules! connection_span {
    ($peer:expr) => {
        tracing::info_span!(
            "connection",
            peer = %$peer,
            connection_id = %uuid::Uuid::new_v4(),
            user_id = tracing::field::Empty,
            org_id = tracing::field::Empty,
            connect_id = tracing::field::Empty,
            backend = tracing::field::Empty
        )
    };
    ($peer:expr, $($field:tt)*) => {
        tracing::info_span!(
            "connection",
            peer = %$peer,
            connection_id = %uuid::Uuid::new_v4(),
            user_id = tracing::field::Empty,
            org_id = tracing::field::Empty,
            connect_id = tracing::field::Empty,
            backend = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global subscriber, text or JSON.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        listen_addr = %config.listener.listen_addr,
        key_delivery = ?config.listener.key_delivery,
        routing_domain = ?config.listener.routing_domain,
        issuer = %config.identity.issuer,
        ca_bundles = config.tls.ca_cert_paths.len(),
        database = %config.database.display_target(),
        metrics_enabled = config.observability.metrics_port != 0,
        "mTLS router configuration"
    );
}
