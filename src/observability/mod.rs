//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the router.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging, then metrics when a port is configured
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;

    let metrics_enabled = init_metrics(config)?;

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled,
        "Observability initialized"
    );

    Ok(())
}
