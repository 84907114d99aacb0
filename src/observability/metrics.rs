//! # Metrics Collection
//!
//! Prometheus metrics for the router. Recording is a no-op until
//! [`init_metrics`] installs the exporter, so components record
//! unconditionally.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::info;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks router metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// A TLS connection finished its handshake and was handed to a handler
    pub fn record_connection_opened(&self) {
        counter!("router_connections_accepted_total").increment(1);
        gauge!("router_connections_active").increment(1.0);
    }

    /// A handler returned; `outcome` is `proxied` or the failing stage's error kind
    pub fn record_connection_closed(&self, outcome: &str, duration: f64) {
        gauge!("router_connections_active").decrement(1.0);
        let labels = [("outcome", outcome.to_string())];
        counter!("router_connections_closed_total", &labels).increment(1);
        histogram!("router_connection_duration_seconds").record(duration);
    }

    /// TLS handshake failure or timeout before a handler ran
    pub fn record_handshake_failure(&self, reason: &str) {
        let labels = [("reason", reason.to_string())];
        counter!("router_handshake_failures_total", &labels).increment(1);
    }

    /// Record an authorization decision
    pub fn record_route_decision(&self, decision: &str, duration: f64) {
        let labels = [("decision", decision.to_string())];
        counter!("router_route_decisions_total", &labels).increment(1);
        histogram!("router_route_duration_seconds").record(duration);
    }

    /// Bytes copied in one direction of a splice
    pub fn record_bytes_spliced(&self, direction: &str, bytes: u64) {
        let labels = [("direction", direction.to_string())];
        counter!("router_spliced_bytes_total", &labels).increment(bytes);
    }

    /// Record database activity with execution timing
    pub fn record_db_query(&self, operation: &str, duration: f64, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("operation", operation.to_string()), ("status", status.to_string())];
        counter!("db_queries_total", &labels).increment(1);

        let duration_labels = [("operation", operation.to_string())];
        histogram!("db_query_duration_seconds", &duration_labels).record(duration);
    }

    /// Update database connection gauge
    pub fn update_db_connections(&self, active: u32) {
        gauge!("db_connections_active").set(active as f64);
    }

    /// Describe router metrics and zero the counters so they appear on first scrape
    pub fn register_router_metrics(&self) {
        describe_counter!(
            "router_connections_accepted_total",
            Unit::Count,
            "Connections that completed the TLS handshake"
        );
        describe_gauge!("router_connections_active", Unit::Count, "Connections being handled");
        describe_counter!(
            "router_connections_closed_total",
            Unit::Count,
            "Connections closed, by outcome"
        );
        describe_histogram!(
            "router_connection_duration_seconds",
            Unit::Seconds,
            "Time from handshake completion to close"
        );
        describe_counter!(
            "router_handshake_failures_total",
            Unit::Count,
            "TLS handshakes that failed or timed out"
        );
        describe_counter!(
            "router_route_decisions_total",
            Unit::Count,
            "Authorization decisions, by result"
        );
        describe_histogram!(
            "router_route_duration_seconds",
            Unit::Seconds,
            "Time spent resolving a routing key"
        );
        describe_counter!("router_spliced_bytes_total", Unit::Bytes, "Bytes proxied, by direction");
        describe_counter!("db_queries_total", Unit::Count, "Authorization queries, by status");
        describe_histogram!("db_query_duration_seconds", Unit::Seconds, "Authorization query latency");

        counter!("router_connections_accepted_total").absolute(0);
        gauge!("router_connections_active").set(0.0);
    }
}

/// Install the Prometheus exporter when a metrics port is configured.
///
/// Returns whether the exporter was installed.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<bool> {
    let Some(metrics_addr) = config.metrics_bind_address() else {
        return Ok(false);
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_router_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(true)
}
