//! # Command Line Interface
//!
//! Flags for the router binary. Every flag falls back to an `MTLS_ROUTER_*`
//! environment variable, so a `.env` file can carry a full deployment.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    parse_ca_cert_paths, AppConfig, DatabaseConfig, IdentityConfig, KeyDeliveryMode, ListenerConfig,
    ObservabilityConfig, TlsConfig,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "mtls-router")]
#[command(about = "Certificate-authenticated TCP router")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Address the TLS listener binds to
    #[arg(long, env = "MTLS_ROUTER_LISTEN_ADDR", default_value = "0.0.0.0:8443")]
    pub listen_addr: String,

    /// Comma-separated client CA bundles; list old and new CAs during rotation
    #[arg(long, env = "MTLS_ROUTER_CA_CERTS", default_value = "")]
    pub ca_certs: String,

    /// Server certificate (PEM)
    #[arg(long, env = "MTLS_ROUTER_SERVER_CERT", default_value = "")]
    pub server_cert: PathBuf,

    /// Server private key (PEM)
    #[arg(long, env = "MTLS_ROUTER_SERVER_KEY", default_value = "")]
    pub server_key: PathBuf,

    /// Intermediate certificates sent after the server certificate
    #[arg(long, env = "MTLS_ROUTER_SERVER_CHAIN")]
    pub server_chain: Option<PathBuf>,

    /// Authority expected in identity URIs and in the certificate issuer
    #[arg(long, env = "MTLS_ROUTER_ISSUER", default_value = "tinyscale.com")]
    pub issuer: String,

    /// URI scheme of identity SANs
    #[arg(long, env = "MTLS_ROUTER_IDENTITY_SCHEME", default_value = "spiffe")]
    pub identity_scheme: String,

    /// Where clients put the routing key: `stream` or `sni`
    #[arg(long, env = "MTLS_ROUTER_KEY_DELIVERY", default_value = "stream")]
    pub key_delivery: KeyDeliveryMode,

    /// Domain under which SNI names carry the routing key
    #[arg(long, env = "MTLS_ROUTER_ROUTING_DOMAIN")]
    pub routing_domain: Option<String>,

    #[arg(long, env = "MTLS_ROUTER_HANDSHAKE_TIMEOUT", default_value_t = 10)]
    pub handshake_timeout_seconds: u64,

    #[arg(long, env = "MTLS_ROUTER_KEY_READ_TIMEOUT", default_value_t = 10)]
    pub key_read_timeout_seconds: u64,

    #[arg(long, env = "MTLS_ROUTER_ROUTE_TIMEOUT", default_value_t = 30)]
    pub route_timeout_seconds: u64,

    #[arg(long, env = "MTLS_ROUTER_DIAL_TIMEOUT", default_value_t = 10)]
    pub dial_timeout_seconds: u64,

    /// How long shutdown waits for open connections
    #[arg(long, env = "MTLS_ROUTER_SHUTDOWN_GRACE", default_value_t = 30)]
    pub shutdown_grace_seconds: u64,

    #[arg(long, env = "MTLS_ROUTER_DB_HOST", default_value = "127.0.0.1")]
    pub db_host: String,

    #[arg(long, env = "MTLS_ROUTER_DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    #[arg(long, env = "MTLS_ROUTER_DB_USER", default_value = "tinyscale")]
    pub db_user: String,

    #[arg(long, env = "MTLS_ROUTER_DB_PASSWORD", default_value = "tinyscale", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, env = "MTLS_ROUTER_DB_NAME", default_value = "tinyscale-ssh")]
    pub db_name: String,

    #[arg(long, env = "MTLS_ROUTER_DB_CONNECT_TIMEOUT", default_value_t = 5)]
    pub db_connect_timeout_seconds: u64,

    #[arg(long, env = "MTLS_ROUTER_DB_MAX_OPEN_CONNS", default_value_t = 50)]
    pub db_max_open_connections: u32,

    #[arg(long, env = "MTLS_ROUTER_DB_MAX_IDLE_CONNS", default_value_t = 50)]
    pub db_max_idle_connections: u32,

    /// Maximum connection lifetime in seconds; 0 disables
    #[arg(long, env = "MTLS_ROUTER_DB_MAX_LIFETIME", default_value_t = 3600)]
    pub db_max_lifetime_seconds: u64,

    /// Maximum idle time in seconds; 0 disables
    #[arg(long, env = "MTLS_ROUTER_DB_MAX_IDLE_TIME", default_value_t = 1800)]
    pub db_max_idle_time_seconds: u64,

    /// Apply the bundled schema migrations on startup (development only)
    #[arg(long, env = "MTLS_ROUTER_DB_AUTO_MIGRATE")]
    pub db_auto_migrate: bool,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long, env = "MTLS_ROUTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "MTLS_ROUTER_JSON_LOGS")]
    pub json_logs: bool,

    /// Prometheus exporter port; 0 disables
    #[arg(long, env = "MTLS_ROUTER_METRICS_PORT", default_value_t = 0)]
    pub metrics_port: u16,
}

impl Cli {
    pub fn into_config(self) -> AppConfig {
        let defaults = ListenerConfig::default();

        AppConfig {
            listener: ListenerConfig {
                listen_addr: self.listen_addr,
                key_delivery: self.key_delivery,
                routing_domain: self.routing_domain.filter(|d| !d.trim().is_empty()),
                max_key_frame_bytes: defaults.max_key_frame_bytes,
                handshake_timeout_seconds: self.handshake_timeout_seconds,
                key_read_timeout_seconds: self.key_read_timeout_seconds,
                route_timeout_seconds: self.route_timeout_seconds,
                dial_timeout_seconds: self.dial_timeout_seconds,
                shutdown_grace_seconds: self.shutdown_grace_seconds,
            },
            tls: TlsConfig {
                ca_cert_paths: parse_ca_cert_paths(&self.ca_certs),
                server_cert_path: self.server_cert,
                server_key_path: self.server_key,
                chain_path: self.server_chain,
            },
            identity: IdentityConfig { issuer: self.issuer, scheme: self.identity_scheme },
            database: DatabaseConfig {
                host: self.db_host,
                port: self.db_port,
                user: self.db_user,
                password: self.db_password,
                name: self.db_name,
                connect_timeout_seconds: self.db_connect_timeout_seconds,
                max_open_connections: self.db_max_open_connections,
                max_idle_connections: self.db_max_idle_connections,
                max_lifetime_seconds: self.db_max_lifetime_seconds,
                max_idle_time_seconds: self.db_max_idle_time_seconds,
                auto_migrate: self.db_auto_migrate,
            },
            observability: ObservabilityConfig {
                log_level: self.log_level,
                json_logging: self.json_logs,
                metrics_port: self.metrics_port,
                ..ObservabilityConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let config = Cli::parse_from(["mtls-router"]).into_config();

        assert_eq!(config.listener, ListenerConfig::default());
        assert_eq!(config.database.host, "127.0.0.1");
        assert_eq!(config.database.name, "tinyscale-ssh");
        assert_eq!(config.database.max_idle_connections, 50);
        assert_eq!(config.identity.issuer, "tinyscale.com");
        assert!(config.tls.ca_cert_paths.is_empty());
    }

    #[test]
    fn ca_list_and_sni_flags() {
        let config = Cli::parse_from([
            "mtls-router",
            "--ca-certs",
            "/etc/ca/old.pem, ,/etc/ca/new.pem",
            "--key-delivery",
            "sni",
            "--routing-domain",
            "connect.example.com",
        ])
        .into_config();

        assert_eq!(
            config.tls.ca_cert_paths,
            vec![PathBuf::from("/etc/ca/old.pem"), PathBuf::from("/etc/ca/new.pem")]
        );
        assert_eq!(config.listener.key_delivery, KeyDeliveryMode::Sni);
        assert_eq!(config.listener.routing_domain.as_deref(), Some("connect.example.com"));
    }

    #[test]
    fn unknown_key_delivery_is_rejected() {
        assert!(Cli::try_parse_from(["mtls-router", "--key-delivery", "header"]).is_err());
    }
}
