//! # Configuration Management
//!
//! Router configuration. Values come from command-line flags or their
//! `MTLS_ROUTER_*` environment variables (see [`crate::cli`]) and are
//! validated once at startup; nothing here is reloaded at runtime.

pub mod settings;
pub mod tls;

pub use settings::{
    AppConfig, DatabaseConfig, IdentityConfig, KeyDeliveryMode, ListenerConfig,
    ObservabilityConfig,
};
pub use tls::{parse_ca_cert_paths, TlsConfig};
