//! # Error Handling
//!
//! Error types for the router. The crate-wide [`Error`] covers startup and
//! infrastructure failures; the per-stage enums below describe why a single
//! connection was refused and are never fatal to the process.

pub mod identity;
pub mod protocol;
pub mod routing;
pub mod tls;

pub use identity::IdentityError;
pub use protocol::ProtocolError;
pub use routing::RouteError;
pub use tls::TlsError;

/// Custom result type for router operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the router
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate and key material errors
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Database and storage errors
    #[error("Database error: {context}: {source}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener and socket errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Wrap a database error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
