use std::time::Duration;

use thiserror::Error;

/// Failures while obtaining the routing key from a client connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was just a line terminator.
    #[error("empty routing key")]
    EmptyRoutingKey,

    /// No newline within the frame limit.
    #[error("routing key frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    /// The client closed its side before sending a full frame.
    #[error("connection closed before routing key was terminated ({received} bytes received)")]
    UnterminatedFrame { received: usize },

    /// The routing key was not received within the read deadline.
    #[error("timed out after {0:?} waiting for routing key")]
    ReadTimeout(Duration),

    /// The routing key contains bytes that are not allowed in a connect id.
    #[error("invalid routing key: {0}")]
    InvalidRoutingKey(String),

    /// SNI key delivery is configured but the client sent no server name.
    #[error("client did not send a TLS server name")]
    MissingServerName,

    /// The server name is not `<connect-id>.<routing-domain>`.
    #[error("server name '{server_name}' is not under routing domain '{routing_domain}'")]
    ServerNameMismatch { server_name: String, routing_domain: String },

    #[error("I/O error reading routing key: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::EmptyRoutingKey => "empty_routing_key",
            ProtocolError::FrameTooLarge { .. } => "frame_too_large",
            ProtocolError::UnterminatedFrame { .. } => "unterminated_frame",
            ProtocolError::ReadTimeout(_) => "read_timeout",
            ProtocolError::InvalidRoutingKey(_) => "invalid_routing_key",
            ProtocolError::MissingServerName => "missing_server_name",
            ProtocolError::ServerNameMismatch { .. } => "server_name_mismatch",
            ProtocolError::Io(_) => "io",
        }
    }
}
