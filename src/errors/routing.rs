use std::time::Duration;

use thiserror::Error;

use crate::domain::{ConnectId, UserId};

/// Why a routing key could not be turned into a backend address.
///
/// `Display` is the operator-facing text and may reveal whether a host exists.
/// [`RouteError::client_message`] is what goes on the wire.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no backend host found for connect_id '{connect_id}'")]
    HostNotFound { connect_id: ConnectId },

    #[error("user '{user_id}' is not authorized to access host '{connect_id}'")]
    NotAuthorized { user_id: UserId, connect_id: ConnectId },

    #[error("backend host '{connect_id}' has no internal address")]
    RoutingUnavailable { connect_id: ConnectId },

    #[error("authorization check failed: {0}")]
    Storage(#[source] crate::errors::Error),

    #[error("authorization timed out after {0:?}")]
    Timeout(Duration),

    #[error("authorization cancelled by server shutdown")]
    Cancelled,
}

impl RouteError {
    /// Message written to the client after `ERROR: `.
    ///
    /// Missing hosts and denied users share one message so a caller cannot
    /// probe which connect ids exist.
    pub fn client_message(&self) -> String {
        match self {
            RouteError::HostNotFound { connect_id }
            | RouteError::NotAuthorized { connect_id, .. } => {
                format!("not authorized to access host '{}'", connect_id)
            }
            RouteError::RoutingUnavailable { connect_id } => {
                format!("host '{}' is not reachable", connect_id)
            }
            RouteError::Storage(source) => format!("authorization check failed: {}", source),
            RouteError::Timeout(_) => "authorization timed out".to_string(),
            RouteError::Cancelled => "server is shutting down".to_string(),
        }
    }

    /// Whether this is a policy denial rather than an infrastructure failure.
    pub fn is_denial(&self) -> bool {
        matches!(self, RouteError::HostNotFound { .. } | RouteError::NotAuthorized { .. })
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RouteError::HostNotFound { .. } => "host_not_found",
            RouteError::NotAuthorized { .. } => "not_authorized",
            RouteError::RoutingUnavailable { .. } => "routing_unavailable",
            RouteError::Storage(_) => "storage",
            RouteError::Timeout(_) => "timeout",
            RouteError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denials_share_client_message() {
        let missing = RouteError::HostNotFound { connect_id: ConnectId::from("host-1") };
        let denied = RouteError::NotAuthorized {
            user_id: UserId::from("user-9"),
            connect_id: ConnectId::from("host-1"),
        };

        assert_eq!(missing.client_message(), denied.client_message());
        assert_ne!(missing.to_string(), denied.to_string());
        assert!(missing.is_denial() && denied.is_denial());
    }

    #[test]
    fn test_infrastructure_errors_carry_cause() {
        let error = RouteError::Storage(crate::errors::Error::internal("pool closed"));
        assert!(error.client_message().contains("pool closed"));
        assert!(!error.is_denial());
        assert_eq!(RouteError::Cancelled.kind(), "cancelled");
    }
}
