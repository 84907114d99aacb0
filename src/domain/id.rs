//! Domain ID Types with NewType Pattern
//!
//! Type-safe wrappers for the identifiers that flow through an authorization
//! decision, so a user id can never be passed where an org id is expected.
//! Values are opaque strings owned by the external provisioning system.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ProtocolError;

/// Macro to generate NewType ID wrappers with all required traits
macro_rules! domain_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an ID from an existing string (for database retrieval)
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Get the inner string value
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert to inner string value
            pub fn into_string(self) -> String {
                self.0
            }

            /// Whether the identifier is the empty string
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

domain_id!(
    /// Identifier of a user, taken from the certificate identity URI
    UserId
);

domain_id!(
    /// Identifier of an organization (tenant boundary)
    OrgId
);

domain_id!(
    /// Identifier of a team whose members share host grants
    TeamId
);

domain_id!(
    /// Routing key naming the backend host a client wants to reach
    ConnectId
);

impl ConnectId {
    /// Parse a routing key received from a client.
    ///
    /// Rejects the empty string and any NUL, CR or LF byte.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.is_empty() {
            return Err(ProtocolError::EmptyRoutingKey);
        }
        if let Some(c) = raw.chars().find(|c| matches!(c, '\0' | '\r' | '\n')) {
            return Err(ProtocolError::InvalidRoutingKey(format!(
                "connect id contains forbidden character {:?}",
                c
            )));
        }
        Ok(Self(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_display() {
        let id = UserId::from("user-456");
        assert_eq!(format!("{}", id), "user-456");
        assert_eq!(id.as_str(), "user-456");
    }

    #[test]
    fn ids_are_distinct_types_with_equal_strings() {
        let org = OrgId::from("shared");
        let team = TeamId::from("shared");
        assert_eq!(org.as_str(), team.as_str());
    }

    #[test]
    fn connect_id_parse_accepts_plain_key() {
        let id = ConnectId::parse("test-host-01").unwrap();
        assert_eq!(id.as_str(), "test-host-01");
    }

    #[test]
    fn connect_id_parse_rejects_empty() {
        assert!(matches!(ConnectId::parse(""), Err(ProtocolError::EmptyRoutingKey)));
    }

    #[test]
    fn connect_id_parse_rejects_control_bytes() {
        assert!(matches!(
            ConnectId::parse("host\0one"),
            Err(ProtocolError::InvalidRoutingKey(_))
        ));
        assert!(matches!(
            ConnectId::parse("host\r\nsecond"),
            Err(ProtocolError::InvalidRoutingKey(_))
        ));
    }

    #[test]
    fn id_round_trips_through_string() {
        let id = OrgId::from("org-123");
        assert_eq!(String::from(id.clone()), "org-123");
        assert_eq!(OrgId::from_string("org-123".to_string()), id);
    }
}
