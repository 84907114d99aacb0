use std::fmt;

use super::id::{OrgId, UserId};

/// Identity carried by a validated client certificate.
///
/// Rebuilt for every connection from the certificate's SAN URI; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub org_id: OrgId,
    /// Trust domain the identity was issued under
    pub issuer: String,
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/orgs/{}/users/{}", self.issuer, self.org_id, self.user_id)
    }
}
