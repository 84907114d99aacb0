//! Backend hosts, teams and route targets.

use std::collections::HashSet;

use super::id::{ConnectId, OrgId, TeamId, UserId};

/// A routable backend, provisioned externally and read-only to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHost {
    pub connect_id: ConnectId,
    /// `host:port` the router dials; may be empty for hosts not yet provisioned
    pub internal_addr: String,
    pub org_id: OrgId,
    /// Users granted access directly
    pub user_ids: HashSet<UserId>,
    /// Teams whose members are granted access
    pub team_ids: HashSet<TeamId>,
}

impl BackendHost {
    pub fn belongs_to(&self, org_id: &OrgId) -> bool {
        &self.org_id == org_id
    }

    pub fn grants_user(&self, user_id: &UserId) -> bool {
        self.user_ids.contains(user_id)
    }

    pub fn has_team_grants(&self) -> bool {
        !self.team_ids.is_empty()
    }
}

/// A team of users inside one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub team_id: TeamId,
    pub org_id: OrgId,
    pub user_ids: HashSet<UserId>,
}

impl Team {
    /// Whether this team grants `user_id` access on behalf of `org_id`.
    pub fn grants(&self, user_id: &UserId, org_id: &OrgId) -> bool {
        &self.org_id == org_id && self.user_ids.contains(user_id)
    }
}

/// Result of a successful authorization for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub backend_addr: String,
    pub connect_id: ConnectId,
}
