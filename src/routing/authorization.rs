//! Organization and team scoped authorization.
//!
//! A user may reach a backend host only when the host belongs to the user's
//! organization and the user is granted either directly or through a team
//! of the same organization. Nothing is cached between calls.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::{BackendHost, ConnectId, OrgId, RouteTarget, TeamId, UserId};
use crate::errors::RouteError;
use crate::storage::BackendHostRepository;

/// Answers authorization questions against the backend host repository.
#[derive(Clone)]
pub struct AuthorizationStore {
    repository: Arc<dyn BackendHostRepository>,
}

impl std::fmt::Debug for AuthorizationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationStore").finish_non_exhaustive()
    }
}

impl AuthorizationStore {
    pub fn new(repository: Arc<dyn BackendHostRepository>) -> Self {
        Self { repository }
    }

    /// Look up a backend host by routing key.
    pub async fn get_backend_host(&self, connect_id: &ConnectId) -> Result<BackendHost, RouteError> {
        self.repository
            .get_backend_host(connect_id)
            .await
            .map_err(RouteError::Storage)?
            .ok_or_else(|| RouteError::HostNotFound { connect_id: connect_id.clone() })
    }

    /// Whether `user_id` of `org_id` may reach `connect_id`.
    ///
    /// A missing host is an error; an org mismatch is a plain `false`.
    #[instrument(skip_all, fields(user_id = %user_id, org_id = %org_id, connect_id = %connect_id))]
    pub async fn is_authorized(
        &self,
        user_id: &UserId,
        org_id: &OrgId,
        connect_id: &ConnectId,
    ) -> Result<bool, RouteError> {
        let host = self.get_backend_host(connect_id).await?;

        if !host.belongs_to(org_id) {
            info!(host_org = %host.org_id, "denied: host belongs to another organization");
            return Ok(false);
        }

        if host.grants_user(user_id) {
            debug!("authorized by direct grant");
            return Ok(true);
        }

        if !host.has_team_grants() {
            debug!("denied: no direct grant and no team grants");
            return Ok(false);
        }

        let team_ids: Vec<TeamId> = host.team_ids.iter().cloned().collect();
        let member = self
            .repository
            .is_member_of_any_team(user_id, org_id, &team_ids)
            .await
            .map_err(RouteError::Storage)?;

        debug!(teams = team_ids.len(), member, "team grant checked");
        Ok(member)
    }

    /// Authorize, then resolve the backend address.
    ///
    /// The host is read again after the decision, so an address change made
    /// in between is picked up.
    pub async fn route(
        &self,
        user_id: &UserId,
        org_id: &OrgId,
        connect_id: &ConnectId,
    ) -> Result<RouteTarget, RouteError> {
        if !self.is_authorized(user_id, org_id, connect_id).await? {
            return Err(RouteError::NotAuthorized {
                user_id: user_id.clone(),
                connect_id: connect_id.clone(),
            });
        }

        let host = self.get_backend_host(connect_id).await?;

        if host.internal_addr.trim().is_empty() {
            return Err(RouteError::RoutingUnavailable { connect_id: connect_id.clone() });
        }

        Ok(RouteTarget { backend_addr: host.internal_addr, connect_id: host.connect_id })
    }
}
