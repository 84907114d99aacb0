//! In-memory `BackendHostRepository` for proxy tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use mtls_router::domain::{BackendHost, ConnectId, OrgId, Team, TeamId, UserId};
use mtls_router::errors::Result;
use mtls_router::routing::AuthorizationStore;
use mtls_router::storage::BackendHostRepository;

#[derive(Default)]
pub struct MemoryStore {
    hosts: RwLock<HashMap<ConnectId, BackendHost>>,
    teams: RwLock<Vec<Team>>,
    /// Artificial latency on every lookup
    delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn add_host(&self, connect_id: &str, addr: &str, org: &str, users: &[&str], teams: &[&str]) {
        let host = BackendHost {
            connect_id: ConnectId::from(connect_id),
            internal_addr: addr.to_string(),
            org_id: OrgId::from(org),
            user_ids: users.iter().map(|u| UserId::from(*u)).collect(),
            team_ids: teams.iter().map(|t| TeamId::from(*t)).collect(),
        };
        self.hosts.write().unwrap().insert(host.connect_id.clone(), host);
    }

    pub fn add_team(&self, team_id: &str, org: &str, users: &[&str]) {
        self.teams.write().unwrap().push(Team {
            team_id: TeamId::from(team_id),
            org_id: OrgId::from(org),
            user_ids: users.iter().map(|u| UserId::from(*u)).collect(),
        });
    }

    pub fn into_router(self) -> Arc<AuthorizationStore> {
        Arc::new(AuthorizationStore::new(Arc::new(self)))
    }
}

#[async_trait]
impl BackendHostRepository for MemoryStore {
    async fn get_backend_host(&self, connect_id: &ConnectId) -> Result<Option<BackendHost>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.hosts.read().unwrap().get(connect_id).cloned())
    }

    async fn is_member_of_any_team(
        &self,
        user_id: &UserId,
        org_id: &OrgId,
        team_ids: &[TeamId],
    ) -> Result<bool> {
        Ok(self
            .teams
            .read()
            .unwrap()
            .iter()
            .filter(|team| team_ids.contains(&team.team_id))
            .any(|team| team.grants(user_id, org_id)))
    }
}
