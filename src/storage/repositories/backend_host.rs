//! Backend host repository
//!
//! Read-only access to the `backend_hosts` and `teams` tables. Rows are
//! provisioned by an external system; the router never writes them.

use crate::domain::{BackendHost, ConnectId, OrgId, TeamId, UserId};
use crate::errors::{Error, Result};
use crate::observability::MetricsRecorder;
use crate::storage::{get_pool_stats, DbPool};
use async_trait::async_trait;
use sqlx::FromRow;
use std::time::Instant;
use tracing::instrument;

// Database row structure

#[derive(Debug, Clone, FromRow)]
struct BackendHostRow {
    pub connect_id: String,
    pub internal_ip_addr: Option<String>,
    pub org_id: String,
    pub user_ids: Option<Vec<String>>,
    pub team_ids: Option<Vec<String>>,
}

impl From<BackendHostRow> for BackendHost {
    fn from(row: BackendHostRow) -> Self {
        BackendHost {
            connect_id: ConnectId::from_string(row.connect_id),
            internal_addr: row.internal_ip_addr.unwrap_or_default(),
            org_id: OrgId::from_string(row.org_id),
            user_ids: row.user_ids.unwrap_or_default().into_iter().map(UserId::from).collect(),
            team_ids: row.team_ids.unwrap_or_default().into_iter().map(TeamId::from).collect(),
        }
    }
}

// Repository trait

#[async_trait]
pub trait BackendHostRepository: Send + Sync {
    /// Point lookup by routing key
    async fn get_backend_host(&self, connect_id: &ConnectId) -> Result<Option<BackendHost>>;

    /// Whether any of `team_ids` belongs to `org_id` and lists `user_id` as a member
    async fn is_member_of_any_team(
        &self,
        user_id: &UserId,
        org_id: &OrgId,
        team_ids: &[TeamId],
    ) -> Result<bool>;
}

// SQLx implementation

#[derive(Debug, Clone)]
pub struct SqlxBackendHostRepository {
    pool: DbPool,
    metrics: MetricsRecorder,
}

impl SqlxBackendHostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, metrics: MetricsRecorder::new() }
    }

    fn record_query(&self, operation: &str, started: Instant, success: bool) {
        self.metrics.record_db_query(operation, started.elapsed().as_secs_f64(), success);
        self.metrics.update_db_connections(get_pool_stats(&self.pool).active());
    }
}

#[async_trait]
impl BackendHostRepository for SqlxBackendHostRepository {
    #[instrument(skip_all, fields(connect_id = %connect_id), name = "db_get_backend_host")]
    async fn get_backend_host(&self, connect_id: &ConnectId) -> Result<Option<BackendHost>> {
        let started = Instant::now();

        let result = sqlx::query_as::<_, BackendHostRow>(
            "SELECT connect_id, internal_ip_addr, org_id, user_ids, team_ids
             FROM backend_hosts
             WHERE connect_id = $1",
        )
        .bind(connect_id.as_str())
        .fetch_optional(&self.pool)
        .await;

        self.record_query("get_backend_host", started, result.is_ok());

        let row = result.map_err(|e| {
            Error::database(e, format!("Failed to fetch backend host: {}", connect_id))
        })?;

        Ok(row.map(BackendHost::from))
    }

    #[instrument(
        skip_all,
        fields(user_id = %user_id, org_id = %org_id, teams = team_ids.len()),
        name = "db_is_member_of_any_team"
    )]
    async fn is_member_of_any_team(
        &self,
        user_id: &UserId,
        org_id: &OrgId,
        team_ids: &[TeamId],
    ) -> Result<bool> {
        if team_ids.is_empty() {
            return Ok(false);
        }

        let team_ids: Vec<&str> = team_ids.iter().map(TeamId::as_str).collect();
        let started = Instant::now();

        let result = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
                SELECT 1 FROM teams
                WHERE team_id = ANY($1) AND org_id = $2 AND $3 = ANY(user_ids)
            )",
        )
        .bind(&team_ids)
        .bind(org_id.as_str())
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await;

        self.record_query("is_member_of_any_team", started, result.is_ok());

        result.map_err(|e| {
            Error::database(e, format!("Failed to check team membership for user {}", user_id))
        })
    }
}
