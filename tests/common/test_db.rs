//! Test database utilities for PostgreSQL integration tests.
//!
//! Each `TestDatabase` starts a fresh PostgreSQL container via Testcontainers
//! and applies the bundled migrations, so tests are fully isolated.

use mtls_router::config::DatabaseConfig;
use mtls_router::storage::{create_pool, DbPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

/// A test database backed by a Testcontainers PostgreSQL instance.
///
/// Keep this struct alive for the duration of the test; the container is
/// removed when it is dropped.
pub struct TestDatabase {
    pub pool: DbPool,
    pub config: DatabaseConfig,
    _container: ContainerAsync<Postgres>,
}

impl TestDatabase {
    /// Start a container and run all migrations. `prefix` only labels failures.
    pub async fn new(prefix: &str) -> Self {
        let container = Postgres::default().start().await.unwrap_or_else(|e| {
            panic!("Failed to start PostgreSQL container for {}: {}", prefix, e)
        });

        let host = container
            .get_host()
            .await
            .unwrap_or_else(|e| panic!("Failed to get container host for {}: {}", prefix, e));

        let port = container
            .get_host_port_ipv4(5432)
            .await
            .unwrap_or_else(|e| panic!("Failed to get container port for {}: {}", prefix, e));

        let config = DatabaseConfig {
            host: host.to_string(),
            port,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            name: "postgres".to_string(),
            max_open_connections: 5,
            max_idle_connections: 2,
            auto_migrate: true,
            ..Default::default()
        };

        let pool = create_pool(&config)
            .await
            .unwrap_or_else(|e| panic!("Failed to create test pool for {}: {}", prefix, e));

        Self { pool, config, _container: container }
    }

    pub async fn insert_host(
        &self,
        connect_id: &str,
        addr: &str,
        org: &str,
        users: &[&str],
        teams: &[&str],
    ) {
        sqlx::query(
            "INSERT INTO backend_hosts (connect_id, internal_ip_addr, org_id, user_ids, team_ids) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(connect_id)
        .bind(addr)
        .bind(org)
        .bind(users.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .bind(teams.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .execute(&self.pool)
        .await
        .expect("insert backend host");
    }

    pub async fn insert_team(&self, team_id: &str, org: &str, users: &[&str]) {
        sqlx::query("INSERT INTO teams (team_id, org_id, user_ids) VALUES ($1, $2, $3)")
            .bind(team_id)
            .bind(org)
            .bind(users.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .execute(&self.pool)
            .await
            .expect("insert team");
    }
}
