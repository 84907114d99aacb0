//! Authorization against a real PostgreSQL schema.
//!
//! Run with: cargo test --features postgres_tests

#![cfg(feature = "postgres_tests")]

mod common;

use std::sync::Arc;

use common::test_db::TestDatabase;
use mtls_router::domain::{ConnectId, OrgId, TeamId, UserId};
use mtls_router::errors::RouteError;
use mtls_router::routing::AuthorizationStore;
use mtls_router::storage::{
    get_migration_version, get_pool_stats, ping, BackendHostRepository, SqlxBackendHostRepository,
};

fn store(db: &TestDatabase) -> AuthorizationStore {
    AuthorizationStore::new(Arc::new(SqlxBackendHostRepository::new(db.pool.clone())))
}

#[tokio::test]
async fn schema_is_migrated_and_reachable() {
    let db = TestDatabase::new("schema").await;

    ping(&db.pool).await.unwrap();
    assert!(get_migration_version(&db.pool).await.unwrap() > 0);
    assert!(get_pool_stats(&db.pool).size >= 1);
}

#[tokio::test]
async fn host_rows_map_to_domain() {
    let db = TestDatabase::new("host_rows").await;
    db.insert_host("h1", "10.0.0.1:22", "o1", &["alice", "bob"], &["ops"]).await;

    let repo = SqlxBackendHostRepository::new(db.pool.clone());
    let host = repo.get_backend_host(&ConnectId::from("h1")).await.unwrap().unwrap();

    assert_eq!(host.internal_addr, "10.0.0.1:22");
    assert_eq!(host.org_id, OrgId::from("o1"));
    assert!(host.grants_user(&UserId::from("bob")));
    assert!(host.team_ids.contains(&TeamId::from("ops")));

    assert!(repo.get_backend_host(&ConnectId::from("nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn direct_and_team_grants() {
    let db = TestDatabase::new("grants").await;
    db.insert_host("h1", "10.0.0.1:22", "o1", &["alice"], &["ops", "dev"]).await;
    db.insert_team("ops", "o1", &["carol"]).await;
    db.insert_team("dev", "o2", &["dave"]).await;
    let store = store(&db);

    let org = OrgId::from("o1");
    let host = ConnectId::from("h1");

    assert!(store.is_authorized(&UserId::from("alice"), &org, &host).await.unwrap());
    assert!(store.is_authorized(&UserId::from("carol"), &org, &host).await.unwrap());
    // team from another org grants nothing
    assert!(!store.is_authorized(&UserId::from("dave"), &org, &host).await.unwrap());
    assert!(!store.is_authorized(&UserId::from("mallory"), &org, &host).await.unwrap());

    let target = store.route(&UserId::from("carol"), &org, &host).await.unwrap();
    assert_eq!(target.backend_addr, "10.0.0.1:22");
}

#[tokio::test]
async fn cross_org_and_missing_hosts_are_denied() {
    let db = TestDatabase::new("cross_org").await;
    db.insert_host("h1", "10.0.0.1:22", "o1", &["alice"], &[]).await;
    let store = store(&db);

    let err = store
        .route(&UserId::from("alice"), &OrgId::from("o2"), &ConnectId::from("h1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::NotAuthorized { .. }));

    let err = store
        .route(&UserId::from("alice"), &OrgId::from("o1"), &ConnectId::from("h2"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::HostNotFound { .. }));
}

#[tokio::test]
async fn host_without_address_is_unavailable() {
    let db = TestDatabase::new("no_addr").await;
    db.insert_host("h1", "", "o1", &["alice"], &[]).await;

    let err = store(&db)
        .route(&UserId::from("alice"), &OrgId::from("o1"), &ConnectId::from("h1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::RoutingUnavailable { .. }));
}

#[tokio::test]
async fn closed_pool_surfaces_storage_error() {
    let db = TestDatabase::new("closed_pool").await;
    let store = store(&db);
    db.pool.close().await;

    let err = store
        .route(&UserId::from("alice"), &OrgId::from("o1"), &ConnectId::from("h1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::Storage(_)));
}
