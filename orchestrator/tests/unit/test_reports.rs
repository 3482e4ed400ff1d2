//! Report store tests

use deployctl::models::request::{DeploymentRequest, Environment, StrategyKind};
use deployctl::models::status::{DeploymentState, DeploymentStatus};
use deployctl::storage::layout::StorageLayout;
use deployctl::storage::reports::ReportStore;

fn status(id: &str, state: DeploymentState) -> DeploymentStatus {
    let request = DeploymentRequest {
        environment: Environment::Staging,
        version: "v1.9.3".to_string(),
        strategy: StrategyKind::BlueGreen,
        health_check_timeout_ms: 5_000,
        rollback_threshold_error_rate: 1.0,
        validation_steps: vec![],
        post_deployment_tests: vec![],
    };
    let mut status = DeploymentStatus::new(id, &request);
    status.state = state;
    status
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(StorageLayout::new(dir.path()));

    let mut saved = status("deploy-20260101000000-aaaa0001", DeploymentState::Failed);
    saved.error = Some("Strategy error: no green instances configured".to_string());
    store.save(&saved).await.unwrap();

    let loaded = store.load(&saved.deployment_id).await.unwrap();
    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn test_list_returns_sorted_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(StorageLayout::new(dir.path()));
    assert!(store.list().await.unwrap().is_empty());

    for id in ["deploy-b", "deploy-a", "deploy-c"] {
        store.save(&status(id, DeploymentState::Completed)).await.unwrap();
    }

    assert_eq!(
        store.list().await.unwrap(),
        vec!["deploy-a", "deploy-b", "deploy-c"]
    );
}

#[tokio::test]
async fn test_overwrite_keeps_latest() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(StorageLayout::new(dir.path()));

    store.save(&status("deploy-x", DeploymentState::InProgress)).await.unwrap();
    store.save(&status("deploy-x", DeploymentState::RolledBack)).await.unwrap();

    let loaded = store.load("deploy-x").await.unwrap();
    assert_eq!(loaded.state, DeploymentState::RolledBack);
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_report_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReportStore::new(StorageLayout::new(dir.path()));
    assert!(store.load("deploy-missing").await.is_err());
}
