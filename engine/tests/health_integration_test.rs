//! Integration tests for the deployment health probe

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use vane_engine::db::Database;
use vane_engine::health::{ComponentHealth, HealthProbe, HttpHealthProbe, STORAGE};
use vane_engine::project::ProjectStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_probe_reports_each_worker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/terrain/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/layout/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let database = Database::new(&temp_dir.path().join("vane.db")).await.unwrap();
    let store = ProjectStore::new(Arc::new(database.projects()), Duration::from_secs(60));

    let workers = vec![
        ("terrain".to_string(), format!("{}/terrain", server.uri())),
        ("layout".to_string(), format!("{}/layout", server.uri())),
    ];
    let probe = HttpHealthProbe::new(workers, store, Duration::from_secs(2));
    let report = probe.probe().await;

    assert!(report.is_healthy("terrain"));
    assert!(!report.is_healthy("layout"));
    assert!(report.is_healthy(STORAGE));
    assert_eq!(report.unhealthy(), vec!["layout"]);

    let components: Vec<(&str, ComponentHealth)> = report.components().collect();
    assert_eq!(components.len(), 3);
}

#[tokio::test]
async fn test_closed_storage_is_unhealthy() {
    let temp_dir = TempDir::new().unwrap();
    let database = Database::new(&temp_dir.path().join("vane.db")).await.unwrap();
    let store = ProjectStore::new(Arc::new(database.projects()), Duration::from_secs(60));
    database.close().await.unwrap();

    let probe = HttpHealthProbe::new(Vec::new(), store, Duration::from_secs(1));
    let report = probe.probe().await;
    assert!(!report.is_healthy(STORAGE));
}
