//! Integration tests for worker invocation over HTTP
//!
//! Workers are served by wiremock; the retry policy uses a short base delay so
//! the backoff sequence stays observable without slowing the suite down.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vane_engine::config::WorkersConfig;
use vane_engine::invoker::{ErrorClass, HttpWorkerClient, InvokeError, RetryPolicy, RetryingInvoker};
use vane_sdk::types::{ErrorCategory, StepKind, WorkerRequest};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn invoker(server: &MockServer, base_delay_ms: u64) -> RetryingInvoker {
    let workers = WorkersConfig {
        base_url: server.uri(),
        timeout_secs: 5,
        ..Default::default()
    };
    RetryingInvoker::new(
        Arc::new(HttpWorkerClient::new(workers)),
        RetryPolicy::new(3, Duration::from_millis(base_delay_ms)),
    )
}

fn request() -> WorkerRequest {
    WorkerRequest {
        step: StepKind::Terrain,
        parameters: BTreeMap::from([(
            "coordinates".to_string(),
            json!({"lat": 35.07, "lon": -101.40}),
        )]),
        project_name: "amarillo-wind-farm".to_string(),
    }
}

async fn calls(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn test_success_returns_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terrain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"slope_deg": 3.1}
        })))
        .mount(&server)
        .await;

    let result = invoker(&server, 10).invoke("terrain", &request()).await.unwrap();
    assert_eq!(result["slope_deg"], 3.1);
    assert_eq!(calls(&server).await, 1);

    let received = &server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&received.body).unwrap();
    assert_eq!(body["projectName"], "amarillo-wind-farm");
    assert_eq!(body["step"], "terrain");
}

#[tokio::test]
async fn test_validation_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terrain"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": {"message": "latitude out of range", "category": "validation"}
        })))
        .mount(&server)
        .await;

    let error = invoker(&server, 10).invoke("terrain", &request()).await.unwrap_err();
    match &error {
        InvokeError::Permanent { failure, attempts, .. } => {
            assert_eq!(failure.category, ErrorCategory::Validation);
            assert_eq!(failure.message, "latitude out of range");
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].error_class, ErrorClass::Permanent);
        }
        other => panic!("Expected permanent failure, got {:?}", other),
    }
    assert_eq!(calls(&server).await, 1);
}

#[tokio::test]
async fn test_failure_body_with_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terrain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": {"message": "not allowed", "category": "permission"}
        })))
        .mount(&server)
        .await;

    let error = invoker(&server, 10).invoke("terrain", &request()).await.unwrap_err();
    assert!(matches!(error, InvokeError::Permanent { .. }));
    assert!(error.to_string().contains("permission"));
}

#[tokio::test]
async fn test_transient_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terrain"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/terrain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"ok": true}
        })))
        .mount(&server)
        .await;

    let result = invoker(&server, 10).invoke("terrain", &request()).await.unwrap();
    assert_eq!(result["ok"], true);
    assert_eq!(calls(&server).await, 3);
}

#[tokio::test]
async fn test_throttling_exhausts_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terrain"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let start = Instant::now();
    let error = invoker(&server, 50).invoke("terrain", &request()).await.unwrap_err();
    let elapsed = start.elapsed();

    let attempts = error.attempts();
    assert_eq!(attempts.len(), 3);
    let backoffs: Vec<u64> = attempts.iter().map(|a| a.backoff_ms).collect();
    assert_eq!(backoffs, vec![50, 100, 0]);
    assert!(attempts.iter().all(|a| a.category == "throttling"));
    assert!(elapsed >= Duration::from_millis(150));

    assert!(matches!(error, InvokeError::Aggregated { .. }));
    assert_eq!(calls(&server).await, 3);
}

#[tokio::test]
async fn test_malformed_body_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/terrain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let error = invoker(&server, 10).invoke("terrain", &request()).await.unwrap_err();
    match error {
        InvokeError::Permanent { failure, .. } => {
            assert_eq!(failure.category, ErrorCategory::Unknown)
        }
        other => panic!("Expected permanent failure, got {:?}", other),
    }
    assert_eq!(calls(&server).await, 1);
}

#[tokio::test]
async fn test_unreachable_worker_is_unavailable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let workers = WorkersConfig {
        base_url: uri,
        timeout_secs: 2,
        ..Default::default()
    };
    let invoker = RetryingInvoker::new(
        Arc::new(HttpWorkerClient::new(workers)),
        RetryPolicy::new(2, Duration::from_millis(10)),
    );

    let error = invoker.invoke("terrain", &request()).await.unwrap_err();
    assert_eq!(error.attempts().len(), 2);
    assert_eq!(error.attempts()[0].category, "unavailable");
}
