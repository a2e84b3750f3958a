//! HTTP transport for analysis workers
//!
//! Each worker is a JSON endpoint taking a `WorkerRequest` and answering with a
//! `WorkerResponse`. Transport-level problems are mapped onto the same error
//! categories workers report themselves:
//!
//! - connect failures and 503 → unavailable
//! - timeouts and 408 → timeout
//! - 429 → throttling
//! - other 5xx and dropped connections → transient
//! - 401 → auth, 403 → permission, 404 → not_found
//! - other 4xx → validation

use super::{WorkerClient, WorkerFailure};
use crate::config::WorkersConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Instant;
use vane_sdk::types::{ErrorCategory, WorkerRequest, WorkerResponse};

/// Worker client that POSTs to configured endpoints
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: Client,
    workers: WorkersConfig,
}

impl HttpWorkerClient {
    pub fn new(workers: WorkersConfig) -> Self {
        let client = Client::builder()
            .timeout(workers.timeout())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, workers }
    }

    pub fn endpoint(&self, worker: &str) -> String {
        self.workers.endpoint(worker)
    }
}

/// Category for a non-success HTTP status
pub fn status_category(status: StatusCode) -> ErrorCategory {
    match status {
        StatusCode::UNAUTHORIZED => ErrorCategory::Auth,
        StatusCode::FORBIDDEN => ErrorCategory::Permission,
        StatusCode::NOT_FOUND => ErrorCategory::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorCategory::Timeout,
        StatusCode::TOO_MANY_REQUESTS => ErrorCategory::Throttling,
        StatusCode::SERVICE_UNAVAILABLE => ErrorCategory::Unavailable,
        s if s.is_server_error() => ErrorCategory::Transient,
        s if s.is_client_error() => ErrorCategory::Validation,
        _ => ErrorCategory::Unknown,
    }
}

fn transport_failure(error: &reqwest::Error, url: &str) -> WorkerFailure {
    if error.is_timeout() {
        WorkerFailure::new(ErrorCategory::Timeout, format!("Request to {} timed out", url))
    } else if error.is_connect() {
        WorkerFailure::new(
            ErrorCategory::Unavailable,
            format!("Cannot connect to worker at {}", url),
        )
    } else {
        WorkerFailure::new(ErrorCategory::Transient, error.to_string())
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn call(&self, worker: &str, request: &WorkerRequest) -> Result<Value, WorkerFailure> {
        let url = self.endpoint(worker);

        tracing::debug!(
            worker,
            url = %url,
            step = %request.step,
            project = %request.project_name,
            parameters = request.parameters.len(),
            "Calling worker"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_failure(&e, &url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_failure(&e, &url))?;

        tracing::debug!(
            worker,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Worker responded"
        );

        let parsed: Option<WorkerResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        format!("HTTP {}", status)
                    } else {
                        format!("HTTP {}: {}", status, body.trim())
                    }
                });
            return Err(WorkerFailure::new(status_category(status), message));
        }

        let Some(parsed) = parsed else {
            return Err(WorkerFailure::new(
                ErrorCategory::Unknown,
                format!("Worker '{}' returned a malformed response", worker),
            ));
        };

        if parsed.success {
            Ok(parsed.result.unwrap_or_else(|| Value::Object(Default::default())))
        } else {
            let error = parsed.error.map_or_else(
                || WorkerFailure::new(ErrorCategory::Unknown, "Worker reported failure without detail"),
                |e| WorkerFailure::new(e.category, e.message),
            );
            Err(error)
        }
    }
}
