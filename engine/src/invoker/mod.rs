//! Worker invocation with bounded retry
//!
//! [`RetryPolicy`] is the retry loop: attempt, classify the failure, back off
//! `base * 2^(n-1)` and try again while attempts remain. It is shared by
//! worker calls and storage loads. [`RetryingInvoker`] applies it to a
//! [`WorkerClient`] and turns the outcome into engine errors.
//!
//! Every attempt is logged with its number, error class, chosen backoff and
//! timestamp, so the full retry history can be rebuilt from the logs.

use crate::project::now_millis;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vane_sdk::errors::EngineError;
use vane_sdk::types::{ErrorCategory, WorkerRequest};

pub mod http;

pub use http::HttpWorkerClient;

/// A single failed worker call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{category}: {message}")]
pub struct WorkerFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl WorkerFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Transport to the analysis workers
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Run one step on the named worker, returning its result payload
    async fn call(&self, worker: &str, request: &WorkerRequest) -> Result<Value, WorkerFailure>;
}

/// Whether a failure is worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    Retryable,
    Permanent,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Retryable => f.write_str("retryable"),
            ErrorClass::Permanent => f.write_str("permanent"),
        }
    }
}

/// Errors the retry loop knows how to classify
pub trait Classify: fmt::Display {
    fn error_class(&self) -> ErrorClass;

    /// Short machine-readable label recorded with each attempt
    fn label(&self) -> &'static str;
}

impl Classify for WorkerFailure {
    fn error_class(&self) -> ErrorClass {
        if self.category.is_retryable() {
            ErrorClass::Retryable
        } else {
            ErrorClass::Permanent
        }
    }

    fn label(&self) -> &'static str {
        self.category.as_str()
    }
}

impl Classify for EngineError {
    fn error_class(&self) -> ErrorClass {
        match self {
            EngineError::StorageUnavailable(_) | EngineError::Network(_) => ErrorClass::Retryable,
            _ => ErrorClass::Permanent,
        }
    }

    fn label(&self) -> &'static str {
        vane_sdk::errors::VaneErrorExt::category(self)
    }
}

/// One failed attempt, as reported to callers and logs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttemptRecord {
    pub attempt_number: u32,
    pub error_class: ErrorClass,
    pub category: String,
    pub message: String,
    /// Delay chosen before the next attempt; zero when there is none
    pub backoff_ms: u64,
    pub timestamp: i64,
}

/// How a retried operation ended without success
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// The last error was not worth retrying
    Permanent {
        error: E,
        attempts: Vec<RetryAttemptRecord>,
    },
    /// Every attempt failed with a retryable error
    Exhausted {
        error: E,
        attempts: Vec<RetryAttemptRecord>,
    },
}

impl<E> RetryFailure<E> {
    pub fn attempts(&self) -> &[RetryAttemptRecord] {
        match self {
            RetryFailure::Permanent { attempts, .. } | RetryFailure::Exhausted { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn into_error(self) -> E {
        match self {
            RetryFailure::Permanent { error, .. } | RetryFailure::Exhausted { error, .. } => error,
        }
    }
}

/// Attempt budget and exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Same backoff, different attempt budget
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self::new(max_attempts, self.base_delay)
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of attempts
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryFailure<E>>
    where
        E: Classify,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = Vec::new();
        let mut attempt = 1;

        loop {
            let error = match operation(attempt).await {
                Ok(value) => {
                    info!(operation = label, attempt, "Attempt succeeded");
                    return Ok(value);
                }
                Err(error) => error,
            };

            let error_class = error.error_class();
            let retry = error_class == ErrorClass::Retryable && attempt < self.max_attempts;
            let backoff = if retry {
                self.backoff(attempt)
            } else {
                Duration::ZERO
            };

            let record = RetryAttemptRecord {
                attempt_number: attempt,
                error_class,
                category: error.label().to_string(),
                message: error.to_string(),
                backoff_ms: backoff.as_millis() as u64,
                timestamp: now_millis(),
            };

            warn!(
                operation = label,
                attempt = record.attempt_number,
                error_class = %record.error_class,
                category = %record.category,
                backoff_ms = record.backoff_ms,
                timestamp = record.timestamp,
                error = %record.message,
                "Attempt failed"
            );
            attempts.push(record);

            if error_class == ErrorClass::Permanent {
                return Err(RetryFailure::Permanent { error, attempts });
            }
            if !retry {
                warn!(operation = label, attempts = attempt, "Retries exhausted");
                return Err(RetryFailure::Exhausted { error, attempts });
            }

            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// Failed worker invocation, with the attempt history
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("Worker '{worker}' failed ({}): {}", .failure.category, .failure.message)]
    Permanent {
        worker: String,
        failure: WorkerFailure,
        attempts: Vec<RetryAttemptRecord>,
    },

    #[error("Worker '{worker}' failed after {} attempts: {}", .attempts.len(), .last.message)]
    Aggregated {
        worker: String,
        last: WorkerFailure,
        attempts: Vec<RetryAttemptRecord>,
    },
}

impl InvokeError {
    pub fn attempts(&self) -> &[RetryAttemptRecord] {
        match self {
            InvokeError::Permanent { attempts, .. } | InvokeError::Aggregated { attempts, .. } => {
                attempts
            }
        }
    }
}

impl From<InvokeError> for EngineError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::Permanent {
                worker, failure, ..
            } => EngineError::WorkerPermanent {
                worker,
                category: failure.category,
                message: failure.message,
            },
            InvokeError::Aggregated {
                worker,
                last,
                attempts,
            } => EngineError::WorkerAggregated {
                worker,
                attempts: attempts.len() as u32,
                last_error: last.to_string(),
            },
        }
    }
}

/// Worker client wrapped in the retry policy
#[derive(Clone)]
pub struct RetryingInvoker {
    client: Arc<dyn WorkerClient>,
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(client: Arc<dyn WorkerClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Invoke with the configured attempt budget
    pub async fn invoke(&self, worker: &str, request: &WorkerRequest) -> Result<Value, InvokeError> {
        self.invoke_with_attempts(worker, request, self.policy.max_attempts)
            .await
    }

    pub async fn invoke_with_attempts(
        &self,
        worker: &str,
        request: &WorkerRequest,
        max_attempts: u32,
    ) -> Result<Value, InvokeError> {
        let policy = self.policy.with_max_attempts(max_attempts);
        let client = Arc::clone(&self.client);

        policy
            .run(worker, |_| {
                let client = Arc::clone(&client);
                async move { client.call(worker, request).await }
            })
            .await
            .map_err(|failure| match failure {
                RetryFailure::Permanent { error, attempts } => InvokeError::Permanent {
                    worker: worker.to_string(),
                    failure: error,
                    attempts,
                },
                RetryFailure::Exhausted { error, attempts } => InvokeError::Aggregated {
                    worker: worker.to_string(),
                    last: error,
                    attempts,
                },
            })
    }
}
