//! Deployment health
//!
//! A probe reports each component as healthy or unhealthy. The orchestrator
//! probes once per request and answers "service unavailable" straight away
//! when a component it needs is down, instead of running the pipeline against
//! a dependency known to be broken.

use crate::project::ProjectStore;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Component name used for project and session storage
pub const STORAGE: &str = "storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentHealth {
    Healthy,
    Unhealthy,
}

/// Health per component
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HealthReport {
    components: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: impl Into<String>, health: ComponentHealth) -> Self {
        self.set(component, health);
        self
    }

    pub fn set(&mut self, component: impl Into<String>, health: ComponentHealth) {
        self.components.insert(component.into(), health);
    }

    /// Components that were not probed count as healthy
    pub fn is_healthy(&self, component: &str) -> bool {
        self.components.get(component) != Some(&ComponentHealth::Unhealthy)
    }

    pub fn all_healthy(&self) -> bool {
        self.unhealthy().is_empty()
    }

    pub fn unhealthy(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, health)| **health == ComponentHealth::Unhealthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn components(&self) -> impl Iterator<Item = (&str, ComponentHealth)> {
        self.components.iter().map(|(name, health)| (name.as_str(), *health))
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> HealthReport;
}

/// Probe answering a fixed report
pub struct StaticProbe(pub HealthReport);

impl StaticProbe {
    /// Report that knows no components, so everything counts as healthy
    pub fn healthy() -> Self {
        Self(HealthReport::new())
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn probe(&self) -> HealthReport {
        self.0.clone()
    }
}

/// Checks `GET {endpoint}/health` for every worker and pings storage
pub struct HttpHealthProbe {
    client: reqwest::Client,
    workers: Vec<(String, String)>,
    store: ProjectStore,
    timeout: Duration,
}

impl HttpHealthProbe {
    /// `workers` pairs a worker name with its endpoint URL
    pub fn new(workers: Vec<(String, String)>, store: ProjectStore, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            workers,
            store,
            timeout,
        }
    }

    async fn check_worker(&self, name: &str, endpoint: &str) -> ComponentHealth {
        let url = format!("{}/health", endpoint.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => ComponentHealth::Healthy,
            Ok(response) => {
                tracing::warn!(worker = name, status = response.status().as_u16(), "Worker health check failed");
                ComponentHealth::Unhealthy
            }
            Err(e) => {
                tracing::warn!(worker = name, error = %e, "Worker health check failed");
                ComponentHealth::Unhealthy
            }
        }
    }

    async fn check_storage(&self) -> ComponentHealth {
        match tokio::time::timeout(self.timeout, self.store.ping()).await {
            Ok(Ok(())) => ComponentHealth::Healthy,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Storage health check failed");
                ComponentHealth::Unhealthy
            }
            Err(_) => {
                tracing::warn!("Storage health check timed out");
                ComponentHealth::Unhealthy
            }
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> HealthReport {
        let checks = self
            .workers
            .iter()
            .map(|(name, endpoint)| self.check_worker(name, endpoint));
        let (worker_health, storage) = tokio::join!(join_all(checks), self.check_storage());

        let mut report = HealthReport::new().with(STORAGE, storage);
        for ((name, _), health) in self.workers.iter().zip(worker_health) {
            report.set(name.clone(), health);
        }
        report
    }
}
