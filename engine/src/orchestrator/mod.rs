//! Request orchestration
//!
//! Turns one free-text request into at most one worker call:
//!
//! 1. probe deployment health (storage down → service unavailable)
//! 2. resolve the project; ambiguous references stop here
//! 3. load the stored document, retrying storage hiccups
//! 4. make the project active for the session
//! 5. classify the request and fill missing parameters from the document
//! 6. refuse with the exact prerequisite step when data is still missing
//! 7. invoke the worker with retry, then merge and save its result
//! 8. report per-step status, completion and the next step
//!
//! Listing and detail queries are answered from storage alone. Failures are
//! returned as structured errors inside the response and never change what is
//! stored.

use crate::chat::{CannedChat, ChatContext, ChatResponder, OllamaChat};
use crate::config::Config;
use crate::db::Database;
use crate::health::{HealthProbe, HealthReport, HttpHealthProbe, StaticProbe, STORAGE};
use crate::intent::{coordinates_param, Classification, Intent, IntentClassifier};
use crate::invoker::{HttpWorkerClient, RetryPolicy, RetryingInvoker};
use crate::naming::{CachedGeocoder, NameGenerator, NominatimGeocoder};
use crate::project::{now_millis, ProjectDocument, ProjectStore, ProjectUpdate, StepResult};
use crate::resolver::{ProjectResolver, ResolutionOutcome};
use crate::session::SessionContext;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vane_sdk::errors::EngineError;
use vane_sdk::types::{StepKind, WorkerRequest};

pub mod response;

pub use response::{OrchestratorResponse, ProjectListing, ResponseError};

/// Collaborators the orchestrator is assembled from
pub struct Components {
    pub store: ProjectStore,
    pub sessions: SessionContext,
    pub names: NameGenerator,
    pub invoker: RetryingInvoker,
    pub storage_retry: RetryPolicy,
    pub health: Arc<dyn HealthProbe>,
    pub chat: Arc<dyn ChatResponder>,
}

pub struct Orchestrator {
    store: ProjectStore,
    sessions: SessionContext,
    resolver: ProjectResolver,
    classifier: IntentClassifier,
    invoker: RetryingInvoker,
    storage_retry: RetryPolicy,
    health: Arc<dyn HealthProbe>,
    chat: Arc<dyn ChatResponder>,
    database: Option<Database>,
}

impl Orchestrator {
    pub fn new(components: Components) -> Self {
        let resolver = ProjectResolver::new(
            components.store.clone(),
            components.sessions.clone(),
            components.names,
        );

        Self {
            store: components.store,
            sessions: components.sessions,
            resolver,
            classifier: IntentClassifier::new(),
            invoker: components.invoker,
            storage_retry: components.storage_retry,
            health: components.health,
            chat: components.chat,
            database: None,
        }
    }

    /// Wire every collaborator from configuration
    ///
    /// Opens (and migrates) the database, then builds the HTTP worker client,
    /// the optional reverse geocoder, health probe and chat backend.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let database = Database::new(&config.database_path()).await?;

        let store = ProjectStore::new(
            Arc::new(database.projects()),
            Duration::from_secs(config.storage.cache_ttl_secs),
        );
        let sessions = SessionContext::new(
            Arc::new(database.sessions()),
            Duration::from_secs(config.session.ttl_days * 24 * 3600),
            config.session.history_limit,
            Duration::from_secs(config.session.cache_ttl_secs),
        );

        let geocoder = config.geocode.enabled.then(|| {
            CachedGeocoder::new(
                Arc::new(NominatimGeocoder::new(
                    config.geocode.base_url.clone(),
                    config.geocode.user_agent.clone(),
                    Duration::from_secs(config.geocode.timeout_secs),
                )),
                Duration::from_secs(config.geocode.cache_ttl_hours * 3600),
                Duration::from_secs(config.geocode.timeout_secs),
            )
        });
        let names = NameGenerator::new(store.clone(), geocoder, config.naming.max_unique_attempts);

        let policy = RetryPolicy::new(config.retry.max_attempts, config.retry.base_delay());
        let invoker = RetryingInvoker::new(
            Arc::new(HttpWorkerClient::new(config.workers.clone())),
            policy,
        );

        let health: Arc<dyn HealthProbe> = if config.health.enabled {
            Arc::new(HttpHealthProbe::new(
                config.workers.step_endpoints(),
                store.clone(),
                Duration::from_secs(config.health.timeout_secs),
            ))
        } else {
            Arc::new(StaticProbe::healthy())
        };

        let chat: Arc<dyn ChatResponder> = if config.chat.enabled {
            Arc::new(OllamaChat::new(
                config.chat.base_url.clone(),
                config.chat.model.clone(),
            ))
        } else {
            Arc::new(CannedChat)
        };

        let mut orchestrator = Self::new(Components {
            store,
            sessions,
            names,
            invoker,
            storage_retry: policy,
            health,
            chat,
        });
        orchestrator.database = Some(database);

        Ok(orchestrator)
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionContext {
        &self.sessions
    }

    /// Current deployment health
    pub async fn health(&self) -> HealthReport {
        self.health.probe().await
    }

    /// Flush and close the database, if this orchestrator owns one
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if let Some(database) = &self.database {
            database.close().await?;
        }
        Ok(())
    }

    /// Handle one request for one session
    pub async fn handle(&self, query: &str, session_id: &str) -> OrchestratorResponse {
        let started = std::time::Instant::now();
        let response = self.handle_inner(query, session_id).await;

        info!(
            session = session_id,
            project = response.project_name.as_deref().unwrap_or("-"),
            completion = response.completion_percent,
            error = response.error.as_ref().map(|e| e.category.as_str()).unwrap_or("-"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request handled"
        );
        response
    }

    async fn handle_inner(&self, query: &str, session_id: &str) -> OrchestratorResponse {
        let health = self.health.probe().await;
        if !health.is_healthy(STORAGE) {
            let error = EngineError::ServiceUnavailable("project storage is unhealthy".to_string());
            return OrchestratorResponse::failure(&error, None);
        }

        let classification = self.classifier.classify(query);
        if classification.intent == Some(Intent::ListProjects) {
            return self.list_projects(session_id).await;
        }

        let outcome = match self.resolver.resolve(query, session_id).await {
            Ok(outcome) => outcome,
            Err(e) => return OrchestratorResponse::failure(&e, None),
        };

        let (name, is_new) = match outcome {
            ResolutionOutcome::Ambiguous(candidates) => {
                let error = EngineError::AmbiguousProjectReference { candidates };
                return OrchestratorResponse::failure(&error, None);
            }
            ResolutionOutcome::None => return self.unresolved(query, session_id, &classification).await,
            ResolutionOutcome::Resolved(name) => (name, false),
            ResolutionOutcome::New(name) => (name, true),
        };

        let step = classification.intent.and_then(|intent| intent.step());

        if is_new {
            match classification.intent {
                Some(Intent::ShowProject) => {
                    let error = EngineError::ProjectNotFound(name);
                    return OrchestratorResponse::failure(&error, None);
                }
                None => return self.converse(query, session_id, None).await,
                _ => {}
            }
        }

        let document = if is_new {
            ProjectDocument::empty(name.clone(), now_millis())
        } else {
            match self.load_document(&name).await {
                Ok(document) => document,
                Err(e) => return OrchestratorResponse::failure(&e, None),
            }
        };

        if let Err(e) = self.sessions.set_active(session_id, &name).await {
            warn!(session = session_id, project = %name, error = %e, "Failed to update session context");
        }

        let Some(step) = step else {
            return if classification.intent == Some(Intent::ShowProject) {
                self.show_project(document, is_new)
            } else {
                self.converse(query, session_id, Some(&document)).await
            };
        };

        let parameters = match merge_parameters(step, &classification, &document) {
            Ok(parameters) => parameters,
            Err(e) => return OrchestratorResponse::failure(&e, Some(&document)),
        };

        if !health.is_healthy(step.as_str()) {
            let error =
                EngineError::ServiceUnavailable(format!("the {} worker is unhealthy", step));
            return OrchestratorResponse::failure(&error, Some(&document));
        }

        self.run_step(step, &name, parameters, &document).await
    }

    /// Load a stored document; a missing one reads as empty
    async fn load_document(&self, name: &str) -> Result<ProjectDocument, EngineError> {
        let loaded = self
            .storage_retry
            .run("load project", |_| self.store.load(name))
            .await
            .map_err(|failure| failure.into_error());

        match loaded {
            Ok(document) => Ok(document),
            Err(EngineError::ProjectNotFound(_)) => Ok(ProjectDocument::empty(name, now_millis())),
            Err(e) => Err(e),
        }
    }

    async fn run_step(
        &self,
        step: StepKind,
        name: &str,
        parameters: BTreeMap<String, Value>,
        document: &ProjectDocument,
    ) -> OrchestratorResponse {
        let coordinates = coordinates_param(&parameters);
        let request = WorkerRequest {
            step,
            parameters,
            project_name: name.to_string(),
        };

        let result = match self.invoker.invoke(step.as_str(), &request).await {
            Ok(result) => result,
            Err(e) => {
                let attempts = e.attempts().to_vec();
                let error = EngineError::from(e);
                return OrchestratorResponse::failure(&error, Some(document)).with_attempts(attempts);
            }
        };

        let mut update = ProjectUpdate::new(name)
            .with_step(step, StepResult::new(step.as_str(), result, now_millis()));
        if let Some(coordinates) = coordinates {
            update = update.with_coordinates(coordinates);
        }

        match self.store.save(&update).await {
            Ok(saved) => {
                let message = format!("{} complete for {}.", step.label(), saved.name);
                let mut response = OrchestratorResponse::for_document(message, &saved);
                response.project = Some(saved);
                response
            }
            Err(EngineError::StorageUnavailable(reason)) => {
                let error = EngineError::StorageUnavailable(format!(
                    "the {} result was computed but not saved: {}",
                    step, reason
                ));
                OrchestratorResponse::failure(&error, Some(document))
            }
            Err(e) => OrchestratorResponse::failure(&e, Some(document)),
        }
    }

    async fn unresolved(
        &self,
        query: &str,
        session_id: &str,
        classification: &Classification,
    ) -> OrchestratorResponse {
        match classification.intent {
            Some(Intent::Step(_)) => {
                let error = EngineError::MissingRequiredData {
                    field: "project".to_string(),
                    step: StepKind::Terrain,
                };
                OrchestratorResponse::failure(&error, None)
            }
            Some(Intent::ShowProject) => self.list_projects(session_id).await,
            _ => self.converse(query, session_id, None).await,
        }
    }

    async fn converse(
        &self,
        query: &str,
        session_id: &str,
        document: Option<&ProjectDocument>,
    ) -> OrchestratorResponse {
        let context = ChatContext {
            active_project: document.map(|d| d.name.clone()),
            recent_projects: self.sessions.get_history(session_id).await,
        };

        let message = match self.chat.respond(query, &context).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(responder = self.chat.name(), error = %e, "Chat responder failed, using help text");
                crate::chat::help_text(&context)
            }
        };

        match document {
            Some(document) => OrchestratorResponse::for_document(message, document),
            None => OrchestratorResponse {
                message,
                ..Default::default()
            },
        }
    }

    async fn list_projects(&self, session_id: &str) -> OrchestratorResponse {
        let summaries = match self.store.list().await {
            Ok(summaries) => summaries,
            Err(e) => return OrchestratorResponse::failure(&e, None),
        };
        let active = self.sessions.get_active(session_id).await;

        if summaries.is_empty() {
            return OrchestratorResponse {
                message: "You have no projects yet.".to_string(),
                next_suggested_action: Some(response::suggest_step(StepKind::Terrain)),
                projects: Some(Vec::new()),
                ..Default::default()
            };
        }

        let mut lines = vec![format!("{} project(s):", summaries.len())];
        let listings: Vec<ProjectListing> = summaries
            .into_iter()
            .map(|summary| {
                let is_active = active.as_deref() == Some(summary.name.as_str());
                lines.push(format!(
                    "{} {} ({}% complete)",
                    if is_active { "*" } else { "-" },
                    summary.name,
                    summary.completion_percent
                ));
                ProjectListing {
                    summary,
                    active: is_active,
                }
            })
            .collect();

        let mut response = match listings.iter().find(|listing| listing.active) {
            Some(current) => OrchestratorResponse::for_status(
                String::new(),
                Some(current.summary.name.clone()),
                current.summary.status,
            ),
            None => OrchestratorResponse::default(),
        };
        response.message = lines.join("\n");
        response.projects = Some(listings);
        response
    }

    fn show_project(&self, document: ProjectDocument, is_new: bool) -> OrchestratorResponse {
        if is_new || document.is_empty() {
            let message = format!("{} has no results yet.", document.name);
            return OrchestratorResponse::for_document(message, &document);
        }

        let mut lines = vec![format!("Project {}", document.name)];
        if let Some(coordinates) = document.coordinates {
            lines.push(format!("Location: {}", coordinates));
        }
        for step in StepKind::ALL {
            if let Some(result) = document.step_results.get(step) {
                let when = chrono::DateTime::from_timestamp_millis(result.completed_at)
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| result.completed_at.to_string());
                lines.push(format!("{}: completed {}", step.label(), when));
            }
        }
        if let Some(metrics) = &document.metrics {
            if let Some(count) = metrics.unit_count {
                lines.push(format!("Units: {}", count));
            }
            if let Some(capacity) = metrics.total_capacity_mw {
                lines.push(format!("Total capacity: {:.1} MW", capacity));
            }
            if let Some(output) = metrics.annual_output_gwh {
                lines.push(format!("Annual output: {:.1} GWh", output));
            }
        }

        let mut response = OrchestratorResponse::for_document(lines.join("\n"), &document);
        response.project = Some(document);
        response
    }
}

/// Fill step parameters from the document and check prerequisites
///
/// Parameters extracted from the request always win over stored values.
pub fn merge_parameters(
    step: StepKind,
    classification: &Classification,
    document: &ProjectDocument,
) -> Result<BTreeMap<String, Value>, EngineError> {
    let mut parameters = classification.parameters.clone();

    if !parameters.contains_key("coordinates") {
        if let Some(coordinates) = document.coordinates {
            parameters.insert(
                "coordinates".to_string(),
                json!({"lat": coordinates.lat, "lon": coordinates.lon}),
            );
        }
    }

    let results = &document.step_results;
    let missing = |field: &str, step: StepKind| EngineError::MissingRequiredData {
        field: field.to_string(),
        step,
    };

    match step {
        StepKind::Terrain | StepKind::Layout => {
            if !parameters.contains_key("coordinates") {
                return Err(missing("coordinates", StepKind::Terrain));
            }
            if step == StepKind::Layout {
                if let Some(terrain) = &results.terrain {
                    parameters.insert("terrain".to_string(), terrain.data.clone());
                }
            }
        }
        StepKind::Simulation => {
            let layout = results
                .layout
                .as_ref()
                .ok_or_else(|| missing("layout", StepKind::Layout))?;
            parameters.insert("layout".to_string(), layout.data.clone());
        }
        StepKind::Report => {
            let mut prior = Map::new();
            for earlier in [StepKind::Terrain, StepKind::Layout, StepKind::Simulation] {
                if let Some(result) = results.get(earlier) {
                    prior.insert(earlier.as_str().to_string(), result.data.clone());
                }
            }
            if prior.is_empty() {
                return Err(missing("results", StepKind::Terrain));
            }
            parameters.insert("results".to_string(), Value::Object(prior));
        }
    }

    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentHealth;
    use crate::invoker::{WorkerClient, WorkerFailure};
    use crate::project::ProjectBackend;
    use crate::testing::{FailingProjects, MemoryProjects, MemorySessions, UnwritableProjects};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vane_sdk::types::{Coordinates, ErrorCategory};

    /// Worker that answers by step and records every request
    #[derive(Default)]
    struct RecordingWorkers {
        requests: Mutex<Vec<WorkerRequest>>,
        fail_with: Option<ErrorCategory>,
    }

    impl RecordingWorkers {
        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last(&self) -> WorkerRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl WorkerClient for RecordingWorkers {
        async fn call(&self, worker: &str, request: &WorkerRequest) -> Result<Value, WorkerFailure> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(category) = self.fail_with {
                return Err(WorkerFailure::new(category, "worker says no"));
            }
            Ok(match worker {
                "layout" => json!({"unit_count": request.parameters.get("unit_count").cloned().unwrap_or(json!(8)), "unit_capacity_mw": 3.0}),
                "simulation" => json!({"annual_output_gwh": 95.5}),
                other => json!({"worker": other}),
            })
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        workers: Arc<RecordingWorkers>,
        projects: Arc<MemoryProjects>,
    }

    fn harness_with(workers: RecordingWorkers, health: HealthReport) -> Harness {
        let projects = Arc::new(MemoryProjects::default());
        let workers = Arc::new(workers);
        let store = ProjectStore::new(
            Arc::clone(&projects) as Arc<dyn ProjectBackend>,
            Duration::from_secs(300),
        );
        let sessions = SessionContext::new(
            Arc::new(MemorySessions::default()),
            Duration::from_secs(3600),
            10,
            Duration::from_secs(300),
        );

        let orchestrator = Orchestrator::new(Components {
            names: NameGenerator::new(store.clone(), None, 1000),
            store,
            sessions,
            invoker: RetryingInvoker::new(
                Arc::clone(&workers) as Arc<dyn WorkerClient>,
                RetryPolicy::new(3, Duration::from_millis(1000)),
            ),
            storage_retry: RetryPolicy::new(3, Duration::from_millis(1000)),
            health: Arc::new(StaticProbe(health)),
            chat: Arc::new(CannedChat),
        });

        Harness {
            orchestrator,
            workers,
            projects,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingWorkers::default(), HealthReport::new())
    }

    #[tokio::test]
    async fn test_fresh_terrain_creates_project() {
        let h = harness();
        let response = h.orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;

        assert!(response.error.is_none(), "{:?}", response.error);
        let name = response.project_name.clone().unwrap();
        assert!(name.ends_with("-wind-farm"));
        assert_eq!(response.completion_percent, 25);

        let stored = h.projects.get(&name).unwrap();
        assert_eq!(stored.coordinates, Coordinates::new(35.07, -101.40));
        assert!(stored.step_results.terrain.is_some());
        assert!(stored.step_results.layout.is_none());
    }

    #[tokio::test]
    async fn test_follow_up_layout_uses_stored_coordinates() {
        let h = harness();
        let first = h.orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;
        let second = h.orchestrator.handle("optimize layout with 10 units", "s1").await;

        assert!(second.error.is_none(), "{:?}", second.error);
        assert_eq!(second.project_name, first.project_name);
        assert_eq!(second.completion_percent, 50);

        let request = h.workers.last();
        assert_eq!(request.step, StepKind::Layout);
        assert_eq!(request.parameters["unit_count"], 10);
        assert_eq!(request.parameters["coordinates"]["lat"], 35.07);
        assert!(request.parameters.contains_key("terrain"));
    }

    #[tokio::test]
    async fn test_simulation_without_layout_is_missing_data() {
        let h = harness();
        h.projects.put(ProjectDocument::empty("project-x", 1));

        let response = h.orchestrator.handle("run wake simulation for project-x", "s1").await;
        let error = response.error.unwrap();
        assert_eq!(error.category, "missing_required_data");
        assert_eq!(error.missing_field.as_deref(), Some("layout"));
        assert_eq!(error.required_step, Some(StepKind::Layout));
        assert_eq!(h.workers.count(), 0);
        assert_eq!(h.projects.get("project-x"), Some(ProjectDocument::empty("project-x", 1)));
    }

    #[tokio::test]
    async fn test_ambiguous_partial_name() {
        let h = harness();
        h.projects.put(ProjectDocument::empty("west-texas-wind-farm", 1));
        h.projects.put(ProjectDocument::empty("east-texas-wind-farm", 1));

        let response = h.orchestrator.handle("optimize layout for texas", "s1").await;
        let error = response.error.unwrap();
        assert_eq!(error.category, "ambiguous_project_reference");
        assert_eq!(error.candidates.unwrap().len(), 2);
        assert_eq!(h.workers.count(), 0);
    }

    #[tokio::test]
    async fn test_step_without_any_project() {
        let h = harness();
        let response = h.orchestrator.handle("optimize layout with 10 units", "s1").await;

        let error = response.error.unwrap();
        assert_eq!(error.missing_field.as_deref(), Some("project"));
        assert_eq!(error.required_step, Some(StepKind::Terrain));
        assert_eq!(h.workers.count(), 0);
    }

    #[tokio::test]
    async fn test_permanent_worker_failure_leaves_document() {
        let h = harness_with(
            RecordingWorkers {
                fail_with: Some(ErrorCategory::Validation),
                ..Default::default()
            },
            HealthReport::new(),
        );

        let response = h.orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;
        let error = response.error.unwrap();
        assert_eq!(error.category, "worker_permanent_error");
        assert_eq!(error.worker_category.as_deref(), Some("validation"));
        assert_eq!(error.attempts.len(), 1);
        assert_eq!(h.workers.count(), 1);
        assert!(h.orchestrator.store().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_worker_short_circuits() {
        let h = harness_with(
            RecordingWorkers::default(),
            HealthReport::new().with("terrain", ComponentHealth::Unhealthy),
        );

        let response = h.orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;
        assert_eq!(response.error.unwrap().category, "service_unavailable");
        assert_eq!(h.workers.count(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_storage_short_circuits() {
        let h = harness_with(
            RecordingWorkers::default(),
            HealthReport::new().with(STORAGE, ComponentHealth::Unhealthy),
        );

        let response = h.orchestrator.handle("list my projects", "s1").await;
        assert_eq!(response.error.unwrap().category, "service_unavailable");
    }

    #[tokio::test]
    async fn test_list_marks_active_project() {
        let h = harness();
        let created = h.orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;
        let name = created.project_name.unwrap();
        h.projects.put(ProjectDocument::empty("ohio-wind-farm", 1));

        let response = h.orchestrator.handle("list my projects", "s1").await;
        let projects = response.projects.unwrap();
        assert_eq!(projects.len(), 2);

        let active: Vec<&str> = projects
            .iter()
            .filter(|p| p.active)
            .map(|p| p.summary.name.as_str())
            .collect();
        assert_eq!(active, vec![name.as_str()]);
        assert!(response
            .message
            .contains(&format!("* {} (25% complete)", name)));
        assert!(response.message.contains("- ohio-wind-farm (0% complete)"));
    }

    #[tokio::test]
    async fn test_show_project_details() {
        let h = harness();
        let created = h.orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;
        let name = created.project_name.unwrap();

        let response = h
            .orchestrator
            .handle(&format!("show project {}", name), "s2")
            .await;
        assert!(response.error.is_none(), "{:?}", response.error);
        assert!(response.message.contains("Terrain analysis: completed"));
        assert!(response.message.contains("Location: 35.0700, -101.4000"));
        assert!(response.project.is_some());
        assert_eq!(h.workers.count(), 1);
    }

    #[tokio::test]
    async fn test_general_conversation() {
        let h = harness();
        let response = h.orchestrator.handle("hello", "s1").await;
        assert!(response.error.is_none());
        assert!(response.message.contains("Wake simulation"));
        assert_eq!(h.workers.count(), 0);
    }

    #[tokio::test]
    async fn test_report_needs_prior_step() {
        let h = harness();
        h.projects.put(ProjectDocument::empty("ohio-wind-farm", 1));

        let response = h.orchestrator.handle("generate report for ohio-wind-farm", "s1").await;
        let error = response.error.unwrap();
        assert_eq!(error.missing_field.as_deref(), Some("results"));
        assert_eq!(h.workers.count(), 0);
    }

    fn orchestrator_over(
        backend: Arc<dyn ProjectBackend>,
        workers: &Arc<RecordingWorkers>,
    ) -> Orchestrator {
        let store = ProjectStore::new(backend, Duration::from_secs(300));
        Orchestrator::new(Components {
            names: NameGenerator::new(store.clone(), None, 1000),
            store,
            sessions: SessionContext::new(
                Arc::new(MemorySessions::default()),
                Duration::from_secs(3600),
                10,
                Duration::from_secs(300),
            ),
            invoker: RetryingInvoker::new(
                Arc::clone(workers) as Arc<dyn WorkerClient>,
                RetryPolicy::default(),
            ),
            storage_retry: RetryPolicy::default(),
            health: Arc::new(StaticProbe::healthy()),
            chat: Arc::new(CannedChat),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_storage_stops_before_worker() {
        let workers = Arc::new(RecordingWorkers::default());
        let orchestrator = orchestrator_over(Arc::new(FailingProjects), &workers);

        let response = orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;
        assert_eq!(response.error.unwrap().category, "storage_unavailable");
        assert_eq!(workers.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_after_worker_success() {
        let workers = Arc::new(RecordingWorkers::default());
        let backend = Arc::new(UnwritableProjects::default());
        let orchestrator =
            orchestrator_over(Arc::clone(&backend) as Arc<dyn ProjectBackend>, &workers);

        let response = orchestrator.handle("analyze terrain at 35.07, -101.40", "s1").await;
        let error = response.error.clone().unwrap();
        assert_eq!(error.category, "storage_unavailable");
        assert!(
            response.message.contains("computed but not saved"),
            "{}",
            response.message
        );
        assert!(response.message.contains("disk full"));
        assert_eq!(response.completion_percent, 0);
        assert_eq!(workers.count(), 1);
        assert!(backend.inner.fetch_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_merge_parameters_prefers_request_values() {
        let classifier = IntentClassifier::new();
        let mut document = ProjectDocument::empty("p-wind-farm", 1);
        document.coordinates = Coordinates::new(10.0, 10.0);

        let classification = classifier.classify("analyze terrain at 20.5, 30.5");
        let parameters = merge_parameters(StepKind::Terrain, &classification, &document).unwrap();
        assert_eq!(parameters["coordinates"]["lat"], 20.5);

        let classification = classifier.classify("analyze the terrain again");
        let parameters = merge_parameters(StepKind::Terrain, &classification, &document).unwrap();
        assert_eq!(parameters["coordinates"]["lat"], 10.0);
    }
}
