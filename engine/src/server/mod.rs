//! HTTP API host
//!
//! # Endpoints
//!
//! - POST /api/query - Handle one free-text request for a session
//! - GET /api/projects?session_id= - List projects, marking the session's active one
//! - GET /api/projects/:name - Project detail
//! - GET /api/health - Deployment health per component

use crate::config::ServerConfig;
use crate::health::HealthReport;
use crate::orchestrator::{Orchestrator, OrchestratorResponse, ProjectListing};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use vane_sdk::errors::EngineError;

#[derive(Clone)]
struct ServerState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Query answer, echoing the session so clients without one can keep it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub response: OrchestratorResponse,
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    healthy: bool,
    components: HealthReport,
}

/// Build the API router
pub fn router(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Router {
    let state = ServerState { orchestrator };

    Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/projects", get(projects_handler))
        .route("/api/projects/:name", get(project_handler))
        .route("/api/health", get(health_handler))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    orchestrator: Arc<Orchestrator>,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", config.bind, e)))?;

    let addr = listener
        .local_addr()
        .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;
    tracing::info!("API server listening on http://{}", addr);

    let app = router(orchestrator, Duration::from_secs(config.request_timeout_secs));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("API server shutting down gracefully");
        })
        .await
        .map_err(|e| EngineError::Network(format!("API server error: {}", e)))
}

fn status_for(response: &OrchestratorResponse) -> StatusCode {
    match response.error.as_ref().map(|e| e.category.as_str()) {
        None => StatusCode::OK,
        Some("ambiguous_project_reference") => StatusCode::CONFLICT,
        Some("missing_required_data") | Some("invalid_document") => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Some("project_not_found") => StatusCode::NOT_FOUND,
        Some("worker_permanent_error") | Some("worker_aggregated_error") => StatusCode::BAD_GATEWAY,
        Some("storage_unavailable") | Some("service_unavailable") => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn query_handler(
    State(state): State<ServerState>,
    Json(payload): Json<QueryRequest>,
) -> Response {
    if payload.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "query must not be empty"})),
        )
            .into_response();
    }

    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let response = state.orchestrator.handle(&payload.query, &session_id).await;
    let status = status_for(&response);

    (
        status,
        Json(QueryResponse {
            session_id,
            response,
        }),
    )
        .into_response()
}

async fn projects_handler(
    State(state): State<ServerState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let summaries = match state.orchestrator.store().list().await {
        Ok(summaries) => summaries,
        Err(e) => {
            let response = OrchestratorResponse::failure(&e, None);
            return (status_for(&response), Json(response)).into_response();
        }
    };

    let active = match &query.session_id {
        Some(session_id) => state.orchestrator.sessions().get_active(session_id).await,
        None => None,
    };

    let projects: Vec<ProjectListing> = summaries
        .into_iter()
        .map(|summary| ProjectListing {
            active: active.as_deref() == Some(summary.name.as_str()),
            summary,
        })
        .collect();

    Json(json!({ "projects": projects })).into_response()
}

async fn project_handler(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.store().load(&name).await {
        Ok(document) => {
            let mut response = OrchestratorResponse::for_document(
                format!("Project {}", document.name),
                &document,
            );
            response.project = Some(document);
            Json(response).into_response()
        }
        Err(e) => {
            let response = OrchestratorResponse::failure(&e, None);
            (status_for(&response), Json(response)).into_response()
        }
    }
}

async fn health_handler(State(state): State<ServerState>) -> Response {
    let components = state.orchestrator.health().await;
    let healthy = components.all_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(HealthBody { healthy, components })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectDocument;
    use crate::testing::{memory_orchestrator, EchoWorkers};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<crate::testing::MemoryProjects>) {
        let (orchestrator, projects) = memory_orchestrator(Arc::new(EchoWorkers));
        (
            router(Arc::new(orchestrator), Duration::from_secs(30)),
            projects,
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_query(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_runs_step() {
        let (app, _) = app();
        let response = app
            .oneshot(post_query(json!({
                "query": "analyze terrain at 35.07, -101.40",
                "session_id": "s1"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sessionId"], "s1");
        assert_eq!(body["completionPercent"], 25);
        assert_eq!(body["status"]["terrain"], true);
    }

    #[tokio::test]
    async fn test_query_generates_session() {
        let (app, _) = app();
        let response = app
            .oneshot(post_query(json!({"query": "hello"})))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert!(!body["sessionId"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_is_unprocessable() {
        let (app, projects) = app();
        projects.put(ProjectDocument::empty("project-x", 1));

        let response = app
            .oneshot(post_query(json!({
                "query": "run wake simulation for project-x",
                "session_id": "s1"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"]["requiredStep"], "layout");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (app, _) = app();
        let response = app
            .oneshot(post_query(json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_project_detail_and_not_found() {
        let (app, projects) = app();
        projects.put(ProjectDocument::empty("ohio-wind-farm", 1));

        let found = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/projects/ohio-wind-farm")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        let body = body_json(found).await;
        assert_eq!(body["project"]["name"], "ohio-wind-farm");

        let missing = app
            .oneshot(
                Request::builder()
                    .uri("/api/projects/nowhere-wind-farm")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_project_list() {
        let (app, projects) = app();
        projects.put(ProjectDocument::empty("ohio-wind-farm", 1));
        projects.put(ProjectDocument::empty("iowa-wind-farm", 2));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/projects?session_id=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        let names: Vec<&str> = body["projects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["iowa-wind-farm", "ohio-wind-farm"]);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["healthy"], true);
    }
}
