//! Caller-facing response shape
//!
//! Every request, successful or not, produces one [`OrchestratorResponse`]:
//! a human-readable message, the per-step status of the project concerned,
//! the completion percentage, a suggested next action and, on failure, a
//! structured error with a machine-readable category.

use crate::invoker::RetryAttemptRecord;
use crate::project::{ProjectDocument, ProjectSummary, StepStatus};
use serde::Serialize;
use vane_sdk::errors::{EngineError, VaneErrorExt};
use vane_sdk::types::StepKind;

/// Structured failure detail
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub category: String,
    pub message: String,
    pub hint: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_step: Option<StepKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<RetryAttemptRecord>,
}

impl From<&EngineError> for ResponseError {
    fn from(error: &EngineError) -> Self {
        let mut detail = ResponseError {
            category: error.category().to_string(),
            message: error.to_string(),
            hint: error.user_hint().to_string(),
            recoverable: error.is_recoverable(),
            ..Default::default()
        };

        match error {
            EngineError::AmbiguousProjectReference { candidates } => {
                detail.candidates = Some(candidates.clone());
            }
            EngineError::MissingRequiredData { field, step } => {
                detail.missing_field = Some(field.clone());
                detail.required_step = Some(*step);
            }
            EngineError::WorkerPermanent { category, .. } => {
                detail.worker_category = Some(category.to_string());
            }
            _ => {}
        }

        detail
    }
}

/// One row of a project listing
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListing {
    #[serde(flatten)]
    pub summary: ProjectSummary,
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorResponse {
    pub message: String,
    pub project_name: Option<String>,
    pub status: StepStatus,
    pub status_lines: Vec<String>,
    pub completion_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<ProjectListing>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectDocument>,
}

/// "Terrain analysis: complete" style line per step
pub fn status_lines(status: &StepStatus) -> Vec<String> {
    StepKind::ALL
        .iter()
        .map(|step| {
            let state = if status.is_complete(*step) {
                "complete"
            } else {
                "incomplete"
            };
            format!("{}: {}", step.label(), state)
        })
        .collect()
}

/// Suggest the first missing step
pub fn next_action(status: &StepStatus) -> Option<String> {
    status.next_step().map(suggest_step)
}

pub fn suggest_step(step: StepKind) -> String {
    format!("{}: \"{}\"", step.label(), step.example_request())
}

impl OrchestratorResponse {
    /// Response carrying a project's status
    pub fn for_status(
        message: impl Into<String>,
        project_name: Option<String>,
        status: StepStatus,
    ) -> Self {
        Self {
            message: message.into(),
            project_name,
            status,
            status_lines: status_lines(&status),
            completion_percent: status.completion_percent(),
            next_suggested_action: next_action(&status),
            ..Default::default()
        }
    }

    pub fn for_document(message: impl Into<String>, document: &ProjectDocument) -> Self {
        Self::for_status(message, Some(document.name.clone()), document.status())
    }

    /// Failure response; status reflects the project as it is stored
    pub fn failure(error: &EngineError, document: Option<&ProjectDocument>) -> Self {
        let status = document.map(ProjectDocument::status).unwrap_or_default();
        let mut response = Self::for_status(
            error_message(error),
            document.map(|d| d.name.clone()),
            status,
        );

        if let Some(action) = error_action(error) {
            response.next_suggested_action = Some(action);
        }
        response.error = Some(ResponseError::from(error));
        response
    }

    pub fn with_attempts(mut self, attempts: Vec<RetryAttemptRecord>) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.attempts = attempts;
        }
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn error_message(error: &EngineError) -> String {
    match error {
        EngineError::AmbiguousProjectReference { candidates } => format!(
            "Several projects match your request: {}. Which one did you mean?",
            candidates.join(", ")
        ),
        EngineError::MissingRequiredData { field, step } if field == "project" => format!(
            "There is no project to work on yet. Start with a {} at a location.",
            step.label().to_lowercase()
        ),
        EngineError::MissingRequiredData { field, step } => format!(
            "Cannot continue without {}. Run the {} step first.",
            field.replace('_', " "),
            step
        ),
        EngineError::WorkerPermanent {
            worker,
            category,
            message,
        } => format!("The {} worker rejected the request ({}): {}", worker, category, message),
        EngineError::WorkerAggregated {
            worker,
            attempts,
            last_error,
        } => format!(
            "The {} worker failed {} times in a row. Last error: {}",
            worker, attempts, last_error
        ),
        other => other.to_string(),
    }
}

fn error_action(error: &EngineError) -> Option<String> {
    match error {
        EngineError::AmbiguousProjectReference { candidates } => candidates
            .first()
            .map(|name| format!("Repeat the request with a full project name, e.g. \"{}\"", name)),
        EngineError::MissingRequiredData { step, .. } => Some(suggest_step(*step)),
        _ => None,
    }
}
