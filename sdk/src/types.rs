//! Worker wire types
//!
//! Shapes exchanged between the orchestration engine and the remote analysis
//! workers. Every worker accepts a [`WorkerRequest`] and answers with a
//! [`WorkerResponse`]; failures carry an [`ErrorCategory`] that decides whether
//! the engine retries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One step of the analysis pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Terrain,
    Layout,
    Simulation,
    Report,
}

impl StepKind {
    /// All steps in pipeline order
    pub const ALL: [StepKind; 4] = [
        StepKind::Terrain,
        StepKind::Layout,
        StepKind::Simulation,
        StepKind::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Terrain => "terrain",
            StepKind::Layout => "layout",
            StepKind::Simulation => "simulation",
            StepKind::Report => "report",
        }
    }

    /// Human-readable label used in status lines
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Terrain => "Terrain analysis",
            StepKind::Layout => "Layout optimization",
            StepKind::Simulation => "Wake simulation",
            StepKind::Report => "Report",
        }
    }

    /// Example request that runs this step
    pub fn example_request(&self) -> &'static str {
        match self {
            StepKind::Terrain => "analyze terrain at <lat>, <lon>",
            StepKind::Layout => "optimize layout with <n> units",
            StepKind::Simulation => "run wake simulation",
            StepKind::Report => "generate report",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "terrain" => Ok(StepKind::Terrain),
            "layout" => Ok(StepKind::Layout),
            "simulation" => Ok(StepKind::Simulation),
            "report" => Ok(StepKind::Report),
            other => Err(format!("unknown step '{}'", other)),
        }
    }
}

/// Geographic coordinates in decimal degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting values outside the valid ranges
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
            Some(Self { lat, lon })
        } else {
            None
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Failure category reported by a worker (or derived from the transport)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Permission,
    Auth,
    NotFound,
    Timeout,
    Throttling,
    Transient,
    Unavailable,
    #[serde(other)]
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Auth => "auth",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Throttling => "throttling",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Unavailable => "unavailable",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Whether a failure in this category is worth another attempt.
    ///
    /// Unknown categories are treated as permanent so an unexpected error is
    /// surfaced once instead of being repeated against the worker.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout
                | ErrorCategory::Throttling
                | ErrorCategory::Transient
                | ErrorCategory::Unavailable
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body posted to a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub step: StepKind,
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub project_name: String,
}

/// Error body embedded in an unsuccessful worker response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerErrorBody {
    pub message: String,
    pub category: ErrorCategory,
}

/// Response body returned by a worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkerErrorBody>,
}

impl WorkerResponse {
    /// Successful response carrying a step result
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response carrying a categorized error
    pub fn failed(message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(WorkerErrorBody {
                message: message.into(),
                category,
            }),
        }
    }
}
