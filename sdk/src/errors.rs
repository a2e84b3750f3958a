//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the Vane engine.
//! All errors implement the `VaneErrorExt` trait which provides user-friendly
//! hints, a machine-readable category and whether the user (rather than an
//! operator) can act on the failure.
//!
//! # Error Categories
//!
//! - **Resolution**: ambiguous project references, missing data. Always
//!   generated locally; never reach a worker.
//! - **Worker**: permanent worker failures and exhausted retries. The worker's
//!   own category is preserved.
//! - **Storage**: the project or session store could not be read or written.
//! - **Infrastructure**: configuration, network, health probe failures.
//!
//! # Examples
//!
//! ```
//! use vane_sdk::errors::{EngineError, VaneErrorExt};
//!
//! let error = EngineError::AmbiguousProjectReference {
//!     candidates: vec!["west-texas-wind-farm".into(), "east-texas-wind-farm".into()],
//! };
//! assert_eq!(error.category(), "ambiguous_project_reference");
//! assert!(error.is_recoverable());
//! ```

use crate::types::{ErrorCategory, StepKind};
use thiserror::Error;

/// Trait for Vane error extensions
pub trait VaneErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the user can recover by changing the request
    ///
    /// Non-recoverable errors need an operator (a broken worker, an
    /// unreachable database) rather than a different query.
    fn is_recoverable(&self) -> bool;

    /// Machine-readable category code
    fn category(&self) -> &'static str;
}

/// Main engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Storage errors
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Invalid project document: {0}")]
    InvalidDocument(String),

    // Resolution errors
    #[error("Ambiguous project reference, candidates: {}", .candidates.join(", "))]
    AmbiguousProjectReference { candidates: Vec<String> },

    #[error("Missing required data '{field}'; run the {step} step first")]
    MissingRequiredData { field: String, step: StepKind },

    // Worker errors
    #[error("Worker '{worker}' failed ({category}): {message}")]
    WorkerPermanent {
        worker: String,
        category: ErrorCategory,
        message: String,
    },

    #[error("Worker '{worker}' failed after {attempts} attempts: {last_error}")]
    WorkerAggregated {
        worker: String,
        attempts: u32,
        last_error: String,
    },

    // Deployment health errors
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaneErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::StorageUnavailable(_) => {
                "Project storage is unavailable. Nothing was saved; try again shortly"
            }
            Self::ProjectNotFound(_) => "No project with that name. Use 'list my projects'",
            Self::InvalidDocument(_) => "The project data is inconsistent. Run the earlier steps first",
            Self::AmbiguousProjectReference { .. } => {
                "Several projects match. Repeat the request with the full project name"
            }
            Self::MissingRequiredData { .. } => "Run the suggested step first, then try again",
            Self::WorkerPermanent { .. } => "The analysis worker rejected the request",
            Self::WorkerAggregated { .. } => {
                "The analysis worker is not responding. Try again later"
            }
            Self::ServiceUnavailable(_) => "A required service is down. Try again later",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::AmbiguousProjectReference { .. }
            | Self::MissingRequiredData { .. }
            | Self::ProjectNotFound(_)
            | Self::InvalidDocument(_) => true,

            // Validation failures are fixable by the user, the rest need an operator
            Self::WorkerPermanent { category, .. } => {
                matches!(category, ErrorCategory::Validation | ErrorCategory::NotFound)
            }

            _ => false,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Database(_) => "database",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::InvalidDocument(_) => "invalid_document",
            Self::AmbiguousProjectReference { .. } => "ambiguous_project_reference",
            Self::MissingRequiredData { .. } => "missing_required_data",
            Self::WorkerPermanent { .. } => "worker_permanent_error",
            Self::WorkerAggregated { .. } => "worker_aggregated_error",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Network(_) => "network",
            Self::Io(_) => "io",
        }
    }
}
