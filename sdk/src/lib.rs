//! Vane SDK
//!
//! Shared types for the Vane orchestration engine and the analysis workers it
//! drives. Workers that want to speak the wire protocol depend on this crate
//! alone.

/// Error types and handling
pub mod errors;

/// Worker request/response types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, VaneErrorExt};
pub use types::{
    Coordinates, ErrorCategory, StepKind, WorkerErrorBody, WorkerRequest, WorkerResponse,
};
