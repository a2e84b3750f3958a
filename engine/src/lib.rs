//! Vane Engine Library
//!
//! Orchestration core for wind farm analysis: resolves which project a
//! free-text request refers to, runs the terrain → layout → simulation →
//! report pipeline through remote workers, and persists partial results.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Database persistence module
pub mod db;

/// TTL read cache shared by the stores
pub mod cache;

/// Project documents and the project store
pub mod project;

/// Session-scoped active project tracking
pub mod session;

/// Project name generation
pub mod naming;

/// Project reference resolution
pub mod resolver;

/// Intent classification and parameter extraction
pub mod intent;

/// Worker invocation with retry
pub mod invoker;

/// Deployment health probing
pub mod health;

/// Free-text answers
pub mod chat;

/// Request orchestration
pub mod orchestrator;

/// HTTP API host
pub mod server;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

#[cfg(test)]
pub(crate) mod testing;
