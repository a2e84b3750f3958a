//! Command handlers for CLI operations
//!
//! - ask: Handle one free-text request
//! - projects: List stored projects
//! - show: Show one project in detail
//! - serve: Run the HTTP API host
//! - doctor: Validate configuration and probe dependencies
//! - purge-sessions: Remove expired session records

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::orchestrator::{Orchestrator, OrchestratorResponse};
use crate::project::ProjectSummary;
use crate::server;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

async fn open(config: &Config) -> Result<Orchestrator> {
    Orchestrator::from_config(config)
        .await
        .context("Failed to initialize orchestrator")
}

/// Render a response the way every command prints one
pub fn render_response(response: &OrchestratorResponse) -> String {
    let mut out = String::new();
    out.push_str(&response.message);
    out.push('\n');

    if let Some(name) = &response.project_name {
        out.push_str(&format!("\nProject: {}\n", name));
        for line in &response.status_lines {
            out.push_str(&format!("  {}\n", line));
        }
        out.push_str(&format!("  Complete: {}%\n", response.completion_percent));
    }

    if let Some(error) = &response.error {
        out.push_str(&format!("\nError [{}]: {}\n", error.category, error.hint));
        if !error.attempts.is_empty() {
            out.push_str(&format!("  Attempts: {}\n", error.attempts.len()));
        }
    }

    if let Some(action) = &response.next_suggested_action {
        out.push_str(&format!("\nNext: {}\n", action));
    }

    out
}

fn print_response(response: &OrchestratorResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", render_response(response)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(response)?),
    }
    Ok(())
}

/// Handle one request
pub async fn handle_ask(
    query: &str,
    session: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = open(config).await?;
    let response = orchestrator.handle(query, session).await;
    orchestrator.shutdown().await?;

    print_response(&response, format)?;
    if response.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

/// List stored projects, newest first
pub async fn handle_projects(session: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = open(config).await?;
    let projects = orchestrator.store().list().await?;
    let active = orchestrator.sessions().get_active(session).await;
    orchestrator.shutdown().await?;

    match format {
        OutputFormat::Text => {
            if projects.is_empty() {
                println!("No projects yet.");
                return Ok(());
            }
            println!("{:<2} {:<40} {:>9}  UPDATED", "", "NAME", "COMPLETE");
            for project in &projects {
                let marker = if active.as_deref() == Some(project.name.as_str()) {
                    "*"
                } else {
                    ""
                };
                println!(
                    "{:<2} {:<40} {:>8}%  {}",
                    marker,
                    project.name,
                    project.completion_percent,
                    format_millis(project.updated_at)
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "active": active,
                "projects": projects,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show one project
pub async fn handle_show(name: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = open(config).await?;
    let loaded = orchestrator.store().load(name).await;
    orchestrator.shutdown().await?;

    let document = match loaded {
        Ok(document) => document,
        Err(e) => {
            print_response(&OrchestratorResponse::failure(&e, None), format)?;
            std::process::exit(1);
        }
    };

    match format {
        OutputFormat::Text => {
            let summary: ProjectSummary = document.summary();
            let response = OrchestratorResponse::for_document(
                format!("Project {}", summary.name),
                &document,
            );
            print!("{}", render_response(&response));
            if let Some(coordinates) = document.coordinates {
                println!("\nLocation: {}", coordinates);
            }
            if let Some(metrics) = &document.metrics {
                println!("Metrics: {}", serde_json::to_string(metrics)?);
            }
            println!("Created: {}", format_millis(document.created_at));
            println!("Updated: {}", format_millis(document.updated_at));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
    }

    Ok(())
}

/// Run the HTTP API host until Ctrl-C
pub async fn handle_serve(bind: Option<String>, config: &Config) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(bind) = bind {
        server_config.bind = bind;
    }

    let orchestrator = Arc::new(open(config).await?);
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
    };

    server::serve(Arc::clone(&orchestrator), &server_config, shutdown).await?;
    orchestrator.shutdown().await?;
    Ok(())
}

/// Remove expired sessions
pub async fn handle_purge_sessions(config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = open(config).await?;
    let removed = orchestrator.sessions().purge_expired().await?;
    orchestrator.shutdown().await?;

    match format {
        OutputFormat::Text => println!("Removed {} expired session(s).", removed),
        OutputFormat::Json => println!("{}", json!({ "removed": removed })),
    }
    Ok(())
}

/// Run system diagnostics
///
/// Validates the configuration, opens the database and probes every worker's
/// health endpoint regardless of `health.enabled`.
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    use crate::health::{ComponentHealth, HealthProbe, HttpHealthProbe};
    use std::time::Duration;

    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration".to_string(), "Valid".to_string()));

    if config.core.data_dir.exists() {
        checks.push(("Data directory".to_string(), "Exists".to_string()));
    } else {
        checks.push(("Data directory".to_string(), "Missing".to_string()));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    match open(config).await {
        Ok(orchestrator) => {
            checks.push(("Database connection".to_string(), "OK".to_string()));

            let probe = HttpHealthProbe::new(
                config.workers.step_endpoints(),
                orchestrator.store().clone(),
                Duration::from_secs(config.health.timeout_secs),
            );
            let report = probe.probe().await;
            for (component, health) in report.components() {
                let status = match health {
                    ComponentHealth::Healthy => "Healthy",
                    ComponentHealth::Unhealthy => {
                        issues.push(format!("{} is not responding", component));
                        "Unhealthy"
                    }
                };
                checks.push((format!("Component {}", component), status.to_string()));
            }
            orchestrator.shutdown().await?;
        }
        Err(e) => {
            checks.push(("Database connection".to_string(), "Failed".to_string()));
            issues.push(format!("Cannot open database: {:#}", e));
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Vane System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}
