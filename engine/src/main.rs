// Vane wind farm analysis orchestrator
// Main entry point for the vane binary

use clap::Parser;
use vane_engine::cli::{Cli, Command};
use vane_engine::config::Config;
use vane_engine::handlers::{
    handle_ask, handle_doctor, handle_projects, handle_purge_sessions, handle_serve, handle_show,
    OutputFormat,
};
use vane_engine::telemetry::{init_telemetry_with_level, normalize_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = match cli.log.as_deref() {
        Some(requested) => normalize_level(requested)
            .ok_or_else(|| anyhow::anyhow!("Invalid log level '{}'", requested))?,
        None => config.core.log_level.as_str(),
    };
    // The subscriber can only be installed once, so wait for the config
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Vane v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        Command::Ask { query, session } => handle_ask(&query, &session, &config, format).await,

        Command::Projects { session } => handle_projects(&session, &config, format).await,

        Command::Show { name } => handle_show(&name, &config, format).await,

        Command::Serve { bind } => {
            tracing::info!("Starting API server...");
            handle_serve(bind, &config).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }

        Command::PurgeSessions => handle_purge_sessions(&config, format).await,
    }
}
