//! CLI interface for Vane
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vane wind farm analysis orchestrator
///
/// Runs terrain analysis, layout optimization, wake simulation and report
/// generation for named projects from free-text requests.
#[derive(Parser, Debug)]
#[command(name = "vane")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Handle one free-text request
    Ask {
        /// The request, e.g. "analyze terrain at 35.07, -101.40"
        query: String,

        /// Session the request belongs to
        #[arg(short, long, default_value = "cli")]
        session: String,
    },

    /// List stored projects
    Projects {
        /// Mark the active project of this session
        #[arg(short, long, default_value = "cli")]
        session: String,
    },

    /// Show one project in detail
    Show {
        /// Project name
        name: String,
    },

    /// Run the HTTP API host
    Serve {
        /// Listen address, overriding the configured one
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Run system diagnostics
    Doctor,

    /// Remove expired sessions
    PurgeSessions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_defaults_session() {
        let cli = Cli::parse_from(["vane", "ask", "analyze terrain at 35.07, -101.40"]);
        if let Command::Ask { query, session } = cli.command {
            assert_eq!(query, "analyze terrain at 35.07, -101.40");
            assert_eq!(session, "cli");
        } else {
            panic!("Expected Ask command");
        }
    }

    #[test]
    fn test_ask_with_session() {
        let cli = Cli::parse_from(["vane", "ask", "continue", "--session", "abc"]);
        if let Command::Ask { session, .. } = cli.command {
            assert_eq!(session, "abc");
        } else {
            panic!("Expected Ask command");
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "vane",
            "projects",
            "--json",
            "--log",
            "debug",
            "--config",
            "/tmp/vane.toml",
        ]);
        assert!(cli.json);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/vane.toml")));
        assert!(matches!(cli.command, Command::Projects { .. }));
    }

    #[test]
    fn test_serve_bind_override() {
        let cli = Cli::parse_from(["vane", "serve", "--bind", "0.0.0.0:9000"]);
        if let Command::Serve { bind } = cli.command {
            assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
        } else {
            panic!("Expected Serve command");
        }
    }

    #[test]
    fn test_show_and_doctor() {
        let cli = Cli::parse_from(["vane", "show", "ohio-wind-farm"]);
        assert!(matches!(cli.command, Command::Show { name } if name == "ohio-wind-farm"));

        let cli = Cli::parse_from(["vane", "doctor"]);
        assert!(matches!(cli.command, Command::Doctor));

        let cli = Cli::parse_from(["vane", "purge-sessions"]);
        assert!(matches!(cli.command, Command::PurgeSessions));
    }
}
