//! SQLite storage for projects and sessions
//!
//! One database file under the data directory holds both tables. The file is
//! opened in WAL mode so listing and loading can run while a save commits.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::Path;
use tracing::{debug, info};

pub mod projects;
pub mod sessions;

pub use projects::ProjectRepository;
pub use sessions::SessionRepository;

const SCHEMA: &str = include_str!("../../migrations/001_initial.sql");

/// Pooled connection to the vane database
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open `db_path`, creating it and its directory on first use
    ///
    /// The schema is applied on every open; all of it is `IF NOT EXISTS`.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!(path = %db_path.display(), "Opening project database");

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to apply schema 001_initial.sql")?;

        debug!("Project and session tables ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checkpoint the WAL into the main file and close every connection
    pub async fn close(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("Failed to checkpoint WAL")?;
        self.pool.close().await;

        info!("Project database closed");
        Ok(())
    }

    pub fn projects(&self) -> ProjectRepository {
        ProjectRepository::new(self.pool.clone())
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.pool.clone())
    }
}
