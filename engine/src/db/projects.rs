/// Project persistence operations
///
/// One row per project. The document is stored as JSON alongside the
/// columns needed for ordering and lookup. All queries are parameterized.
use crate::project::{ProjectBackend, ProjectDocument};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

/// Project repository for database operations
pub struct ProjectRepository {
    pool: SqlitePool,
}

impl ProjectRepository {
    /// Create a new project repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<ProjectDocument> {
        let name: String = row.get("name");
        let document: String = row.get("document");
        serde_json::from_str(&document)
            .with_context(|| format!("Corrupt document stored for project '{}'", name))
    }

    /// Number of stored projects
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count projects")
    }
}

#[async_trait]
impl ProjectBackend for ProjectRepository {
    async fn fetch(&self, name: &str) -> Result<Option<ProjectDocument>> {
        let row = sqlx::query("SELECT name, document FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch project")?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn upsert(&self, document: &ProjectDocument) -> Result<()> {
        let json = serde_json::to_string(document).context("Failed to serialize project")?;

        sqlx::query(
            "INSERT INTO projects (name, document, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
        )
        .bind(&document.name)
        .bind(json)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to save project")?;

        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<ProjectDocument>> {
        let rows = sqlx::query("SELECT name, document FROM projects ORDER BY updated_at DESC, name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list projects")?;

        rows.iter().map(Self::decode).collect()
    }

    async fn names_containing(&self, fragment: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT name FROM projects WHERE instr(lower(name), lower(?)) > 0 ORDER BY name",
        )
        .bind(fragment)
        .fetch_all(&self.pool)
        .await
        .context("Failed to search project names")
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Project storage did not answer")?;
        Ok(())
    }
}
