/// Session persistence operations
///
/// Session rows carry their own expiry. Expired rows are still returned by
/// `fetch` and filtered by the session context, so a read never fails just
/// because a session timed out.
use crate::session::{SessionBackend, SessionRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

/// Session repository for database operations
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionBackend for SessionRepository {
    async fn fetch(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT session_id, active_project, project_history, expires_at FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let history: String = row.get("project_history");
        let project_history: Vec<String> =
            serde_json::from_str(&history).context("Corrupt session history")?;

        Ok(Some(SessionRecord {
            session_id: row.get("session_id"),
            active_project: row.get("active_project"),
            project_history,
            expires_at: row.get("expires_at"),
        }))
    }

    async fn upsert(&self, record: &SessionRecord) -> Result<()> {
        let history = serde_json::to_string(&record.project_history)
            .context("Failed to serialize session history")?;

        sqlx::query(
            "INSERT INTO sessions (session_id, active_project, project_history, expires_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET active_project = excluded.active_project,
                 project_history = excluded.project_history, expires_at = excluded.expires_at",
        )
        .bind(&record.session_id)
        .bind(&record.active_project)
        .bind(history)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to save session")?;

        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to purge expired sessions")?;

        Ok(result.rows_affected())
    }
}
