//! Session context
//!
//! Tracks which project each conversation is currently talking about, plus a
//! short most-recent-first history. A missing or expired session is never an
//! error: callers simply see no active project.

use crate::cache::TtlCache;
use crate::project::now_millis;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vane_sdk::errors::EngineError;

/// Persisted per-session state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub active_project: Option<String>,
    pub project_history: Vec<String>,
    pub expires_at: i64,
}

impl SessionRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Durable storage for session records
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn fetch(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>>;

    async fn upsert(&self, record: &SessionRecord) -> anyhow::Result<()>;

    /// Delete records that expired at or before `now`, returning how many
    async fn purge_expired(&self, now: i64) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct SessionContext {
    backend: Arc<dyn SessionBackend>,
    cache: TtlCache<String, SessionRecord>,
    ttl: Duration,
    history_limit: usize,
}

impl SessionContext {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        ttl: Duration,
        history_limit: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            cache: TtlCache::new(cache_ttl),
            ttl,
            history_limit: history_limit.max(1),
        }
    }

    async fn live_record(&self, session_id: &str) -> Option<SessionRecord> {
        let now = now_millis();

        let record = match self.cache.get(&session_id.to_string()) {
            Some(record) => record,
            None => match self.backend.fetch(session_id).await {
                Ok(Some(record)) => {
                    self.cache
                        .insert_unless(session_id.to_string(), record.clone(), |cached, fetched| {
                            cached.expires_at >= fetched.expires_at
                        });
                    record
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!(session = session_id, error = %e, "Failed to read session, treating as new");
                    return None;
                }
            },
        };

        if record.is_expired(now) {
            debug!(session = session_id, "Session expired");
            None
        } else {
            Some(record)
        }
    }

    /// The project this session is currently working on
    pub async fn get_active(&self, session_id: &str) -> Option<String> {
        self.live_record(session_id)
            .await
            .and_then(|record| record.active_project)
    }

    /// Recently touched projects, most recent first
    pub async fn get_history(&self, session_id: &str) -> Vec<String> {
        self.live_record(session_id)
            .await
            .map(|record| record.project_history)
            .unwrap_or_default()
    }

    /// Make `name` the active project and refresh the session expiry
    pub async fn set_active(&self, session_id: &str, name: &str) -> Result<(), EngineError> {
        let now = now_millis();

        let mut history = match self.backend.fetch(session_id).await {
            Ok(Some(record)) if !record.is_expired(now) => record.project_history,
            Ok(_) => Vec::new(),
            Err(e) => return Err(EngineError::StorageUnavailable(format!("{:#}", e))),
        };

        history.retain(|existing| existing != name);
        history.insert(0, name.to_string());
        history.truncate(self.history_limit);

        let record = SessionRecord {
            session_id: session_id.to_string(),
            active_project: Some(name.to_string()),
            project_history: history,
            expires_at: now + self.ttl.as_millis() as i64,
        };

        if let Err(e) = self.backend.upsert(&record).await {
            self.cache.invalidate(&session_id.to_string());
            return Err(EngineError::StorageUnavailable(format!("{:#}", e)));
        }
        self.cache.insert(session_id.to_string(), record);

        debug!(session = session_id, project = name, "Active project set");
        Ok(())
    }

    /// Remove expired sessions from durable storage
    pub async fn purge_expired(&self) -> Result<u64, EngineError> {
        let removed = self
            .backend
            .purge_expired(now_millis())
            .await
            .map_err(|e| EngineError::StorageUnavailable(format!("{:#}", e)))?;

        if removed > 0 {
            info!(removed, "Purged expired sessions");
        }
        self.cache.clear();
        Ok(removed)
    }
}
