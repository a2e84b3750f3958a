//! Project store
//!
//! Read-through cached access to project documents. The backend owns
//! durability; the store owns the merge rules, the cache and the mapping of
//! backend failures onto `EngineError::StorageUnavailable`.

use super::{now_millis, ProjectDocument, ProjectSummary, ProjectUpdate};
use crate::cache::TtlCache;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vane_sdk::errors::EngineError;

/// Durable storage for project documents
#[async_trait]
pub trait ProjectBackend: Send + Sync {
    /// Fetch one document by exact name
    async fn fetch(&self, name: &str) -> anyhow::Result<Option<ProjectDocument>>;

    /// Insert or replace a document
    async fn upsert(&self, document: &ProjectDocument) -> anyhow::Result<()>;

    /// Fetch every stored document
    async fn fetch_all(&self) -> anyhow::Result<Vec<ProjectDocument>>;

    /// Names containing `fragment`, compared case-insensitively
    async fn names_containing(&self, fragment: &str) -> anyhow::Result<Vec<String>>;

    /// Cheap round trip used by the health probe
    async fn ping(&self) -> anyhow::Result<()>;
}

fn storage_error(error: anyhow::Error) -> EngineError {
    EngineError::StorageUnavailable(format!("{:#}", error))
}

/// Shared, cached entry point to project documents
#[derive(Clone)]
pub struct ProjectStore {
    backend: Arc<dyn ProjectBackend>,
    cache: TtlCache<String, ProjectDocument>,
}

impl ProjectStore {
    pub fn new(backend: Arc<dyn ProjectBackend>, cache_ttl: Duration) -> Self {
        Self {
            backend,
            cache: TtlCache::new(cache_ttl),
        }
    }

    /// Load a document, serving from the cache while the entry is fresh
    ///
    /// # Errors
    ///
    /// `ProjectNotFound` when no document exists under `name`,
    /// `StorageUnavailable` when the backend cannot be read.
    pub async fn load(&self, name: &str) -> Result<ProjectDocument, EngineError> {
        if let Some(document) = self.cache.get(&name.to_string()) {
            debug!(project = name, "Project cache hit");
            return Ok(document);
        }

        debug!(project = name, "Project cache miss");
        let document = self
            .backend
            .fetch(name)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| EngineError::ProjectNotFound(name.to_string()))?;

        // A save that finished while this read was in flight wins
        self.cache
            .insert_unless(name.to_string(), document.clone(), |cached, fetched| {
                cached.updated_at >= fetched.updated_at
            });
        Ok(document)
    }

    /// Apply a partial update with read-merge-write semantics
    ///
    /// The current document is always re-read from the backend so a stale
    /// cache entry can never overwrite a newer write. The cache is refreshed
    /// only once the backend has the new document. Returns the document as
    /// stored.
    pub async fn save(&self, update: &ProjectUpdate) -> Result<ProjectDocument, EngineError> {
        let now = now_millis();

        let current = self
            .backend
            .fetch(&update.name)
            .await
            .map_err(storage_error)?
            .unwrap_or_else(|| ProjectDocument::empty(update.name.clone(), now));

        let merged = current.merge(update, now)?;

        if let Err(e) = self.backend.upsert(&merged).await {
            self.cache.invalidate(&update.name);
            return Err(storage_error(e));
        }
        self.cache.insert(merged.name.clone(), merged.clone());

        info!(
            project = %merged.name,
            steps = ?update.steps.iter().map(|(step, _)| step.as_str()).collect::<Vec<_>>(),
            completion = merged.completion_percent(),
            "Project saved"
        );

        Ok(merged)
    }

    /// Summaries of every project, most recently updated first
    pub async fn list(&self) -> Result<Vec<ProjectSummary>, EngineError> {
        let documents = self.backend.fetch_all().await.map_err(storage_error)?;

        let mut summaries: Vec<ProjectSummary> =
            documents.iter().map(ProjectDocument::summary).collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(summaries)
    }

    /// Every stored project name
    pub async fn names(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.list().await?.into_iter().map(|s| s.name).collect())
    }

    /// Names containing `fragment`, case-insensitively, sorted
    pub async fn find_by_partial_name(&self, fragment: &str) -> Result<Vec<String>, EngineError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(Vec::new());
        }

        let mut names = self
            .backend
            .names_containing(fragment)
            .await
            .map_err(storage_error)?;
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub async fn ping(&self) -> Result<(), EngineError> {
        self.backend.ping().await.map_err(storage_error)
    }
}
