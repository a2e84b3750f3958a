//! In-memory backends for unit tests

use crate::project::{ProjectBackend, ProjectDocument};
use crate::session::{SessionBackend, SessionRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
pub struct MemoryProjects {
    documents: Mutex<HashMap<String, ProjectDocument>>,
}

impl MemoryProjects {
    pub fn get(&self, name: &str) -> Option<ProjectDocument> {
        self.documents.lock().unwrap().get(name).cloned()
    }

    pub fn put(&self, document: ProjectDocument) {
        self.documents
            .lock()
            .unwrap()
            .insert(document.name.clone(), document);
    }
}

#[async_trait]
impl ProjectBackend for MemoryProjects {
    async fn fetch(&self, name: &str) -> anyhow::Result<Option<ProjectDocument>> {
        Ok(self.get(name))
    }

    async fn upsert(&self, document: &ProjectDocument) -> anyhow::Result<()> {
        self.put(document.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<ProjectDocument>> {
        Ok(self.documents.lock().unwrap().values().cloned().collect())
    }

    async fn names_containing(&self, fragment: &str) -> anyhow::Result<Vec<String>> {
        let fragment = fragment.to_lowercase();
        Ok(self
            .documents
            .lock()
            .unwrap()
            .keys()
            .filter(|name| name.to_lowercase().contains(&fragment))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Backend whose every call fails
pub struct FailingProjects;

#[async_trait]
impl ProjectBackend for FailingProjects {
    async fn fetch(&self, _name: &str) -> anyhow::Result<Option<ProjectDocument>> {
        anyhow::bail!("database is locked")
    }

    async fn upsert(&self, _document: &ProjectDocument) -> anyhow::Result<()> {
        anyhow::bail!("database is locked")
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<ProjectDocument>> {
        anyhow::bail!("database is locked")
    }

    async fn names_containing(&self, _fragment: &str) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("database is locked")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("database is locked")
    }
}

/// Backend that reads fine but cannot write
#[derive(Default)]
pub struct UnwritableProjects {
    pub inner: MemoryProjects,
}

#[async_trait]
impl ProjectBackend for UnwritableProjects {
    async fn fetch(&self, name: &str) -> anyhow::Result<Option<ProjectDocument>> {
        self.inner.fetch(name).await
    }

    async fn upsert(&self, _document: &ProjectDocument) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<ProjectDocument>> {
        self.inner.fetch_all().await
    }

    async fn names_containing(&self, fragment: &str) -> anyhow::Result<Vec<String>> {
        self.inner.names_containing(fragment).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Holds one backend call open until the test lets it finish
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Hold the next call that reaches this gate
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until a call is being held
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

/// In-memory projects with a gate after each read and before each write
#[derive(Default)]
pub struct GatedProjects {
    pub inner: MemoryProjects,
    pub reads: Gate,
    pub writes: Gate,
}

#[async_trait]
impl ProjectBackend for GatedProjects {
    async fn fetch(&self, name: &str) -> anyhow::Result<Option<ProjectDocument>> {
        let document = self.inner.get(name);
        self.reads.pass().await;
        Ok(document)
    }

    async fn upsert(&self, document: &ProjectDocument) -> anyhow::Result<()> {
        self.writes.pass().await;
        self.inner.upsert(document).await
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<ProjectDocument>> {
        self.inner.fetch_all().await
    }

    async fn names_containing(&self, fragment: &str) -> anyhow::Result<Vec<String>> {
        self.inner.names_containing(fragment).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessions {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessions {
    pub fn put(&self, record: SessionRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.session_id.clone(), record);
    }
}

#[async_trait]
impl SessionBackend for MemorySessions {
    async fn fetch(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>> {
        Ok(self.records.lock().unwrap().get(session_id).cloned())
    }

    async fn upsert(&self, record: &SessionRecord) -> anyhow::Result<()> {
        self.put(record.clone());
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> anyhow::Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

/// In-memory sessions whose writes can be held open
#[derive(Default)]
pub struct GatedSessions {
    pub inner: MemorySessions,
    pub writes: Gate,
}

#[async_trait]
impl SessionBackend for GatedSessions {
    async fn fetch(&self, session_id: &str) -> anyhow::Result<Option<SessionRecord>> {
        self.inner.fetch(session_id).await
    }

    async fn upsert(&self, record: &SessionRecord) -> anyhow::Result<()> {
        self.writes.pass().await;
        self.inner.upsert(record).await
    }

    async fn purge_expired(&self, now: i64) -> anyhow::Result<u64> {
        self.inner.purge_expired(now).await
    }
}

/// Worker answering every step with a small JSON result
pub struct EchoWorkers;

#[async_trait]
impl crate::invoker::WorkerClient for EchoWorkers {
    async fn call(
        &self,
        worker: &str,
        _request: &vane_sdk::types::WorkerRequest,
    ) -> Result<serde_json::Value, crate::invoker::WorkerFailure> {
        Ok(serde_json::json!({ "worker": worker }))
    }
}

/// Orchestrator over in-memory storage, a healthy probe and canned chat
pub fn memory_orchestrator(
    workers: Arc<dyn crate::invoker::WorkerClient>,
) -> (crate::orchestrator::Orchestrator, Arc<MemoryProjects>) {
    use crate::chat::CannedChat;
    use crate::health::StaticProbe;
    use crate::invoker::{RetryPolicy, RetryingInvoker};
    use crate::naming::NameGenerator;
    use crate::orchestrator::{Components, Orchestrator};
    use crate::project::ProjectStore;
    use crate::session::SessionContext;
    use std::time::Duration;

    let projects = Arc::new(MemoryProjects::default());
    let store = ProjectStore::new(
        Arc::clone(&projects) as Arc<dyn ProjectBackend>,
        Duration::from_secs(300),
    );
    let sessions = SessionContext::new(
        Arc::new(MemorySessions::default()),
        Duration::from_secs(3600),
        10,
        Duration::from_secs(300),
    );

    let orchestrator = Orchestrator::new(Components {
        names: NameGenerator::new(store.clone(), None, 1000),
        store,
        sessions,
        invoker: RetryingInvoker::new(workers, RetryPolicy::default()),
        storage_retry: RetryPolicy::default(),
        health: Arc::new(StaticProbe::healthy()),
        chat: Arc::new(CannedChat),
    });

    (orchestrator, projects)
}
