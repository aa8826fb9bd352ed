use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::admission::audit::Clock;
use crate::workflows::admission::{
    Actor, ActorRole, Application, ApplicationId, ApplicationStatus, ApplicationStore,
    AuthorityMatrix, DocumentQuery, DocumentTag, NewApplication, NoticeError, NoticePublisher,
    Stage, StoreError, WorkflowEngine, WorkflowNotice,
};

pub(super) const REQUIRED: [&str; 4] = [
    "passport",
    "academic_transcript",
    "english_test",
    "statement_of_purpose",
];

pub(super) fn required_documents() -> BTreeSet<DocumentTag> {
    REQUIRED.into_iter().map(DocumentTag::new).collect()
}

pub(super) fn matrix() -> Arc<AuthorityMatrix> {
    Arc::new(AuthorityMatrix::standard().expect("standard matrix is valid"))
}

pub(super) fn admin() -> Actor {
    Actor::verified(ActorRole::Admin, "admin-1")
}

pub(super) fn partner() -> Actor {
    Actor::verified(ActorRole::Partner, "partner-7")
}

pub(super) fn university() -> Actor {
    Actor::verified(ActorRole::University, "uni-registrar")
}

pub(super) fn application_id() -> ApplicationId {
    ApplicationId("app-000001".to_string())
}

pub(super) fn submission() -> NewApplication {
    NewApplication {
        id: application_id(),
        documents_required: Some(required_documents()),
    }
}

/// Application already sitting at `(stage, status)` with version 1.
pub(super) fn application_at(stage: Stage, status: ApplicationStatus) -> Application {
    let mut application = Application::draft(application_id(), required_documents());
    application.stage = stage;
    application.status = status;
    application.version = 1;
    application
}

pub(super) fn held_at(status: ApplicationStatus) -> Application {
    let mut application = application_at(Stage::Intake, status);
    application.previous_status = Some(status);
    application.status = ApplicationStatus::OnHold;
    application.hold_reason = Some("awaiting legal review".to_string());
    application
}

pub(super) type Engine = WorkflowEngine<MemoryStore, MemoryDocuments>;

pub(super) fn build_engine() -> (Engine, Arc<MemoryStore>, Arc<MemoryDocuments>) {
    let store = Arc::new(MemoryStore::default());
    let documents = Arc::new(MemoryDocuments::default());
    let engine = WorkflowEngine::with_clock(
        store.clone(),
        documents.clone(),
        matrix(),
        Arc::new(FixedClock::default()),
    )
    .with_required_documents(required_documents());
    (engine, store, documents)
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl MemoryStore {
    pub(super) fn seed(&self, application: Application) {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .insert(application.id.clone(), application);
    }

    pub(super) fn stored(&self, id: &ApplicationId) -> Application {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned()
            .expect("application stored")
    }
}

impl ApplicationStore for MemoryStore {
    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn put(&self, application: Application) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let stored = guard.get(&application.id).map_or(0, |current| current.version);
        if application.version != stored + 1 {
            return Err(StoreError::Conflict {
                expected: stored + 1,
                found: application.version,
            });
        }
        guard.insert(application.id.clone(), application);
        Ok(())
    }
}

/// Reads succeed from a fixed snapshot; every write fails.
pub(super) struct ReadOnlyStore {
    pub(super) snapshot: Application,
}

impl ApplicationStore for ReadOnlyStore {
    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        Ok((self.snapshot.id == *id).then(|| self.snapshot.clone()))
    }

    fn put(&self, _application: Application) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryDocuments {
    approved: Mutex<HashMap<ApplicationId, BTreeSet<DocumentTag>>>,
    pending: Mutex<HashMap<ApplicationId, BTreeSet<DocumentTag>>>,
}

impl MemoryDocuments {
    pub(super) fn upload(&self, id: &ApplicationId, tags: &[&str]) {
        let mut pending = self.pending.lock().expect("documents mutex poisoned");
        let entry = pending.entry(id.clone()).or_default();
        entry.extend(tags.iter().map(DocumentTag::new));
    }

    pub(super) fn approve(&self, id: &ApplicationId, tags: &[&str]) {
        let mut pending = self.pending.lock().expect("documents mutex poisoned");
        let mut approved = self.approved.lock().expect("documents mutex poisoned");
        let approved = approved.entry(id.clone()).or_default();
        for tag in tags.iter().map(DocumentTag::new) {
            if let Some(waiting) = pending.get_mut(id) {
                waiting.remove(&tag);
            }
            approved.insert(tag);
        }
    }
}

impl DocumentQuery for MemoryDocuments {
    fn approved_document_types(&self, id: &ApplicationId) -> BTreeSet<DocumentTag> {
        let guard = self.approved.lock().expect("documents mutex poisoned");
        guard.get(id).cloned().unwrap_or_default()
    }

    fn pending_document_types(&self, id: &ApplicationId) -> BTreeSet<DocumentTag> {
        let guard = self.pending.lock().expect("documents mutex poisoned");
        guard.get(id).cloned().unwrap_or_default()
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingPublisher {
    notices: Arc<Mutex<Vec<WorkflowNotice>>>,
}

impl RecordingPublisher {
    pub(super) fn notices(&self) -> Vec<WorkflowNotice> {
        self.notices.lock().expect("publisher mutex poisoned").clone()
    }
}

impl NoticePublisher for RecordingPublisher {
    fn publish(&self, notice: &WorkflowNotice) -> Result<(), NoticeError> {
        self.notices
            .lock()
            .expect("publisher mutex poisoned")
            .push(notice.clone());
        Ok(())
    }
}

pub(super) struct FailingPublisher;

impl NoticePublisher for FailingPublisher {
    fn publish(&self, _notice: &WorkflowNotice) -> Result<(), NoticeError> {
        Err(NoticeError::Transport("smtp relay offline".to_string()))
    }
}

/// Clock that advances one minute per reading, or stays put when frozen.
pub(super) struct FixedClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl FixedClock {
    pub(super) fn frozen_at(at: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(at),
            step: Duration::zero(),
        }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self {
            current: Mutex::new(start_time()),
            step: Duration::minutes(1),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.current.lock().expect("clock mutex poisoned");
        let now = *current;
        *current = now + self.step;
        now
    }
}

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
