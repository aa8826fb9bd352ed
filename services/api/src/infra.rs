use admission_workflow::workflows::admission::{
    Application, ApplicationId, ApplicationStore, AuthorityMatrix, DocumentQuery, DocumentTag,
    MatrixError, NoticeError, NoticePublisher, StoreError, WorkflowNotice,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) documents: Arc<InMemoryDocumentRegistry>,
}

/// Built-in table unless a JSON file is given.
pub(crate) fn load_matrix(path: Option<&Path>) -> Result<AuthorityMatrix, MatrixError> {
    match path {
        Some(path) => AuthorityMatrix::from_path(path),
        None => AuthorityMatrix::standard(),
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationStore {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationStore for InMemoryApplicationStore {
    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    fn put(&self, application: Application) -> Result<(), StoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))?;
        let stored = guard
            .get(&application.id)
            .map_or(0, |current| current.version);
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

/// Upload registry standing in for the document service.
#[derive(Default)]
pub(crate) struct InMemoryDocumentRegistry {
    approved: Mutex<HashMap<ApplicationId, BTreeSet<DocumentTag>>>,
    pending: Mutex<HashMap<ApplicationId, BTreeSet<DocumentTag>>>,
}

impl InMemoryDocumentRegistry {
    pub(crate) fn upload(&self, id: &ApplicationId, tag: DocumentTag) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.entry(id.clone()).or_default().insert(tag);
    }

    pub(crate) fn approve(&self, id: &ApplicationId, tag: DocumentTag) {
        if let Some(waiting) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
        {
            waiting.remove(&tag);
        }
        let mut approved = self.approved.lock().unwrap_or_else(PoisonError::into_inner);
        approved.entry(id.clone()).or_default().insert(tag);
    }
}

// Tag sets are plain values, so a panic mid-insert cannot leave them half-written.
impl DocumentQuery for InMemoryDocumentRegistry {
    fn approved_document_types(&self, id: &ApplicationId) -> BTreeSet<DocumentTag> {
        let guard = self.approved.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(id).cloned().unwrap_or_default()
    }

    fn pending_document_types(&self, id: &ApplicationId) -> BTreeSet<DocumentTag> {
        let guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(id).cloned().unwrap_or_default()
    }
}

/// Writes every committed change to the log.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TracingPublisher;

impl NoticePublisher for TracingPublisher {
    fn publish(&self, notice: &WorkflowNotice) -> Result<(), NoticeError> {
        let recipients: Vec<&str> = notice.recipients.iter().map(|role| role.label()).collect();
        info!(
            application_id = %notice.application_id,
            origin = ?notice.origin,
            from = %notice.from,
            to = %notice.to,
            next_actor = %notice.next_actor,
            recipients = ?recipients,
            "workflow notice"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_refuses_stale_versions() {
        let store = InMemoryApplicationStore::default();
        let mut application = Application::draft(ApplicationId("app-1".into()), BTreeSet::new());
        application.version = 1;
        store.put(application.clone()).expect("first write");

        match store.put(application) {
            Err(StoreError::Conflict { expected, found }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn approval_moves_tag_out_of_pending() {
        let registry = InMemoryDocumentRegistry::default();
        let id = ApplicationId("app-1".into());
        registry.upload(&id, DocumentTag::new("passport"));
        registry.approve(&id, DocumentTag::new("passport"));

        assert!(registry.pending_document_types(&id).is_empty());
        assert!(registry
            .approved_document_types(&id)
            .contains(&DocumentTag::new("passport")));
    }
}
