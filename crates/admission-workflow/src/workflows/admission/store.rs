use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::domain::{ActorRole, Application, ApplicationId, DocumentTag, StageStatus};
use super::triggers::TriggerKind;

/// Persistence contract for application aggregates.
///
/// Implementations must offer read-after-write consistency for a single id and must treat
/// `put` as one atomic write of the whole record, history included.
pub trait ApplicationStore: Send + Sync {
    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;

    /// Persist `application`. A record whose `version` is not exactly one past the stored
    /// version (or zero-to-one for new records) must be refused with [`StoreError::Conflict`].
    fn put(&self, application: Application) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict: expected stored version {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },
    #[error("application store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of an application's uploaded documents.
pub trait DocumentQuery: Send + Sync {
    fn approved_document_types(&self, id: &ApplicationId) -> BTreeSet<DocumentTag>;
    fn pending_document_types(&self, id: &ApplicationId) -> BTreeSet<DocumentTag>;
}

/// Observer hook replacing ambient UI events; called once per committed change.
pub trait NoticePublisher: Send + Sync {
    fn publish(&self, notice: &WorkflowNotice) -> Result<(), NoticeError>;
}

/// What caused a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "trigger")]
pub enum NoticeOrigin {
    Manual,
    SystemTrigger(TriggerKind),
    Hold,
    Resume,
    Cancel,
}

/// Change description handed to observers and returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNotice {
    pub application_id: ApplicationId,
    pub origin: NoticeOrigin,
    pub from: StageStatus,
    pub to: StageStatus,
    pub actor: ActorRole,
    pub next_actor: ActorRole,
    pub next_action: String,
    pub recipients: Vec<ActorRole>,
}

/// Notice dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NoticeError {
    #[error("notice transport unavailable: {0}")]
    Transport(String),
}

/// Publisher that drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl NoticePublisher for NoopPublisher {
    fn publish(&self, _notice: &WorkflowNotice) -> Result<(), NoticeError> {
        Ok(())
    }
}
