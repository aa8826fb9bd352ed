//! Admission application workflow: authority matrix, validation, system triggers, hold/cancel
//! overrides and the engine that commits them.

pub mod audit;
pub mod domain;
pub mod engine;
pub mod hold;
pub mod matrix;
pub mod router;
pub mod store;
pub mod triggers;
pub mod validator;

#[cfg(test)]
mod tests;

pub use audit::{AuditRecorder, Clock, SystemClock};
pub use domain::{
    Actor, ActorRole, Application, ApplicationId, ApplicationStatus, DocumentTag, NewApplication,
    Stage, StageHistoryEntry, StageStatus, UnknownStatus,
};
pub use engine::{DispatchOutcome, TransitionOutcome, WorkflowEngine, WorkflowError};
pub use hold::{ControlChange, HoldController};
pub use matrix::{
    AuthorityMatrix, DocumentRequirement, MatrixEntry, MatrixError, ProvenanceStamp,
    TransitionRule,
};
pub use router::admission_router;
pub use store::{
    ApplicationStore, DocumentQuery, NoopPublisher, NoticeError, NoticeOrigin, NoticePublisher,
    StoreError, WorkflowNotice,
};
pub use triggers::{
    AppliedTrigger, DocumentCoverage, DomainEvent, SystemTriggerDispatcher, TriggerKind,
    TriggerResult,
};
pub use validator::{TransitionError, TransitionValidator, ValidatedTransition};
