use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use super::domain::{
    Actor, ActorRole, Application, ApplicationStatus, DocumentTag, StageStatus,
};
use super::matrix::{AuthorityMatrix, DocumentRequirement, MatrixEntry, ProvenanceStamp};
use super::store::DocumentQuery;

/// Recoverable validation failures. None of them leaves a write behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("no authority matrix entry for {0}")]
    UnknownState(StageStatus),
    #[error("cannot move from {from} to {to}")]
    IllegalTransition {
        from: StageStatus,
        to: ApplicationStatus,
    },
    #[error("{actual} may not perform this transition; {expected} is responsible")]
    ActorMismatch {
        expected: ActorRole,
        actual: ActorRole,
    },
    #[error("a reason is required to move to {0}")]
    MissingReason(ApplicationStatus),
    #[error("required documents are not approved: {missing:?}")]
    DocumentsIncomplete { missing: Vec<DocumentTag> },
    #[error("application is in terminal status {0}")]
    AlreadyTerminal(ApplicationStatus),
    #[error("application is on hold; only resume or cancel are allowed")]
    OnHold,
    #[error("application is not on hold (status {0})")]
    NotHeld(ApplicationStatus),
    #[error("application in status {0} can no longer be cancelled")]
    NotCancellable(ApplicationStatus),
}

/// Accepted transition plus the fields the orchestrator writes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedTransition {
    pub from: StageStatus,
    pub to: StageStatus,
    pub next_actor: ActorRole,
    pub next_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub recipients: Vec<ActorRole>,
    #[serde(skip)]
    pub stamps: Option<ProvenanceStamp>,
}

/// Side-effect free gate consulted by manual transitions, triggers and UI pre-flight checks.
#[derive(Debug, Clone)]
pub struct TransitionValidator {
    matrix: Arc<AuthorityMatrix>,
}

impl TransitionValidator {
    pub fn new(matrix: Arc<AuthorityMatrix>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &AuthorityMatrix {
        &self.matrix
    }

    pub fn entry(&self, key: StageStatus) -> Result<&MatrixEntry, TransitionError> {
        self.matrix
            .entry(key)
            .ok_or(TransitionError::UnknownState(key))
    }

    pub fn validate(
        &self,
        application: &Application,
        requested: ApplicationStatus,
        actor: &Actor,
        reason: Option<&str>,
        documents: &dyn DocumentQuery,
    ) -> Result<ValidatedTransition, TransitionError> {
        if application.is_cancelled() {
            return Err(TransitionError::AlreadyTerminal(application.status));
        }
        if application.is_held() {
            return Err(TransitionError::OnHold);
        }

        let from = application.key();
        let entry = self.entry(from)?;

        let rule = match entry.edge(requested) {
            Some(rule) => rule,
            None if entry.terminal => {
                return Err(TransitionError::AlreadyTerminal(application.status))
            }
            None => {
                return Err(TransitionError::IllegalTransition {
                    from,
                    to: requested,
                })
            }
        };

        let expected = entry.authorized_actor(rule);
        if expected != actor.role() && !actor.can_override() {
            return Err(TransitionError::ActorMismatch {
                expected,
                actual: actor.role(),
            });
        }

        let reason = normalize_reason(reason);
        if rule.requires_reason && reason.is_none() {
            return Err(TransitionError::MissingReason(requested));
        }

        let missing = missing_documents(application, &rule.documents, documents);
        if !missing.is_empty() {
            return Err(TransitionError::DocumentsIncomplete { missing });
        }

        let target = self.entry(rule.to)?;
        Ok(ValidatedTransition {
            from,
            to: rule.to,
            next_actor: target.next_actor,
            next_action: target.action.clone(),
            reason,
            recipients: target.notify.clone(),
            stamps: target.stamps,
        })
    }
}

pub(crate) fn normalize_reason(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string)
}

fn missing_documents(
    application: &Application,
    requirement: &DocumentRequirement,
    documents: &dyn DocumentQuery,
) -> Vec<DocumentTag> {
    let required: &BTreeSet<DocumentTag> = match requirement {
        DocumentRequirement::None => return Vec::new(),
        DocumentRequirement::Application => &application.documents_required,
        DocumentRequirement::Tags(tags) => tags,
    };
    if required.is_empty() {
        return Vec::new();
    }

    let approved = documents.approved_document_types(&application.id);
    required.difference(&approved).cloned().collect()
}
