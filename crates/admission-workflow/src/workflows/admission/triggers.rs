//! System-owned automatic transitions.
//!
//! Every trigger is a pure function of the application the engine just loaded under its
//! per-application lock. A trigger re-checks its own precondition, then runs the regular
//! validator as [`Actor::system`], so the authority matrix governs automatic moves exactly as
//! it governs manual ones. A trigger that does not match reports
//! [`TriggerResult::NotApplied`] and the engine writes nothing for it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{
    Actor, ActorRole, Application, ApplicationStatus, DocumentTag, Stage, StageStatus,
};
use super::store::DocumentQuery;
use super::validator::{TransitionValidator, ValidatedTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    ApplicationSubmitted,
    AllDocumentsUploaded,
    PartialDocumentsUploaded,
    Stage1FinalApproval,
    Stage1FinalRejection,
}

impl TriggerKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ApplicationSubmitted => "on_application_submitted",
            Self::AllDocumentsUploaded => "all_documents_uploaded",
            Self::PartialDocumentsUploaded => "partial_documents_uploaded",
            Self::Stage1FinalApproval => "on_stage1_final_approval",
            Self::Stage1FinalRejection => "on_stage1_final_rejection",
        }
    }

    pub const fn target(self) -> StageStatus {
        let status = match self {
            Self::ApplicationSubmitted => ApplicationStatus::NewApplication,
            Self::AllDocumentsUploaded => ApplicationStatus::DocumentsSubmitted,
            Self::PartialDocumentsUploaded => ApplicationStatus::DocumentsPartiallySubmitted,
            Self::Stage1FinalApproval => ApplicationStatus::ApprovedStage1,
            Self::Stage1FinalRejection => ApplicationStatus::RejectedStage1,
        };
        StageStatus::new(Stage::Intake, status)
    }

    /// Stage 1 statuses the trigger may fire from.
    pub const fn valid_from(self) -> &'static [ApplicationStatus] {
        use ApplicationStatus as S;
        match self {
            Self::ApplicationSubmitted => &[S::Draft],
            Self::AllDocumentsUploaded => &[
                S::NewApplication,
                S::CorrectionRequestedAdmin,
                S::DocumentsPartiallySubmitted,
                S::DocumentsResubmissionRequired,
            ],
            Self::PartialDocumentsUploaded => {
                &[S::CorrectionRequestedAdmin, S::DocumentsResubmissionRequired]
            }
            Self::Stage1FinalApproval => &[S::DocumentsApproved],
            Self::Stage1FinalRejection => &[
                S::NewApplication,
                S::UnderReviewAdmin,
                S::DocumentsUnderReview,
                S::DocumentsRejected,
            ],
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Domain events fed to the dispatcher by upstream producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum DomainEvent {
    ApplicationSubmitted,
    DocumentUploaded,
    Stage1Approved,
    Stage1Rejected { reason: String },
}

/// Outcome of evaluating a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerResult {
    Applied(AppliedTrigger),
    NotApplied {
        #[serde(skip_serializing_if = "Option::is_none")]
        trigger: Option<TriggerKind>,
        reason: String,
    },
}

impl TriggerResult {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    fn not_applied(trigger: Option<TriggerKind>, reason: impl Into<String>) -> Self {
        Self::NotApplied {
            trigger,
            reason: reason.into(),
        }
    }
}

/// A trigger that matched; the engine still has to commit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedTrigger {
    pub trigger: TriggerKind,
    pub previous: StageStatus,
    pub new: StageStatus,
    pub next_actor: ActorRole,
    pub triggered_by: String,
    #[serde(skip)]
    pub transition: ValidatedTransition,
}

/// How far an application's uploads cover its required document tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentCoverage {
    /// Every required tag has an approved or pending document (vacuous when none are required).
    Complete,
    Partial { missing: Vec<DocumentTag> },
    Nothing,
}

impl DocumentCoverage {
    pub fn assess(
        required: &BTreeSet<DocumentTag>,
        approved: &BTreeSet<DocumentTag>,
        pending: &BTreeSet<DocumentTag>,
    ) -> Self {
        let missing: Vec<DocumentTag> = required
            .iter()
            .filter(|tag| !approved.contains(*tag) && !pending.contains(*tag))
            .cloned()
            .collect();

        if missing.is_empty() {
            Self::Complete
        } else if approved.is_empty() && pending.is_empty() {
            Self::Nothing
        } else {
            Self::Partial { missing }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SystemTriggerDispatcher {
    validator: TransitionValidator,
}

impl SystemTriggerDispatcher {
    pub fn new(validator: TransitionValidator) -> Self {
        Self { validator }
    }

    /// Route a domain event to the trigger it names.
    pub fn dispatch(
        &self,
        application: &Application,
        event: &DomainEvent,
        triggered_by: &Actor,
        documents: &dyn DocumentQuery,
    ) -> TriggerResult {
        match event {
            DomainEvent::ApplicationSubmitted => self.fire(
                TriggerKind::ApplicationSubmitted,
                application,
                triggered_by,
                None,
                documents,
            ),
            DomainEvent::DocumentUploaded => {
                self.on_document_upload(application, triggered_by, documents)
            }
            DomainEvent::Stage1Approved => self.fire(
                TriggerKind::Stage1FinalApproval,
                application,
                triggered_by,
                None,
                documents,
            ),
            DomainEvent::Stage1Rejected { reason } => self.fire(
                TriggerKind::Stage1FinalRejection,
                application,
                triggered_by,
                Some(reason.as_str()),
                documents,
            ),
        }
    }

    /// Choose between the complete and partial upload triggers.
    pub fn on_document_upload(
        &self,
        application: &Application,
        triggered_by: &Actor,
        documents: &dyn DocumentQuery,
    ) -> TriggerResult {
        if application.is_held() {
            return TriggerResult::not_applied(None, "application is on hold");
        }

        let approved = documents.approved_document_types(&application.id);
        let pending = documents.pending_document_types(&application.id);
        match DocumentCoverage::assess(&application.documents_required, &approved, &pending) {
            DocumentCoverage::Complete => self.fire(
                TriggerKind::AllDocumentsUploaded,
                application,
                triggered_by,
                None,
                documents,
            ),
            DocumentCoverage::Partial { .. } => self.fire(
                TriggerKind::PartialDocumentsUploaded,
                application,
                triggered_by,
                None,
                documents,
            ),
            DocumentCoverage::Nothing => {
                TriggerResult::not_applied(None, "no documents on file for the application")
            }
        }
    }

    /// Evaluate one named trigger against `application`.
    pub fn fire(
        &self,
        trigger: TriggerKind,
        application: &Application,
        triggered_by: &Actor,
        reason: Option<&str>,
        documents: &dyn DocumentQuery,
    ) -> TriggerResult {
        let previous = application.key();
        if application.is_held() {
            return TriggerResult::not_applied(Some(trigger), "application is on hold");
        }
        if previous.stage != Stage::Intake || !trigger.valid_from().contains(&previous.status) {
            debug!(application_id = %application.id, %trigger, from = %previous, "trigger precondition not met");
            return TriggerResult::not_applied(
                Some(trigger),
                format!("{trigger} does not apply from {previous}"),
            );
        }

        let target = trigger.target();
        match self.validator.validate(
            application,
            target.status,
            &Actor::system(),
            reason,
            documents,
        ) {
            Ok(transition) => TriggerResult::Applied(AppliedTrigger {
                trigger,
                previous,
                new: transition.to,
                next_actor: transition.next_actor,
                triggered_by: triggered_by.id().to_string(),
                transition,
            }),
            Err(err) => {
                debug!(application_id = %application.id, %trigger, error = %err, "trigger rejected by validator");
                TriggerResult::not_applied(Some(trigger), err.to_string())
            }
        }
    }
}
