use super::common::*;
use crate::workflows::admission::{
    Actor, ActorRole, ApplicationStatus as S, DocumentTag, Stage, StageStatus, TransitionError,
    TransitionValidator,
};

fn validator() -> TransitionValidator {
    TransitionValidator::new(matrix())
}

#[test]
fn accepts_matrix_edge_for_responsible_actor() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Intake, S::NewApplication);

    let transition = validator()
        .validate(&application, S::UnderReviewAdmin, &admin(), None, &documents)
        .expect("admin may start review");

    assert_eq!(transition.from, application.key());
    assert_eq!(
        transition.to,
        StageStatus::new(Stage::Intake, S::UnderReviewAdmin)
    );
    assert_eq!(transition.next_actor, ActorRole::Admin);
    assert_eq!(transition.next_action, "Complete the admin review");
}

#[test]
fn unknown_state_is_reported_before_anything_else() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Visa, S::NewApplication);

    match validator().validate(&application, S::UnderReviewAdmin, &admin(), None, &documents) {
        Err(TransitionError::UnknownState(key)) => {
            assert_eq!(key, StageStatus::new(Stage::Visa, S::NewApplication));
        }
        other => panic!("expected unknown state, got {other:?}"),
    }
}

#[test]
fn status_from_another_stage_is_illegal() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Intake, S::NewApplication);

    match validator().validate(&application, S::VisaGranted, &admin(), None, &documents) {
        Err(TransitionError::IllegalTransition { from, to }) => {
            assert_eq!(from, application.key());
            assert_eq!(to, S::VisaGranted);
        }
        other => panic!("expected illegal transition, got {other:?}"),
    }
}

#[test]
fn terminal_entries_report_already_terminal() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Intake, S::RejectedStage1);

    match validator().validate(&application, S::NewApplication, &admin(), None, &documents) {
        Err(TransitionError::AlreadyTerminal(status)) => assert_eq!(status, S::RejectedStage1),
        other => panic!("expected already terminal, got {other:?}"),
    }
}

#[test]
fn wrong_actor_is_rejected_unless_overriding() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::UniversitySubmission, S::SubmittedToUniversity);

    match validator().validate(&application, S::UnderUniversityReview, &partner(), None, &documents)
    {
        Err(TransitionError::ActorMismatch { expected, actual }) => {
            assert_eq!(expected, ActorRole::University);
            assert_eq!(actual, ActorRole::Partner);
        }
        other => panic!("expected actor mismatch, got {other:?}"),
    }

    let overriding = admin().with_override();
    validator()
        .validate(&application, S::UnderUniversityReview, &overriding, None, &documents)
        .expect("override may act for the university");
    validator()
        .validate(&application, S::UnderUniversityReview, &university(), None, &documents)
        .expect("university acts on its own state");
}

#[test]
fn per_edge_actor_overrides_entry_actor() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Intake, S::DocumentsApproved);

    match validator().validate(&application, S::ApprovedStage1, &admin(), None, &documents) {
        Err(TransitionError::ActorMismatch { expected, .. }) => {
            assert_eq!(expected, ActorRole::System)
        }
        other => panic!("expected actor mismatch, got {other:?}"),
    }
    validator()
        .validate(&application, S::ApprovedStage1, &Actor::system(), None, &documents)
        .expect("system finalises approval");
}

#[test]
fn upload_statuses_are_reserved_for_system() {
    let documents = MemoryDocuments::default();
    let cases = [
        (S::NewApplication, S::DocumentsSubmitted, admin()),
        (S::CorrectionRequestedAdmin, S::DocumentsSubmitted, partner()),
        (S::CorrectionRequestedAdmin, S::DocumentsPartiallySubmitted, partner()),
        (S::DocumentsPartiallySubmitted, S::DocumentsSubmitted, partner()),
        (S::DocumentsResubmissionRequired, S::DocumentsSubmitted, partner()),
        (S::DocumentsResubmissionRequired, S::DocumentsPartiallySubmitted, partner()),
    ];

    for (from, to, actor) in cases {
        let application = application_at(Stage::Intake, from);
        match validator().validate(&application, to, &actor, None, &documents) {
            Err(TransitionError::ActorMismatch { expected, actual }) => {
                assert_eq!(expected, ActorRole::System);
                assert_eq!(actual, actor.role());
            }
            other => panic!("expected actor mismatch for {from} -> {to}, got {other:?}"),
        }
        validator()
            .validate(&application, to, &Actor::system(), None, &documents)
            .unwrap_or_else(|err| panic!("system may move {from} -> {to}: {err}"));
    }
}

#[test]
fn rejection_edges_require_a_reason() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Intake, S::NewApplication);

    for reason in [None, Some(""), Some("   ")] {
        match validator().validate(&application, S::RejectedStage1, &admin(), reason, &documents) {
            Err(TransitionError::MissingReason(status)) => assert_eq!(status, S::RejectedStage1),
            other => panic!("expected missing reason for {reason:?}, got {other:?}"),
        }
    }

    let transition = validator()
        .validate(
            &application,
            S::RejectedStage1,
            &admin(),
            Some("  incomplete profile "),
            &documents,
        )
        .expect("reasoned rejection");
    assert_eq!(transition.reason.as_deref(), Some("incomplete profile"));
}

#[test]
fn document_approval_needs_every_required_tag_approved() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Intake, S::DocumentsSubmitted);
    documents.upload(&application.id, &REQUIRED);
    documents.approve(&application.id, &["passport", "english_test"]);

    match validator().validate(&application, S::DocumentsApproved, &admin(), None, &documents) {
        Err(TransitionError::DocumentsIncomplete { missing }) => {
            assert_eq!(
                missing,
                vec![
                    DocumentTag::new("academic_transcript"),
                    DocumentTag::new("statement_of_purpose"),
                ]
            );
        }
        other => panic!("expected incomplete documents, got {other:?}"),
    }

    documents.approve(&application.id, &["academic_transcript", "statement_of_purpose"]);
    validator()
        .validate(&application, S::DocumentsApproved, &admin(), None, &documents)
        .expect("all documents approved");
}

#[test]
fn empty_requirement_set_is_vacuously_complete() {
    let documents = MemoryDocuments::default();
    let mut application = application_at(Stage::Intake, S::DocumentsSubmitted);
    application.documents_required.clear();

    validator()
        .validate(&application, S::DocumentsApproved, &admin(), None, &documents)
        .expect("nothing required");
}

#[test]
fn visa_lodgement_checks_edge_specific_documents() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::Offer, S::OfferAccepted);
    documents.approve(&application.id, &["offer_letter"]);

    match validator().validate(&application, S::VisaLodged, &admin(), None, &documents) {
        Err(TransitionError::DocumentsIncomplete { missing }) => {
            assert_eq!(missing, vec![DocumentTag::new("financial_evidence")]);
        }
        other => panic!("expected incomplete documents, got {other:?}"),
    }
}

#[test]
fn held_and_cancelled_applications_are_blocked() {
    let documents = MemoryDocuments::default();
    let held = held_at(S::DocumentsUnderReview);
    match validator().validate(&held, S::DocumentsApproved, &admin(), None, &documents) {
        Err(TransitionError::OnHold) => {}
        other => panic!("expected on hold, got {other:?}"),
    }

    let mut cancelled = application_at(Stage::Intake, S::NewApplication);
    cancelled.status = S::Cancelled;
    match validator().validate(&cancelled, S::UnderReviewAdmin, &admin(), None, &documents) {
        Err(TransitionError::AlreadyTerminal(S::Cancelled)) => {}
        other => panic!("expected already terminal, got {other:?}"),
    }
}

#[test]
fn rollback_to_stage_one_requires_reason() {
    let documents = MemoryDocuments::default();
    let application = application_at(Stage::UniversitySubmission, S::RejectedUniversity);

    let transition = validator()
        .validate(
            &application,
            S::ApprovedStage1,
            &admin(),
            Some("apply to another university"),
            &documents,
        )
        .expect("rollback allowed");
    assert_eq!(transition.to, StageStatus::new(Stage::Intake, S::ApprovedStage1));
}
