use std::sync::Arc;

use super::common::*;
use crate::workflows::admission::{
    ActorRole, ApplicationStatus as S, AuditRecorder, HoldController, Stage, TransitionError,
    TransitionValidator,
};

fn controller() -> HoldController {
    HoldController::new(
        TransitionValidator::new(matrix()),
        AuditRecorder::new(Arc::new(FixedClock::default())),
    )
}

#[test]
fn hold_then_resume_restores_previous_status() {
    let controller = controller();
    let application = application_at(Stage::Intake, S::DocumentsUnderReview);

    let held = controller
        .hold(&application, &admin(), Some("awaiting legal review"))
        .expect("admin can hold");
    assert_eq!(held.left, S::DocumentsUnderReview);
    let held = held.application;
    assert_eq!(held.status, S::OnHold);
    assert_eq!(held.stage, Stage::Intake);
    assert_eq!(held.previous_status, Some(S::DocumentsUnderReview));
    assert_eq!(held.hold_reason.as_deref(), Some("awaiting legal review"));
    assert_eq!(held.held_by.as_deref(), Some("admin-1"));
    assert!(held.held_at.is_some());
    assert_eq!(held.next_actor, ActorRole::Admin);

    let resumed = controller
        .resume(&held, &admin(), Some("legal cleared"))
        .expect("admin can resume");
    assert_eq!(resumed.left, S::OnHold);
    let resumed = resumed.application;
    assert_eq!(resumed.status, S::DocumentsUnderReview);
    assert_eq!(resumed.previous_status, None);
    assert_eq!(resumed.hold_reason, None);
    assert_eq!(resumed.resumed_by.as_deref(), Some("admin-1"));
    assert_eq!(resumed.resume_reason.as_deref(), Some("legal cleared"));
    assert_eq!(resumed.next_action, "Complete the document review");
    assert_eq!(resumed.stage_history.len(), 2);
    assert_eq!(resumed.stage_history[0].status, S::OnHold);
    assert_eq!(resumed.stage_history[1].status, S::DocumentsUnderReview);
}

#[test]
fn hold_requires_admin_and_reason() {
    let controller = controller();
    let application = application_at(Stage::Intake, S::DocumentsUnderReview);

    match controller.hold(&application, &partner(), Some("why not")) {
        Err(TransitionError::ActorMismatch { expected, actual }) => {
            assert_eq!(expected, ActorRole::Admin);
            assert_eq!(actual, ActorRole::Partner);
        }
        other => panic!("expected actor mismatch, got {other:?}"),
    }

    match controller.hold(&application, &admin(), Some("  ")) {
        Err(TransitionError::MissingReason(S::OnHold)) => {}
        other => panic!("expected missing reason, got {other:?}"),
    }

    controller
        .hold(&application, &partner().with_override(), Some("escalated"))
        .expect("override may hold");
}

#[test]
fn cannot_hold_twice_or_hold_terminal() {
    let controller = controller();

    match controller.hold(&held_at(S::NewApplication), &admin(), Some("again")) {
        Err(TransitionError::OnHold) => {}
        other => panic!("expected on hold, got {other:?}"),
    }

    let rejected = application_at(Stage::Intake, S::RejectedStage1);
    match controller.hold(&rejected, &admin(), Some("review")) {
        Err(TransitionError::AlreadyTerminal(S::RejectedStage1)) => {}
        other => panic!("expected already terminal, got {other:?}"),
    }
}

#[test]
fn resume_requires_hold() {
    let controller = controller();
    let application = application_at(Stage::Intake, S::NewApplication);

    match controller.resume(&application, &admin(), None) {
        Err(TransitionError::NotHeld(S::NewApplication)) => {}
        other => panic!("expected not held, got {other:?}"),
    }
}

#[test]
fn cancel_records_reason_and_actor() {
    let controller = controller();
    let application = application_at(Stage::Offer, S::ConditionalOffer);

    let change = controller
        .cancel(&application, &partner(), Some("student withdrew"))
        .expect("partner can cancel");
    let cancelled = change.application;

    assert_eq!(change.left, S::ConditionalOffer);
    assert_eq!(cancelled.status, S::Cancelled);
    assert_eq!(cancelled.stage, Stage::Offer);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("student withdrew"));
    assert_eq!(cancelled.cancelled_by.as_deref(), Some("partner-7"));
    assert_eq!(
        cancelled.stage_history.last().map(|entry| entry.status),
        Some(S::Cancelled)
    );
}

#[test]
fn cancel_from_hold_is_allowed() {
    let controller = controller();
    let held = held_at(S::DocumentsUnderReview);

    let change = controller
        .cancel(&held, &admin(), Some("duplicate application"))
        .expect("held applications can be cancelled");
    assert_eq!(change.left, S::OnHold);
    assert_eq!(change.application.status, S::Cancelled);
}

#[test]
fn cancel_guards() {
    let controller = controller();

    let enrolled = application_at(Stage::Enrollment, S::Enrolled);
    match controller.cancel(&enrolled, &admin(), Some("late")) {
        Err(TransitionError::NotCancellable(S::Enrolled)) => {}
        other => panic!("expected not cancellable, got {other:?}"),
    }

    let declined = application_at(Stage::Offer, S::OfferDeclined);
    match controller.cancel(&declined, &admin(), Some("cleanup")) {
        Err(TransitionError::AlreadyTerminal(S::OfferDeclined)) => {}
        other => panic!("expected already terminal, got {other:?}"),
    }

    let mut cancelled = application_at(Stage::Offer, S::ConditionalOffer);
    cancelled.status = S::Cancelled;
    match controller.cancel(&cancelled, &admin(), Some("again")) {
        Err(TransitionError::AlreadyTerminal(S::Cancelled)) => {}
        other => panic!("expected already terminal, got {other:?}"),
    }

    let open = application_at(Stage::Offer, S::ConditionalOffer);
    match controller.cancel(&open, &university(), Some("no seats")) {
        Err(TransitionError::ActorMismatch { .. }) => {}
        other => panic!("expected actor mismatch, got {other:?}"),
    }
    match controller.cancel(&open, &admin(), None) {
        Err(TransitionError::MissingReason(S::Cancelled)) => {}
        other => panic!("expected missing reason, got {other:?}"),
    }
}
