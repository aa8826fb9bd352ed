use super::audit::AuditRecorder;
use super::domain::{Actor, ActorRole, Application, ApplicationStatus};
use super::validator::{normalize_reason, TransitionError, TransitionValidator};

/// Result of a hold, resume or cancel: the updated working copy plus the status it left.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlChange {
    pub application: Application,
    pub left: ApplicationStatus,
}

/// Override layer that can suspend, restore or terminally cancel any non-terminal application.
///
/// Works on copies only; the engine decides whether the change is committed.
#[derive(Clone)]
pub struct HoldController {
    validator: TransitionValidator,
    recorder: AuditRecorder,
}

impl HoldController {
    pub fn new(validator: TransitionValidator, recorder: AuditRecorder) -> Self {
        Self {
            validator,
            recorder,
        }
    }

    pub fn hold(
        &self,
        application: &Application,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<ControlChange, TransitionError> {
        if application.is_cancelled() {
            return Err(TransitionError::AlreadyTerminal(application.status));
        }
        if application.is_held() {
            return Err(TransitionError::OnHold);
        }
        let entry = self.validator.entry(application.key())?;
        if entry.terminal {
            return Err(TransitionError::AlreadyTerminal(application.status));
        }
        require_role(actor, &[ActorRole::Admin])?;
        let reason = normalize_reason(reason)
            .ok_or(TransitionError::MissingReason(ApplicationStatus::OnHold))?;

        let mut next = application.clone();
        let entry = self.recorder.record(
            application,
            application.stage,
            ApplicationStatus::OnHold,
            actor,
            Some(reason.as_str()),
        );

        next.previous_status = Some(application.status);
        next.status = ApplicationStatus::OnHold;
        next.held_by = Some(actor.id().to_string());
        next.held_at = Some(entry.timestamp);
        next.hold_reason = Some(reason.clone());
        next.next_actor = ActorRole::Admin;
        next.next_action = format!("Resolve hold: {reason}");
        next.stage_history.push(entry);

        Ok(ControlChange {
            application: next,
            left: application.status,
        })
    }

    pub fn resume(
        &self,
        application: &Application,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<ControlChange, TransitionError> {
        if !application.is_held() {
            return Err(TransitionError::NotHeld(application.status));
        }
        require_role(actor, &[ActorRole::Admin])?;

        let restored = application
            .previous_status
            .ok_or(TransitionError::UnknownState(application.key()))?;
        let mut next = application.clone();
        next.status = restored;
        let target = self.validator.entry(next.key())?;
        let reason = normalize_reason(reason);
        let entry = self
            .recorder
            .record(application, application.stage, restored, actor, reason.as_deref());

        next.next_actor = target.next_actor;
        next.next_action = target.action.clone();
        next.previous_status = None;
        next.held_by = None;
        next.held_at = None;
        next.hold_reason = None;
        next.resumed_by = Some(actor.id().to_string());
        next.resumed_at = Some(entry.timestamp);
        next.resume_reason = reason;
        next.stage_history.push(entry);

        Ok(ControlChange {
            application: next,
            left: ApplicationStatus::OnHold,
        })
    }

    pub fn cancel(
        &self,
        application: &Application,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<ControlChange, TransitionError> {
        if application.is_cancelled() {
            return Err(TransitionError::AlreadyTerminal(application.status));
        }
        let effective = if application.is_held() {
            application
                .previous_status
                .ok_or(TransitionError::UnknownState(application.key()))?
        } else {
            application.status
        };
        let mut key = application.key();
        key.status = effective;
        let entry = self.validator.entry(key)?;
        if entry.terminal {
            return Err(TransitionError::AlreadyTerminal(effective));
        }
        if !entry.cancellable {
            return Err(TransitionError::NotCancellable(effective));
        }
        require_role(actor, &[ActorRole::Admin, ActorRole::Partner])?;
        let reason = normalize_reason(reason)
            .ok_or(TransitionError::MissingReason(ApplicationStatus::Cancelled))?;

        let mut next = application.clone();
        let entry = self.recorder.record(
            application,
            application.stage,
            ApplicationStatus::Cancelled,
            actor,
            Some(reason.as_str()),
        );

        next.status = ApplicationStatus::Cancelled;
        next.cancelled_by = Some(actor.id().to_string());
        next.cancelled_at = Some(entry.timestamp);
        next.cancel_reason = Some(reason);
        next.next_actor = ActorRole::Admin;
        next.next_action = "No further action: application cancelled".to_string();
        next.stage_history.push(entry);

        Ok(ControlChange {
            application: next,
            left: application.status,
        })
    }
}

fn require_role(actor: &Actor, allowed: &[ActorRole]) -> Result<(), TransitionError> {
    if actor.can_override() || allowed.contains(&actor.role()) {
        return Ok(());
    }
    Err(TransitionError::ActorMismatch {
        expected: allowed.first().copied().unwrap_or(ActorRole::Admin),
        actual: actor.role(),
    })
}
