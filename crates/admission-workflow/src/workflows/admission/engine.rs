use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::audit::{AuditRecorder, Clock, SystemClock};
use super::domain::{
    Actor, ActorRole, Application, ApplicationId, ApplicationStatus, DocumentTag, NewApplication,
    StageStatus,
};
use super::hold::{ControlChange, HoldController};
use super::matrix::{AuthorityMatrix, ProvenanceStamp};
use super::store::{
    ApplicationStore, DocumentQuery, NoticeOrigin, NoticePublisher, StoreError, WorkflowNotice,
};
use super::triggers::{AppliedTrigger, DomainEvent, SystemTriggerDispatcher, TriggerResult};
use super::validator::{TransitionError, TransitionValidator, ValidatedTransition};

/// Automatic moves chained after a committed manual transition. One hop covers
/// `documents_approved -> approved_stage1`; a longer chain would be a matrix bug.
const MAX_FOLLOW_ON_HOPS: usize = 1;

/// Orchestrator composing the validator, trigger dispatcher, hold controller and audit recorder
/// over an application store.
///
/// Every entry point runs under a per-application lock, validates before writing, and persists
/// the primary transition together with any follow-on trigger in a single `put`.
pub struct WorkflowEngine<S, D> {
    store: Arc<S>,
    documents: Arc<D>,
    validator: TransitionValidator,
    dispatcher: SystemTriggerDispatcher,
    controller: HoldController,
    recorder: AuditRecorder,
    publishers: Vec<Arc<dyn NoticePublisher>>,
    default_documents: BTreeSet<DocumentTag>,
    locks: ApplicationLocks,
}

impl<S, D> WorkflowEngine<S, D>
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    pub fn new(store: Arc<S>, documents: Arc<D>, matrix: Arc<AuthorityMatrix>) -> Self {
        Self::with_clock(store, documents, matrix, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        documents: Arc<D>,
        matrix: Arc<AuthorityMatrix>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let validator = TransitionValidator::new(matrix);
        let recorder = AuditRecorder::new(clock);
        Self {
            store,
            documents,
            dispatcher: SystemTriggerDispatcher::new(validator.clone()),
            controller: HoldController::new(validator.clone(), recorder.clone()),
            validator,
            recorder,
            publishers: Vec::new(),
            default_documents: BTreeSet::new(),
            locks: ApplicationLocks::default(),
        }
    }

    /// Register an observer for committed changes.
    pub fn with_publisher(mut self, publisher: Arc<dyn NoticePublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Document tags applied to submissions that do not name their own.
    pub fn with_required_documents(
        mut self,
        documents: impl IntoIterator<Item = DocumentTag>,
    ) -> Self {
        self.default_documents = documents.into_iter().collect();
        self
    }

    pub fn matrix(&self) -> &AuthorityMatrix {
        self.validator.matrix()
    }

    /// Applications with a caller currently inside the engine.
    pub fn active_applications(&self) -> usize {
        self.locks.len()
    }

    /// Fetch the current record.
    pub fn get(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.load(id)
    }

    /// Pre-flight check used by UIs; never writes.
    pub fn can_transition(
        &self,
        id: &ApplicationId,
        requested: ApplicationStatus,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<ValidatedTransition, WorkflowError> {
        let current = self.load(id)?;
        let transition = self.validator.validate(
            &current,
            requested,
            actor,
            reason,
            self.documents.as_ref(),
        )?;
        Ok(transition)
    }

    /// Open (or re-submit) an application through the submission trigger.
    ///
    /// A missing record is created as a draft and moved to `new_application` in the same write.
    /// Submitting an id that already left draft reports the trigger as not applied.
    pub fn submit(
        &self,
        submission: NewApplication,
        submitted_by: &Actor,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let id = submission.id.clone();
        self.locks
            .with(&id, || self.submit_locked(submission, submitted_by))
    }

    fn submit_locked(
        &self,
        submission: NewApplication,
        submitted_by: &Actor,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let current = match self.store.get(&submission.id)? {
            Some(existing) => existing,
            None => {
                let required = submission
                    .documents_required
                    .unwrap_or_else(|| self.default_documents.clone());
                Application::draft(submission.id, required)
            }
        };

        let result = self.dispatcher.dispatch(
            &current,
            &DomainEvent::ApplicationSubmitted,
            submitted_by,
            self.documents.as_ref(),
        );
        match &result {
            TriggerResult::Applied(applied) => {
                let outcome = self.commit_trigger(&current, applied, submitted_by)?;
                Ok(DispatchOutcome {
                    result,
                    committed: Some(outcome),
                })
            }
            TriggerResult::NotApplied { reason, .. } if current.version == 0 => {
                warn!(application_id = %current.id, %reason, "submission trigger did not apply; storing draft");
                let application = self.commit(&current, current.clone())?;
                Ok(DispatchOutcome {
                    result,
                    committed: Some(TransitionOutcome {
                        before: application.key(),
                        after: application.key(),
                        application,
                        system_trigger: None,
                        notices: Vec::new(),
                    }),
                })
            }
            TriggerResult::NotApplied { .. } => Ok(DispatchOutcome {
                result,
                committed: None,
            }),
        }
    }

    /// Manual transition requested by `actor`.
    pub fn transition(
        &self,
        id: &ApplicationId,
        requested: ApplicationStatus,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.locks
            .with(id, || self.transition_locked(id, requested, actor, reason))
    }

    fn transition_locked(
        &self,
        id: &ApplicationId,
        requested: ApplicationStatus,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let current = self.load(id)?;
        let transition = self.validator.validate(
            &current,
            requested,
            actor,
            reason,
            self.documents.as_ref(),
        )?;

        let mut next = current.clone();
        let mut notices = Vec::new();
        self.apply(
            &mut next,
            &transition,
            actor,
            NoticeOrigin::Manual,
            actor.id(),
            &mut notices,
        );
        let system_trigger = self.follow_on(&mut next, &mut notices);

        self.finish(&current, next, system_trigger, notices, actor)
    }

    /// Feed a domain event to the trigger dispatcher and commit whatever it applies.
    pub fn dispatch(
        &self,
        id: &ApplicationId,
        event: &DomainEvent,
        triggered_by: &Actor,
    ) -> Result<DispatchOutcome, WorkflowError> {
        self.locks
            .with(id, || self.dispatch_locked(id, event, triggered_by))
    }

    fn dispatch_locked(
        &self,
        id: &ApplicationId,
        event: &DomainEvent,
        triggered_by: &Actor,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let current = self.load(id)?;
        let result =
            self.dispatcher
                .dispatch(&current, event, triggered_by, self.documents.as_ref());
        let committed = match &result {
            TriggerResult::Applied(applied) => {
                Some(self.commit_trigger(&current, applied, triggered_by)?)
            }
            TriggerResult::NotApplied { trigger, reason } => {
                debug!(application_id = %id, ?trigger, %reason, "event produced no transition");
                None
            }
        };

        Ok(DispatchOutcome { result, committed })
    }

    pub fn hold(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.control(id, actor, NoticeOrigin::Hold, |current| {
            self.controller.hold(current, actor, reason)
        })
    }

    pub fn resume(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.control(id, actor, NoticeOrigin::Resume, |current| {
            self.controller.resume(current, actor, reason)
        })
    }

    pub fn cancel(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        self.control(id, actor, NoticeOrigin::Cancel, |current| {
            self.controller.cancel(current, actor, reason)
        })
    }

    fn load(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.store
            .get(id)?
            .ok_or_else(|| WorkflowError::NotFound(id.clone()))
    }

    fn control<F>(
        &self,
        id: &ApplicationId,
        actor: &Actor,
        origin: NoticeOrigin,
        change: F,
    ) -> Result<TransitionOutcome, WorkflowError>
    where
        F: FnOnce(&Application) -> Result<ControlChange, TransitionError>,
    {
        self.locks.with(id, || {
            let current = self.load(id)?;
            let ControlChange { application, left } = change(&current)?;
            let notice = Self::control_notice(&current, &application, left, actor, origin);
            self.finish(&current, application, None, vec![notice], actor)
        })
    }

    fn control_notice(
        current: &Application,
        application: &Application,
        left: ApplicationStatus,
        actor: &Actor,
        origin: NoticeOrigin,
    ) -> WorkflowNotice {
        let mut recipients = vec![current.next_actor];
        if current.next_actor != ActorRole::Admin {
            recipients.push(ActorRole::Admin);
        }
        WorkflowNotice {
            application_id: application.id.clone(),
            origin,
            from: StageStatus::new(current.stage, left),
            to: application.key(),
            actor: actor.role(),
            next_actor: application.next_actor,
            next_action: application.next_action.clone(),
            recipients,
        }
    }

    fn commit_trigger(
        &self,
        current: &Application,
        applied: &AppliedTrigger,
        triggered_by: &Actor,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let mut next = current.clone();
        let mut notices = Vec::new();
        self.apply(
            &mut next,
            &applied.transition,
            &Actor::system(),
            NoticeOrigin::SystemTrigger(applied.trigger),
            &applied.triggered_by,
            &mut notices,
        );

        // Trigger output is never fed back into another trigger.
        self.finish(current, next, None, notices, triggered_by)
    }

    /// Write a validated transition onto the working copy.
    fn apply(
        &self,
        next: &mut Application,
        transition: &ValidatedTransition,
        actor: &Actor,
        origin: NoticeOrigin,
        stamped_by: &str,
        notices: &mut Vec<WorkflowNotice>,
    ) {
        let entry = self.recorder.record(
            next,
            transition.to.stage,
            transition.to.status,
            actor,
            transition.reason.as_deref(),
        );

        next.stage = transition.to.stage;
        next.status = transition.to.status;
        next.next_actor = transition.next_actor;
        next.next_action = transition.next_action.clone();
        if transition.to.status.is_rejection() {
            next.rejection_reason = transition.reason.clone();
        }
        match transition.stamps {
            Some(ProvenanceStamp::Approved) if next.approved_by.is_none() => {
                next.approved_by = Some(stamped_by.to_string());
            }
            Some(ProvenanceStamp::Released) if next.released_by.is_none() => {
                next.released_by = Some(stamped_by.to_string());
            }
            _ => {}
        }
        next.stage_history.push(entry);

        notices.push(WorkflowNotice {
            application_id: next.id.clone(),
            origin,
            from: transition.from,
            to: transition.to,
            actor: actor.role(),
            next_actor: transition.next_actor,
            next_action: transition.next_action.clone(),
            recipients: transition.recipients.clone(),
        });
    }

    /// Run the auto trigger attached to the state just entered, if any.
    fn follow_on(
        &self,
        next: &mut Application,
        notices: &mut Vec<WorkflowNotice>,
    ) -> Option<AppliedTrigger> {
        let mut fired = None;
        for _ in 0..MAX_FOLLOW_ON_HOPS {
            let Some(trigger) = self
                .validator
                .matrix()
                .entry(next.key())
                .and_then(|entry| entry.auto_trigger)
            else {
                break;
            };

            let stamped_by = next
                .stage_history
                .last()
                .map(|entry| entry.actor_id.clone())
                .unwrap_or_else(|| Actor::system().id().to_string());
            let triggered_by = Actor::verified(ActorRole::System, stamped_by);
            match self
                .dispatcher
                .fire(trigger, next, &triggered_by, None, self.documents.as_ref())
            {
                TriggerResult::Applied(applied) => {
                    self.apply(
                        next,
                        &applied.transition,
                        &Actor::system(),
                        NoticeOrigin::SystemTrigger(trigger),
                        &applied.triggered_by,
                        notices,
                    );
                    fired = Some(applied);
                }
                TriggerResult::NotApplied { reason, .. } => {
                    debug!(application_id = %next.id, %trigger, %reason, "follow-on trigger skipped");
                    break;
                }
            }
        }
        fired
    }

    fn finish(
        &self,
        current: &Application,
        next: Application,
        system_trigger: Option<AppliedTrigger>,
        notices: Vec<WorkflowNotice>,
        actor: &Actor,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let application = self.commit(current, next)?;
        self.publish(&notices);

        info!(
            application_id = %application.id,
            from = %current.key(),
            to = %application.key(),
            actor = %actor.role(),
            actor_id = actor.id(),
            follow_on = system_trigger.as_ref().map(|applied| applied.trigger.label()),
            version = application.version,
            "application transition committed"
        );

        Ok(TransitionOutcome {
            before: current.key(),
            after: application.key(),
            application,
            system_trigger,
            notices,
        })
    }

    fn commit(
        &self,
        current: &Application,
        mut next: Application,
    ) -> Result<Application, WorkflowError> {
        next.version = current.version + 1;
        self.store.put(next.clone())?;
        Ok(next)
    }

    fn publish(&self, notices: &[WorkflowNotice]) {
        for publisher in &self.publishers {
            for notice in notices {
                if let Err(err) = publisher.publish(notice) {
                    warn!(
                        application_id = %notice.application_id,
                        error = %err,
                        "failed to publish workflow notice"
                    );
                }
            }
        }
    }
}

/// Committed change returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub application: Application,
    pub before: StageStatus,
    pub after: StageStatus,
    /// Follow-on trigger committed in the same write, if one fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_trigger: Option<AppliedTrigger>,
    pub notices: Vec<WorkflowNotice>,
}

/// Result of feeding an event to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub result: TriggerResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<TransitionOutcome>,
}

impl DispatchOutcome {
    pub fn applied(&self) -> bool {
        self.result.applied()
    }
}

/// Error raised by the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Validation failures can be retried with different input; store failures cannot.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    pub fn rejection(&self) -> Option<&TransitionError> {
        match self {
            Self::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// Single-writer gate per application id. A slot lives only while some caller holds or
/// waits on it, so calls against unknown ids leave nothing behind.
#[derive(Default)]
struct ApplicationLocks {
    slots: Mutex<HashMap<ApplicationId, Arc<Mutex<()>>>>,
}

impl ApplicationLocks {
    fn with<T>(&self, id: &ApplicationId, work: impl FnOnce() -> T) -> T {
        let slot = self.acquire(id);
        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        self.release(id, slot);
        result
    }

    fn acquire(&self, id: &ApplicationId) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(id.clone()).or_default().clone()
    }

    // Clones are only handed out under the map lock, so a count of one here means nobody
    // else holds or waits on the slot.
    fn release(&self, id: &ApplicationId, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        drop(slot);
        if slots
            .get(id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            slots.remove(id);
        }
    }

    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
