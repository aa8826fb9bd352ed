use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, ActorRole, ApplicationId, ApplicationStatus, NewApplication};
use super::engine::{WorkflowEngine, WorkflowError};
use super::store::{ApplicationStore, DocumentQuery};
use super::triggers::DomainEvent;
use super::validator::TransitionError;

pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_OVERRIDE_HEADER: &str = "x-actor-override";

/// Router builder exposing the workflow engine over HTTP.
///
/// Callers are expected to sit behind an authenticating gateway that sets the actor headers.
pub fn admission_router<S, D>(engine: Arc<WorkflowEngine<S, D>>) -> Router
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    Router::new()
        .route(
            "/api/v1/admissions/applications",
            post(submit_handler::<S, D>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id",
            get(application_handler::<S, D>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/transitions",
            post(transition_handler::<S, D>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/transitions/check",
            post(check_handler::<S, D>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/events",
            post(event_handler::<S, D>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/hold",
            post(hold_handler::<S, D>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/resume",
            post(resume_handler::<S, D>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/cancel",
            post(cancel_handler::<S, D>),
        )
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: ApplicationStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) async fn submit_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    headers: HeaderMap,
    Json(submission): Json<NewApplication>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.submit(submission, &actor) {
        Ok(outcome) => {
            let status = if outcome.applied() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(outcome)).into_response()
        }
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn application_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    match engine.get(&ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn transition_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match engine.transition(&id, request.status, &actor, request.reason.as_deref()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn check_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match engine.can_transition(&id, request.status, &actor, request.reason.as_deref()) {
        Ok(transition) => {
            let payload = json!({
                "allowed": true,
                "transition": transition,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(WorkflowError::Rejected(err)) => {
            let payload = json!({
                "allowed": false,
                "reason": err.to_string(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn event_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(event): Json<DomainEvent>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match engine.dispatch(&id, &event, &actor) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn hold_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReasonRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match engine.hold(&id, &actor, request.reason.as_deref()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn resume_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReasonRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match engine.resume(&id, &actor, request.reason.as_deref()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn cancel_handler<S, D>(
    State(engine): State<Arc<WorkflowEngine<S, D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReasonRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match engine.cancel(&id, &actor, request.reason.as_deref()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

/// Build the verified actor from gateway headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let role = header_value(headers, ACTOR_ROLE_HEADER)?
        .ok_or_else(|| bad_request(format!("missing {ACTOR_ROLE_HEADER} header")))?;
    let role: ActorRole = role.parse().map_err(bad_request)?;
    let id = header_value(headers, ACTOR_ID_HEADER)?
        .unwrap_or_else(|| role.label().to_ascii_lowercase());
    let can_override = match header_value(headers, ACTOR_OVERRIDE_HEADER)?.as_deref() {
        None | Some("false") | Some("0") => false,
        Some("true") | Some("1") => true,
        Some(other) => {
            return Err(bad_request(format!(
                "{ACTOR_OVERRIDE_HEADER} must be true or false, found '{other}'"
            )))
        }
    };

    let actor = Actor::verified(role, id);
    Ok(if can_override {
        actor.with_override()
    } else {
        actor
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<Option<String>, Response> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|value| Some(value.trim().to_string()))
            .map_err(|_| bad_request(format!("{name} header is not valid ASCII"))),
    }
}

fn bad_request(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

pub(crate) fn workflow_error_response(err: WorkflowError) -> Response {
    let status = match &err {
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::Rejected(TransitionError::ActorMismatch { .. }) => StatusCode::FORBIDDEN,
        WorkflowError::Rejected(
            TransitionError::MissingReason(_) | TransitionError::DocumentsIncomplete { .. },
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Rejected(_) => StatusCode::CONFLICT,
    };
    let payload = json!({
        "error": err.to_string(),
        "recoverable": err.is_recoverable(),
    });
    (status, Json(payload)).into_response()
}
