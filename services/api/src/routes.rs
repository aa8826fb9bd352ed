use crate::infra::AppState;
use admission_workflow::workflows::admission::{
    admission_router, ApplicationId, ApplicationStore, DocumentQuery, DocumentTag,
    WorkflowEngine,
};
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentRecordRequest {
    pub(crate) tag: String,
    #[serde(default)]
    pub(crate) approved: bool,
}

pub(crate) fn with_admission_routes<S, D>(engine: Arc<WorkflowEngine<S, D>>) -> axum::Router
where
    S: ApplicationStore + 'static,
    D: DocumentQuery + 'static,
{
    let matrix = engine
        .matrix()
        .to_json_pretty()
        .map_err(|err| err.to_string());
    admission_router(engine)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/admissions/matrix",
            axum::routing::get(move || async move {
                match matrix {
                    Ok(body) => (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, "application/json")],
                        body,
                    )
                        .into_response(),
                    Err(err) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": err })),
                    )
                        .into_response(),
                }
            }),
        )
        .route(
            "/api/v1/admissions/applications/:application_id/documents",
            axum::routing::post(document_record_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Record an upload or approval in the document registry. Triggers run only when the caller
/// posts a `document_uploaded` event.
pub(crate) async fn document_record_endpoint(
    Extension(state): Extension<AppState>,
    Path(application_id): Path<String>,
    Json(request): Json<DocumentRecordRequest>,
) -> impl IntoResponse {
    let tag = DocumentTag::new(&request.tag);
    if tag.as_str().is_empty() {
        let payload = json!({ "error": "document tag must not be empty" });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload));
    }

    let id = ApplicationId(application_id);
    if request.approved {
        state.documents.approve(&id, tag.clone());
    } else {
        state.documents.upload(&id, tag.clone());
    }

    let payload = json!({
        "application_id": id,
        "tag": tag,
        "approved": request.approved,
        "pending": state.documents.pending_document_types(&id),
    });
    (StatusCode::ACCEPTED, Json(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{InMemoryApplicationStore, InMemoryDocumentRegistry};
    use admission_workflow::workflows::admission::AuthorityMatrix;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> (axum::Router, Arc<InMemoryDocumentRegistry>) {
        let documents = Arc::new(InMemoryDocumentRegistry::default());
        let matrix = Arc::new(AuthorityMatrix::standard().expect("standard matrix"));
        let engine = Arc::new(WorkflowEngine::new(
            Arc::new(InMemoryApplicationStore::default()),
            documents.clone(),
            matrix,
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            documents: documents.clone(),
        };
        (with_admission_routes(engine).layer(Extension(state)), documents)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 256 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    #[tokio::test]
    async fn readiness_reflects_startup_flag() {
        let (router, _) = app(false);
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let (router, _) = app(true);
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn matrix_endpoint_serves_configured_table() {
        let (router, _) = app(true);
        let response = router
            .oneshot(
                Request::get("/api/v1/admissions/matrix")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let entries = body["entries"].as_array().expect("entries array");
        assert!(entries
            .iter()
            .any(|entry| entry["status"] == "documents_approved"
                && entry["auto_trigger"] == "stage1_final_approval"));
    }

    #[tokio::test]
    async fn document_endpoint_records_uploads() {
        let (router, documents) = app(true);
        let response = router
            .oneshot(
                Request::post("/api/v1/admissions/applications/app-1/documents")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"tag":"Passport"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let pending = documents.pending_document_types(&ApplicationId("app-1".into()));
        assert!(pending.contains(&DocumentTag::new("passport")));
    }

    #[tokio::test]
    async fn admission_routes_are_mounted() {
        let (router, _) = app(true);
        let response = router
            .oneshot(
                Request::post("/api/v1/admissions/applications")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-actor-role", "partner")
                    .body(Body::from(r#"{"id":"app-9"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
