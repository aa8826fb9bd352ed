use crate::cli::ServeArgs;
use crate::infra::{
    load_matrix, AppState, InMemoryApplicationStore, InMemoryDocumentRegistry, TracingPublisher,
};
use crate::routes::with_admission_routes;
use admission_workflow::config::AppConfig;
use admission_workflow::error::AppError;
use admission_workflow::telemetry;
use admission_workflow::workflows::admission::WorkflowEngine;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(path) = args.matrix.take() {
        config.workflow.matrix_path = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    // Loaded once; a malformed table stops startup here.
    let matrix = Arc::new(load_matrix(config.workflow.matrix_path.as_deref())?);
    info!(
        entries = matrix.len(),
        source = config
            .workflow
            .matrix_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "built-in".to_string()),
        "authority matrix loaded"
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let documents = Arc::new(InMemoryDocumentRegistry::default());
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        documents: documents.clone(),
    };

    let store = Arc::new(InMemoryApplicationStore::default());
    let engine = Arc::new(
        WorkflowEngine::new(store, documents, matrix)
            .with_required_documents(config.workflow.required_documents.clone())
            .with_publisher(Arc::new(TracingPublisher)),
    );

    let app = with_admission_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "admission workflow engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
