use crate::config::ServerConfig;
use crate::explain::ExplanationReport;
use crate::service::{
    self, ExplainRequest, OptimizeRequest, OptimizeResponse, ValidateRequest,
};
use crate::validator::ValidationReport;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use std::sync::Arc;

type SharedConfig = Arc<ServerConfig>;

async fn health_handler() -> &'static str {
    "ok"
}

async fn validate_handler(Json(request): Json<ValidateRequest>) -> Json<ValidationReport> {
    Json(service::validate_constraints(&request))
}

async fn optimize_handler(
    State(config): State<SharedConfig>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>, (StatusCode, String)> {
    let limits = config.search_limits();
    // search is CPU-bound; keep it off the async workers
    let outcome = tokio::task::spawn_blocking(move || service::optimize_seating(&request, &limits))
        .await
        .map_err(|e| {
            error!("Seating task failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    match outcome {
        Ok(response) => Ok(Json(response)),
        Err(e) => Err((StatusCode::BAD_REQUEST, e.to_string())),
    }
}

async fn explain_handler(
    Json(request): Json<ExplainRequest>,
) -> Result<Json<ExplanationReport>, (StatusCode, String)> {
    service::explain_solution(&request)
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

pub fn router(config: ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/seating/validate", post(validate_handler))
        .route("/v1/seating/optimize", post(optimize_handler))
        .route("/v1/seating/explain", post(explain_handler))
        .with_state(Arc::new(config))
}

pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, router(config)).await
}
