use axum::{
    Router,
    routing::get,
    http::StatusCode,
};
use crate::observability::metrics::gather_text;

pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics() -> Result<String, StatusCode> {
    gather_text().map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
