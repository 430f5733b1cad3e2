use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::http::server::AppState;

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness plus store reachability. `stats()` is the store probe.
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let timestamp = Utc::now();

    match state.store.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": timestamp,
                "service": SERVICE_NAME,
                "version": SERVICE_VERSION,
                "components": {
                    "database": {
                        "status": "healthy",
                        "total_requests": stats.total_requests,
                        "total_responses": stats.total_responses,
                    }
                }
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health check could not reach the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "timestamp": timestamp,
                    "components": { "database": "unhealthy" },
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
