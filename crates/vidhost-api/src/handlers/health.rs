use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

/// Liveness probe; flips to 503 as soon as shutdown begins.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Process is serving requests"),
        (status = 503, description = "Process is shutting down")
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.shutdown.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "shutting_down" })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "status": "alive" })))
    }
}
