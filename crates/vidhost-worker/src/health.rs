//! Liveness endpoint for the worker process.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use vidhost_infra::ShutdownSignal;

async fn health(State(shutdown): State<ShutdownSignal>) -> impl IntoResponse {
    if shutdown.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "shutting_down" })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "status": "alive" })))
    }
}

pub fn health_router(shutdown: ShutdownSignal) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use vidhost_infra::ShutdownController;

    #[tokio::test]
    async fn reports_alive_then_shutting_down() {
        let (controller, signal) = ShutdownController::new();
        let server = TestServer::new(health_router(signal)).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_json(&json!({ "status": "alive" }));

        controller.trigger();
        let response = server.get("/health").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        response.assert_json(&json!({ "status": "shutting_down" }));
    }
}
