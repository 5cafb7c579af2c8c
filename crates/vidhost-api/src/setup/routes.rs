//! Route configuration and setup.

use crate::api_doc::ApiDoc;
use crate::auth::auth_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use vidhost_core::Config;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Build the application router.
///
/// Upload routes sit behind the access-token middleware; `/health`, the OpenAPI
/// document and the docs UI are public.
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router<()> {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let protected_routes = Router::new()
        .route("/upload", post(handlers::upload::upload_video))
        .route("/upload/video", post(handlers::upload::upload_video))
        .route("/upload/chunk", post(handlers::chunk_upload::upload_chunk))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let http_concurrency_limit = config.http_concurrency_limit().max(1);
    let body_limit = usize::try_from(
        config
            .max_upload_size_bytes()
            .saturating_add(MULTIPART_OVERHEAD_BYTES),
    )
    .unwrap_or(usize::MAX);
    tracing::info!(
        http_concurrency_limit,
        max_upload_bytes = config.max_upload_size_bytes(),
        "HTTP limits configured"
    );

    public_routes
        .merge(protected_routes)
        .with_state(state)
        .merge(utoipa_rapidoc::RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
}
