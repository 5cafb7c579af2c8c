//! Raw chunk upload: the request body is stored as one object under `chunks/`.

use crate::auth::AuthenticatedUser;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use vidhost_core::constants::CONTENT_TYPE_OCTET_STREAM;
use vidhost_core::keys::chunk_key;
use vidhost_core::AppError;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChunkQuery {
    /// Name of the file the chunk belongs to
    pub filename: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChunkUploadResponse {
    /// Object key the chunk was stored under
    pub key: String,
    pub size: u64,
}

#[utoipa::path(
    post,
    path = "/upload/chunk",
    tag = "uploads",
    params(ChunkQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkUploadResponse),
        (status = 400, description = "Empty body or missing filename", body = ErrorResponse),
        (status = 401, description = "Missing or rejected access token", body = ErrorResponse),
        (status = 413, description = "Chunk too large", body = ErrorResponse)
    )
)]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> Result<Json<ChunkUploadResponse>, HttpAppError> {
    if body.is_empty() {
        return Err(AppError::InvalidInput("Chunk body is empty".to_string()).into());
    }
    let size = body.len() as u64;
    if size > state.config.max_upload_size_bytes() {
        return Err(AppError::PayloadTooLarge(format!(
            "Chunk exceeds the {} byte upload limit",
            state.config.max_upload_size_bytes()
        ))
        .into());
    }

    let key = chunk_key(&query.filename, Uuid::new_v4());
    state
        .store
        .put(&key, body, CONTENT_TYPE_OCTET_STREAM)
        .await?;
    tracing::info!(key = %key, user_id = %user.id, size_bytes = size, "Chunk stored");

    Ok(Json(ChunkUploadResponse { key, size }))
}
