use crate::auth::AuthenticatedUser;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;
use uuid::Uuid;
use vidhost_core::constants::CONTENT_TYPE_OCTET_STREAM;
use vidhost_core::keys::source_key;
use vidhost_core::AppError;
use vidhost_processing::{buffer_stream, RandomAccessSource};

/// Multipart form field carrying the video.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Object key of the stored source video
    pub video_path: String,
    /// Video id; also the stem of `video_path`
    pub uuid: String,
    /// Stored size in bytes
    pub size: u64,
    /// Number of multipart parts used
    pub parts: usize,
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "uploads",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video stored and announced", body = UploadResponse),
        (status = 400, description = "Missing or empty file field", body = ErrorResponse),
        (status = 401, description = "Missing or rejected access token", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 502, description = "Store, broker or auth service unavailable", body = ErrorResponse)
    )
)]
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpAppError> {
    let start = Instant::now();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or(CONTENT_TYPE_OCTET_STREAM)
            .to_string();

        let source = buffer_stream(
            field,
            state.config.upload_spool_threshold_bytes(),
            state.config.max_upload_size_bytes(),
            state.spool_dir(),
        )
        .await?;
        if source.is_empty() {
            return Err(AppError::InvalidInput("Uploaded file is empty".to_string()).into());
        }

        let video_id = Uuid::new_v4();
        let key = source_key(video_id, &filename);
        tracing::info!(
            key = %key,
            user_id = %user.id,
            size_bytes = source.len(),
            spooled = source.is_spooled(),
            "Receiving video upload"
        );

        let outcome = state
            .uploads
            .upload(&key, &content_type, Arc::new(source))
            .await?;
        state.upload_events.publish(&user.id, &key).await?;

        tracing::info!(
            key = %key,
            size_bytes = outcome.size,
            parts = outcome.parts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Video upload completed"
        );
        return Ok(Json(UploadResponse {
            video_path: key,
            uuid: video_id.simple().to_string(),
            size: outcome.size,
            parts: outcome.parts.len(),
        }));
    }

    Err(AppError::InvalidInput(format!("Multipart field '{}' is required", FILE_FIELD)).into())
}
