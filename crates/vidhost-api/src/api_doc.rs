//! OpenAPI documentation, served at `/api/openapi.json` and rendered by RapiDoc at `/docs`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vidhost Upload API",
        version = "0.1.0",
        description = "Video ingestion: multipart uploads into object storage and raw chunk uploads. Stored sources are announced on the upload-completed topic for HLS transcoding."
    ),
    paths(
        handlers::upload::upload_video,
        handlers::chunk_upload::upload_chunk,
        handlers::health::health,
    ),
    components(schemas(
        handlers::upload::UploadResponse,
        handlers::chunk_upload::ChunkUploadResponse,
        error::ErrorResponse,
    )),
    tags(
        (name = "uploads", description = "Video and chunk uploads"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;
