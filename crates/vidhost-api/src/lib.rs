//! Vidhost API Library
//!
//! HTTP surface of the pipeline: multipart video uploads, raw chunk uploads and the
//! liveness probe, plus application setup.

mod api_doc;
mod handlers;

pub mod auth;
pub mod error;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use handlers::chunk_upload::ChunkUploadResponse;
pub use handlers::upload::UploadResponse;
