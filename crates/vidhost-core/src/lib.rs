//! Vidhost Core Library
//!
//! Domain models, message envelopes, object key conventions, error types and
//! configuration shared by the upload API and the transcode worker.

pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod job_error;
pub mod keys;
pub mod models;

// Re-export commonly used types
pub use backend::{BrokerBackend, StorageBackend};
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::{JobError, JobResultExt};
