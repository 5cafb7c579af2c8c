//! Vidhost Storage Library
//!
//! Object store abstraction with whole-object operations and the multipart
//! protocol, plus S3, local filesystem and in-memory implementations.
//!
//! # Key format
//!
//! - source uploads: `unprocessed_videos/{uuid}{ext}`
//! - renditions: `video_files/{uuid}/{filename}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation lives in
//! `vidhost_core::keys` so every backend stays consistent.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::{FaultKind, FaultTarget, MemoryStorage, StoreCall};
#[cfg(feature = "storage-s3")]
pub use s3::{S3Settings, S3Storage};
pub use traits::{
    with_deadline, MultipartUpload, ObjectStore, StorageError, StorageResult, StorageTimeouts,
};
pub use vidhost_core::StorageBackend;
