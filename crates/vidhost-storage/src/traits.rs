//! Object store abstraction
//!
//! Whole-object operations plus the part-numbered multipart protocol
//! (start → upload part → complete / abort) used for large uploads.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use vidhost_core::constants::MIN_PART_SIZE_BYTES;
use vidhost_core::models::PartRecord;
use vidhost_core::AppError;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage call {operation} exceeded its {}ms deadline", timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Part {part_number} is {size} bytes, below the {min_size} byte minimum for non-final parts")]
    InvalidPart {
        part_number: u32,
        size: u64,
        min_size: u64,
    },

    #[error("Incomplete upload: {0}")]
    IncompleteUpload(String),

    #[error("Unknown multipart upload: {0}")]
    NoSuchUpload(String),
}

impl StorageError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::UploadFailed(_)
                | StorageError::DownloadFailed(_)
                | StorageError::DeleteFailed(_)
                | StorageError::IoError(_)
                | StorageError::Timeout { .. }
                | StorageError::Unavailable(_)
        )
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::ConfigError(msg) => AppError::Config(msg),
            StorageError::Unavailable(msg) => AppError::UpstreamUnavailable(msg),
            e @ (StorageError::InvalidPart { .. }
            | StorageError::IncompleteUpload(_)
            | StorageError::NoSuchUpload(_)
            | StorageError::BackendError(_)) => AppError::StoreProtocol(e.to_string()),
            e => AppError::TransientIo(e.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Deadlines applied by network-backed stores.
#[derive(Debug, Clone, Copy)]
pub struct StorageTimeouts {
    /// start / complete / abort / delete / head
    pub control: Duration,
    /// part upload, get, put
    pub transfer: Duration,
}

impl Default for StorageTimeouts {
    fn default() -> Self {
        Self {
            control: Duration::from_secs(5),
            transfer: Duration::from_secs(120),
        }
    }
}

/// Run one store call under a deadline; expiry becomes [`StorageError::Timeout`].
pub async fn with_deadline<T, F>(operation: &'static str, timeout: Duration, call: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout { operation, timeout }),
    }
}

/// Handle for an open multipart session.
///
/// Carries the key because S3 addresses parts by `(key, upload_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    pub key: String,
    pub upload_id: String,
}

/// Object store abstraction
///
/// Implemented by S3 (and S3-compatible servers such as MinIO), the local filesystem
/// and an in-process store. Keys must not contain `..` or start with `/`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store a whole object, replacing any previous one at `key`.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Store the contents of a local file. Returns the number of bytes written.
    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<u64> {
        let data = tokio::fs::read(path).await?;
        let size = data.len() as u64;
        self.put(key, Bytes::from(data), content_type).await?;
        Ok(size)
    }

    /// Fetch a whole object.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Fetch an object into a local file. Returns the number of bytes written.
    async fn download_to_file(&self, key: &str, path: &Path) -> StorageResult<u64> {
        let data = self.get(key).await?;
        tokio::fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Boot-time reachability check.
    async fn check_ready(&self) -> StorageResult<()>;

    /// Smallest size accepted for a part that is not the last one.
    fn min_part_size(&self) -> u64 {
        MIN_PART_SIZE_BYTES
    }

    /// Open a multipart session for `key`.
    async fn start_upload(&self, key: &str, content_type: &str) -> StorageResult<MultipartUpload>;

    /// Upload one part (numbers start at 1). Re-uploading the same number replaces it.
    /// Returns the part's ETag.
    async fn upload_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String>;

    /// Assemble the object from `parts`, which must be sorted by part number.
    async fn complete_upload(&self, upload: &MultipartUpload, parts: &[PartRecord]) -> StorageResult<()>;

    /// Release the session and every part stored for it.
    async fn abort_upload(&self, upload: &MultipartUpload) -> StorageResult<()>;

    fn backend_type(&self) -> StorageBackend;
}

/// Shared checks on a completion request: non-empty, strictly ascending,
/// every part except the last at least `min_part_size`.
pub(crate) fn validate_completion(parts: &[PartRecord], min_part_size: u64) -> StorageResult<()> {
    if parts.is_empty() {
        return Err(StorageError::IncompleteUpload(
            "complete called without parts".to_string(),
        ));
    }
    for pair in parts.windows(2) {
        if pair[1].part_number <= pair[0].part_number {
            return Err(StorageError::IncompleteUpload(format!(
                "parts not in ascending order: {} after {}",
                pair[1].part_number, pair[0].part_number
            )));
        }
    }
    let last = parts.len() - 1;
    for part in &parts[..last] {
        if part.size < min_part_size {
            return Err(StorageError::InvalidPart {
                part_number: part.part_number,
                size: part.size,
                min_size: min_part_size,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: u32, size: u64) -> PartRecord {
        PartRecord {
            part_number: n,
            e_tag: format!("etag-{}", n),
            size,
        }
    }

    #[test]
    fn completion_requires_ascending_parts() {
        let parts = vec![part(2, 10), part(1, 10)];
        assert!(matches!(
            validate_completion(&parts, 5),
            Err(StorageError::IncompleteUpload(_))
        ));
    }

    #[test]
    fn completion_rejects_small_non_final_part() {
        let parts = vec![part(1, 10), part(2, 3), part(3, 1)];
        match validate_completion(&parts, 5) {
            Err(StorageError::InvalidPart { part_number, .. }) => assert_eq!(part_number, 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn final_part_may_be_small() {
        let parts = vec![part(1, 10), part(2, 1)];
        assert!(validate_completion(&parts, 5).is_ok());
    }

    #[test]
    fn transient_classification() {
        assert!(StorageError::Timeout {
            operation: "upload_part",
            timeout: Duration::from_secs(1)
        }
        .is_transient());
        assert!(!StorageError::NotFound("k".into()).is_transient());
        assert!(!StorageError::InvalidPart {
            part_number: 1,
            size: 1,
            min_size: 2
        }
        .is_transient());
    }

    #[tokio::test]
    async fn deadline_expiry_is_timeout() {
        let result: StorageResult<()> = with_deadline("get", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StorageError::Timeout { operation: "get", .. })));
    }

    #[test]
    fn maps_to_app_error_taxonomy() {
        let app: AppError = StorageError::Unavailable("down".into()).into();
        assert!(matches!(app, AppError::UpstreamUnavailable(_)));
        let app: AppError = StorageError::NoSuchUpload("u".into()).into();
        assert!(matches!(app, AppError::StoreProtocol(_)));
        let app: AppError = StorageError::Timeout {
            operation: "put",
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(matches!(app, AppError::TransientIo(_)));
    }
}
