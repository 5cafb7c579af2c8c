use crate::traits::{validate_completion, MultipartUpload, ObjectStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use vidhost_core::constants::MIN_PART_SIZE_BYTES;
use vidhost_core::models::PartRecord;

/// Staging directory for multipart sessions, under the storage root.
const MULTIPART_DIR: &str = ".multipart";
const TARGET_KEY_FILE: &str = "target";

/// Local filesystem storage implementation
///
/// Multipart parts are staged in `{base}/.multipart/{upload_id}/` and concatenated into
/// the target file on completion.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    min_part_size: u64,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path` (created if missing).
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            min_part_size: MIN_PART_SIZE_BYTES,
        })
    }

    pub fn with_min_part_size(mut self, min_part_size: u64) -> Self {
        self.min_part_size = min_part_size;
        self
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys that could escape the base storage directory or reach the
    /// multipart staging area.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        vidhost_core::keys::validate_key(storage_key).map_err(StorageError::InvalidKey)?;
        if storage_key.starts_with(MULTIPART_DIR) {
            return Err(StorageError::InvalidKey(
                "Storage key targets the multipart staging area".to_string(),
            ));
        }

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn upload_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        if upload_id.is_empty() || !upload_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(self.base_path.join(MULTIPART_DIR).join(upload_id))
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{:05}", part_number))
    }

    fn part_etag(part_number: u32, size: u64) -> String {
        format!("\"{}-{}\"", part_number, size)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn open_upload_dir(&self, upload: &MultipartUpload) -> StorageResult<PathBuf> {
        let dir = self.upload_dir(&upload.upload_id)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(StorageError::NoSuchUpload(upload.upload_id.clone()));
        }
        Ok(dir)
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.ensure_parent_dir(path).await?;

        let mut file = fs::File::create(path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let start = std::time::Instant::now();

        self.write_file(&path, &data).await?;

        tracing::debug!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;
        Ok(Bytes::from(data))
    }

    async fn download_to_file(&self, key: &str, target: &Path) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let copied = fs::copy(&path, target).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to copy {}: {}", path.display(), e))
        })?;
        Ok(copied)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), key = %key, "Local storage delete successful");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn check_ready(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.base_path).await.map_err(|e| {
            StorageError::Unavailable(format!(
                "Storage directory {} is not accessible: {}",
                self.base_path.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(StorageError::ConfigError(format!(
                "{} is not a directory",
                self.base_path.display()
            )));
        }
        Ok(())
    }

    fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    async fn start_upload(&self, key: &str, _content_type: &str) -> StorageResult<MultipartUpload> {
        self.key_to_path(key)?;
        let upload_id = Uuid::new_v4().simple().to_string();
        let dir = self.upload_dir(&upload_id)?;
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(TARGET_KEY_FILE), key.as_bytes()).await?;

        tracing::debug!(key = %key, upload_id = %upload_id, "Local multipart upload started");
        Ok(MultipartUpload {
            key: key.to_string(),
            upload_id,
        })
    }

    async fn upload_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        let dir = self.open_upload_dir(upload).await?;
        self.write_file(&Self::part_path(&dir, part_number), &data)
            .await?;
        Ok(Self::part_etag(part_number, data.len() as u64))
    }

    async fn complete_upload(&self, upload: &MultipartUpload, parts: &[PartRecord]) -> StorageResult<()> {
        let dir = self.open_upload_dir(upload).await?;
        validate_completion(parts, self.min_part_size)?;

        let target_key = fs::read_to_string(dir.join(TARGET_KEY_FILE)).await?;
        let target = self.key_to_path(&target_key)?;
        self.ensure_parent_dir(&target).await?;

        // Assemble next to the target, then rename into place.
        let assembling = target.with_extension(format!("assembling-{}", upload.upload_id));
        let mut out = fs::File::create(&assembling).await?;
        let last = parts.len() - 1;
        for (index, part) in parts.iter().enumerate() {
            let part_path = Self::part_path(&dir, part.part_number);
            let data = match fs::read(&part_path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    drop(out);
                    let _ = fs::remove_file(&assembling).await;
                    return Err(StorageError::IncompleteUpload(format!(
                        "part {} was never uploaded",
                        part.part_number
                    )));
                }
                Err(e) => return Err(e.into()),
            };
            let size = data.len() as u64;
            if part.e_tag != Self::part_etag(part.part_number, size)
                || (index < last && size < self.min_part_size)
            {
                drop(out);
                let _ = fs::remove_file(&assembling).await;
                return Err(StorageError::InvalidPart {
                    part_number: part.part_number,
                    size,
                    min_size: self.min_part_size,
                });
            }
            out.write_all(&data).await?;
        }
        out.sync_all().await?;
        drop(out);

        fs::rename(&assembling, &target).await?;
        fs::remove_dir_all(&dir).await?;

        tracing::debug!(
            key = %target_key,
            upload_id = %upload.upload_id,
            parts = parts.len(),
            "Local multipart upload completed"
        );
        Ok(())
    }

    async fn abort_upload(&self, upload: &MultipartUpload) -> StorageResult<()> {
        let dir = self.open_upload_dir(upload).await?;
        fs::remove_dir_all(&dir).await?;
        tracing::debug!(upload_id = %upload.upload_id, "Local multipart upload aborted");
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
