#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::{S3Settings, S3Storage};
use crate::{MemoryStorage, ObjectStore, StorageBackend, StorageError, StorageResult};
use std::sync::Arc;
use vidhost_core::Config;

/// Create an object store based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config
                .s3_region()
                .or_else(|| config.aws_region())
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
                })?;

            let storage = S3Storage::new(S3Settings {
                bucket,
                region,
                endpoint_url: config.s3_endpoint().map(String::from),
                credentials: config
                    .s3_credentials()
                    .map(|(access, secret)| (access.to_string(), secret.to_string())),
                timeouts: crate::StorageTimeouts {
                    control: config.control_timeout(),
                    transfer: config.transfer_timeout(),
                },
                public_renditions: config.s3_public_renditions(),
            })
            .await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path)
                .await?
                .with_min_part_size(config.upload_part_size_bytes().min(vidhost_core::constants::MIN_PART_SIZE_BYTES));
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object store; objects are lost on restart");
            Ok(Arc::new(MemoryStorage::new().with_min_part_size(
                config
                    .upload_part_size_bytes()
                    .min(vidhost_core::constants::MIN_PART_SIZE_BYTES),
            )))
        }
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use vidhost_core::config::ServiceConfig;

    #[tokio::test]
    async fn builds_local_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_parts(ServiceConfig {
            storage_backend: StorageBackend::Local,
            local_storage_path: Some(dir.path().to_string_lossy().into_owned()),
            ..ServiceConfig::default()
        });

        let store = create_storage(&config).await.unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Local);
        store.check_ready().await.unwrap();
    }

    #[tokio::test]
    async fn local_store_requires_path() {
        let config = Config::from_parts(ServiceConfig {
            storage_backend: StorageBackend::Local,
            local_storage_path: None,
            ..ServiceConfig::default()
        });
        assert!(matches!(
            create_storage(&config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
