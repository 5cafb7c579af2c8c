//! Multipart upload orchestration.
//!
//! One coordinating task owns the [`UploadSession`]; part tasks run on a
//! [`BoundedPool`] and report back through its join barrier. Every started session
//! ends in exactly one of complete or abort.

use super::chunker::{plan_parts, PartPlan};
use super::source::RandomAccessSource;
use super::UploadError;
use std::sync::Arc;
use std::time::Instant;
use vidhost_core::constants::DEFAULT_PART_SIZE_BYTES;
use vidhost_core::models::{PartRecord, UploadSession};
use vidhost_infra::{retry_with_backoff, BoundedPool, PoolError, RetryPolicy};
use vidhost_storage::{MultipartUpload, ObjectStore, StorageError};

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub part_size: u64,
    /// Parts uploaded at the same time.
    pub concurrency: usize,
    /// Budget for one part, including the first attempt.
    pub part_retry: RetryPolicy,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE_BYTES,
            concurrency: 4,
            part_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub key: String,
    pub upload_id: String,
    pub size: u64,
    /// Sorted by part number.
    pub parts: Vec<PartRecord>,
}

pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    settings: UploadSettings,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, settings: UploadSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Stream `source` into the store at `key` with the multipart protocol.
    ///
    /// On the first part that fails for good, queued and running part tasks are
    /// cancelled, the session is aborted once and the part's error is returned.
    #[tracing::instrument(skip(self, source), fields(size_bytes = source.len()))]
    pub async fn upload(
        &self,
        key: &str,
        content_type: &str,
        source: Arc<dyn RandomAccessSource>,
    ) -> Result<UploadOutcome, UploadError> {
        let start = Instant::now();
        vidhost_core::keys::validate_key(key).map_err(StorageError::InvalidKey)?;

        let size = source.len();
        let plan = plan_parts(size, self.settings.part_size, self.store.min_part_size())?;
        let expected_parts = plan.len() as u32;

        let handle = self.store.start_upload(key, content_type).await?;
        let mut guard = AbortOnDrop::new(self.store.clone(), handle.clone());
        let mut session = UploadSession::new(key, handle.upload_id.clone());
        tracing::info!(
            key = %key,
            upload_id = %handle.upload_id,
            parts = expected_parts,
            part_size = self.settings.part_size,
            "Multipart upload started"
        );

        let mut pool: BoundedPool<Result<PartRecord, UploadError>> =
            BoundedPool::new(self.settings.concurrency);
        for part in plan {
            pool.spawn(upload_part(
                self.store.clone(),
                handle.clone(),
                source.clone(),
                part,
                self.settings.part_retry,
            ));
        }

        let records = match pool.try_join_all().await {
            Ok(records) => records,
            Err(failure) => {
                let err = match failure {
                    PoolError::Task(e) => e,
                    PoolError::Join(e) => UploadError::Task(e.to_string()),
                };
                guard.disarm();
                self.abort(&handle, &mut session, &err).await;
                return Err(err);
            }
        };

        let parts = match Self::collect_parts(&mut session, records, expected_parts) {
            Ok(parts) => parts,
            Err(err) => {
                guard.disarm();
                self.abort(&handle, &mut session, &err).await;
                return Err(err);
            }
        };

        if let Err(e) = self.store.complete_upload(&handle, &parts).await {
            let err = UploadError::from(e);
            guard.disarm();
            self.abort(&handle, &mut session, &err).await;
            return Err(err);
        }
        guard.disarm();
        session.mark_completed()?;

        tracing::info!(
            key = %key,
            upload_id = %handle.upload_id,
            parts = parts.len(),
            size_bytes = size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Multipart upload completed"
        );

        Ok(UploadOutcome {
            key: key.to_string(),
            upload_id: handle.upload_id,
            size,
            parts,
        })
    }

    fn collect_parts(
        session: &mut UploadSession,
        records: Vec<PartRecord>,
        expected_parts: u32,
    ) -> Result<Vec<PartRecord>, UploadError> {
        for record in records {
            session.record_part(record)?;
        }
        let missing = session.missing_parts(expected_parts);
        if !missing.is_empty() {
            return Err(StorageError::IncompleteUpload(format!("parts {:?} missing", missing)).into());
        }
        Ok(session.sorted_parts())
    }

    /// Abort once; a failed abort is logged and does not replace `cause`.
    async fn abort(&self, handle: &MultipartUpload, session: &mut UploadSession, cause: &UploadError) {
        if session.mark_aborted().is_err() {
            return;
        }
        tracing::warn!(
            key = %handle.key,
            upload_id = %handle.upload_id,
            parts_done = session.parts().len(),
            error = %cause,
            "Aborting multipart upload"
        );
        if let Err(e) = self.store.abort_upload(handle).await {
            tracing::error!(
                key = %handle.key,
                upload_id = %handle.upload_id,
                error = %e,
                "Failed to abort multipart upload"
            );
        }
    }
}

/// Aborts a started session when the upload future is dropped before it settles,
/// e.g. on client disconnect or an enclosing timeout.
struct AbortOnDrop {
    store: Arc<dyn ObjectStore>,
    handle: Option<MultipartUpload>,
}

impl AbortOnDrop {
    fn new(store: Arc<dyn ObjectStore>, handle: MultipartUpload) -> Self {
        Self {
            store,
            handle: Some(handle),
        }
    }

    /// Called once the session is completed or explicitly aborted.
    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(
                key = %handle.key,
                upload_id = %handle.upload_id,
                "Upload cancelled outside a runtime; multipart session left open"
            );
            return;
        };
        let store = self.store.clone();
        runtime.spawn(async move {
            tracing::warn!(
                key = %handle.key,
                upload_id = %handle.upload_id,
                "Upload cancelled; aborting multipart session"
            );
            if let Err(e) = store.abort_upload(&handle).await {
                tracing::error!(
                    key = %handle.key,
                    upload_id = %handle.upload_id,
                    error = %e,
                    "Failed to abort cancelled multipart upload"
                );
            }
        });
    }
}

async fn upload_part(
    store: Arc<dyn ObjectStore>,
    handle: MultipartUpload,
    source: Arc<dyn RandomAccessSource>,
    part: PartPlan,
    retry: RetryPolicy,
) -> Result<PartRecord, UploadError> {
    retry_with_backoff(
        retry,
        "upload_part",
        UploadError::is_transient,
        |attempt| {
            let store = store.clone();
            let handle = handle.clone();
            let source = source.clone();
            async move {
                let data = source.read_at(part.offset, part.len).await?;
                let e_tag = store.upload_part(&handle, part.part_number, data).await?;
                if attempt > 1 {
                    tracing::info!(
                        upload_id = %handle.upload_id,
                        part_number = part.part_number,
                        attempt,
                        "Part upload succeeded after retry"
                    );
                }
                Ok::<_, UploadError>(PartRecord {
                    part_number: part.part_number,
                    e_tag,
                    size: part.len,
                })
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use vidhost_storage::{FaultKind, FaultTarget, MemoryStorage, StoreCall};

    fn settings(part_size: u64) -> UploadSettings {
        UploadSettings {
            part_size,
            concurrency: 4,
            part_retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }

    fn payload(len: usize) -> Arc<dyn RandomAccessSource> {
        Arc::new(Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>()))
    }

    #[tokio::test]
    async fn small_payload_is_single_part() {
        let store = Arc::new(MemoryStorage::new());
        let coordinator = UploadCoordinator::new(store.clone(), settings(1024));

        let outcome = coordinator
            .upload("unprocessed_videos/a.mp4", "video/mp4", payload(10))
            .await
            .unwrap();
        assert_eq!(outcome.parts.len(), 1);
        assert_eq!(outcome.size, 10);
        assert_eq!(store.object("unprocessed_videos/a.mp4").unwrap().len(), 10);
    }

    #[tokio::test]
    async fn permanent_failure_aborts_once() {
        let store = Arc::new(MemoryStorage::new().with_min_part_size(4));
        store.fail(FaultTarget::Part(2), FaultKind::Permanent, None);
        let coordinator = UploadCoordinator::new(store.clone(), settings(4));

        let err = coordinator
            .upload("k.mp4", "video/mp4", payload(10))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Storage(StorageError::BackendError(_))));

        let calls = store.calls();
        let aborts = calls.iter().filter(|c| matches!(c, StoreCall::Abort { .. })).count();
        let completes = calls.iter().filter(|c| matches!(c, StoreCall::Complete { .. })).count();
        assert_eq!(aborts, 1);
        assert_eq!(completes, 0);
        assert_eq!(store.open_uploads(), 0);
    }

    #[tokio::test]
    async fn cancelled_upload_aborts_session() {
        let store = Arc::new(MemoryStorage::new().with_min_part_size(4));
        store.delay_part(2, Duration::from_secs(5));
        let coordinator = UploadCoordinator::new(store.clone(), settings(4));

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            coordinator.upload("k.mp4", "video/mp4", payload(10)),
        )
        .await;
        assert!(result.is_err());

        for _ in 0..200 {
            if store.open_uploads() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.open_uploads(), 0);

        let calls = store.calls();
        let aborts = calls.iter().filter(|c| matches!(c, StoreCall::Abort { .. })).count();
        let completes = calls.iter().filter(|c| matches!(c, StoreCall::Complete { .. })).count();
        assert_eq!(aborts, 1);
        assert_eq!(completes, 0);
    }

    #[tokio::test]
    async fn completed_upload_is_not_aborted() {
        let store = Arc::new(MemoryStorage::new().with_min_part_size(4));
        let coordinator = UploadCoordinator::new(store.clone(), settings(4));

        coordinator
            .upload("k.mp4", "video/mp4", payload(10))
            .await
            .unwrap();
        tokio::task::yield_now().await;

        let aborts = store
            .calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Abort { .. }))
            .count();
        assert_eq!(aborts, 0);
    }

    #[tokio::test]
    async fn invalid_key_rejected_before_start() {
        let store = Arc::new(MemoryStorage::new());
        let coordinator = UploadCoordinator::new(store.clone(), settings(1024));
        let err = coordinator
            .upload("../escape", "video/mp4", payload(10))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Storage(StorageError::InvalidKey(_))));
        assert!(store.calls().is_empty());
    }
}
