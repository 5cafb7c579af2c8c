//! In-process object store.
//!
//! Used for local development (`STORAGE_BACKEND=memory`) and as the store double in
//! tests: every call is recorded, and faults or delays can be injected per operation.

use crate::traits::{validate_completion, MultipartUpload, ObjectStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;
use vidhost_core::constants::MIN_PART_SIZE_BYTES;
use vidhost_core::models::PartRecord;

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Put { key: String, size: u64 },
    Get { key: String },
    Delete { key: String },
    Start { key: String, upload_id: String },
    UploadPart { upload_id: String, part_number: u32, size: u64 },
    Complete { upload_id: String, part_numbers: Vec<u32> },
    Abort { upload_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Fails with a retryable error.
    Transient,
    /// Fails with an error that retrying cannot fix.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultTarget {
    /// `put` calls whose key contains the given text.
    Put(String),
    Get,
    Delete,
    Start,
    Part(u32),
    Complete,
    Abort,
}

#[derive(Debug)]
struct Fault {
    target: FaultTarget,
    kind: FaultKind,
    /// `None` fails forever.
    remaining: Option<u32>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    content_type: String,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<String, StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    calls: Vec<StoreCall>,
    faults: Vec<Fault>,
    part_delays: HashMap<u32, Duration>,
    unavailable: bool,
}

impl MemoryState {
    fn take_fault(&mut self, matches: impl Fn(&FaultTarget) -> bool) -> Option<FaultKind> {
        let index = self.faults.iter().position(|f| matches(&f.target))?;
        let fault = &mut self.faults[index];
        let kind = fault.kind;
        match fault.remaining.as_mut() {
            Some(n) if *n <= 1 => {
                self.faults.remove(index);
            }
            Some(n) => *n -= 1,
            None => {}
        }
        Some(kind)
    }
}

fn fault_error(kind: FaultKind, transient: StorageError) -> StorageError {
    match kind {
        FaultKind::Transient => transient,
        FaultKind::Permanent => StorageError::BackendError("injected permanent fault".to_string()),
    }
}

/// In-memory object store with multipart support.
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
    min_part_size: u64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            min_part_size: MIN_PART_SIZE_BYTES,
        }
    }

    /// Lower the minimum non-final part size so tests can use small payloads.
    pub fn with_min_part_size(mut self, min_part_size: u64) -> Self {
        self.min_part_size = min_part_size;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test thread panicked mid-call; the map is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inject a fault; `times = None` fails every matching call.
    pub fn fail(&self, target: FaultTarget, kind: FaultKind, times: Option<u32>) {
        self.lock().faults.push(Fault {
            target,
            kind,
            remaining: times,
        });
    }

    /// Make uploads of `part_number` take at least `delay`.
    pub fn delay_part(&self, part_number: u32, delay: Duration) {
        self.lock().part_delays.insert(part_number, delay);
    }

    /// Make the readiness check fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Seed an object directly, bypassing the call log.
    pub fn insert(&self, key: &str, data: impl Into<Bytes>, content_type: &str) {
        self.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().objects.get(key).map(|o| o.content_type.clone())
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Multipart sessions started but neither completed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    fn check_key(key: &str) -> StorageResult<()> {
        vidhost_core::keys::validate_key(key).map_err(StorageError::InvalidKey)
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        Self::check_key(key)?;
        let mut state = self.lock();
        state.calls.push(StoreCall::Put {
            key: key.to_string(),
            size: data.len() as u64,
        });
        if let Some(kind) =
            state.take_fault(|t| matches!(t, FaultTarget::Put(fragment) if key.contains(fragment.as_str())))
        {
            return Err(fault_error(
                kind,
                StorageError::UploadFailed(format!("injected fault for {}", key)),
            ));
        }
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Self::check_key(key)?;
        let mut state = self.lock();
        state.calls.push(StoreCall::Get {
            key: key.to_string(),
        });
        if let Some(kind) = state.take_fault(|t| *t == FaultTarget::Get) {
            return Err(fault_error(
                kind,
                StorageError::DownloadFailed(format!("injected fault for {}", key)),
            ));
        }
        state
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::check_key(key)?;
        let mut state = self.lock();
        state.calls.push(StoreCall::Delete {
            key: key.to_string(),
        });
        if let Some(kind) = state.take_fault(|t| *t == FaultTarget::Delete) {
            return Err(fault_error(
                kind,
                StorageError::DeleteFailed(format!("injected fault for {}", key)),
            ));
        }
        state.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Self::check_key(key)?;
        Ok(self.lock().objects.contains_key(key))
    }

    async fn check_ready(&self) -> StorageResult<()> {
        if self.lock().unavailable {
            return Err(StorageError::Unavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    async fn start_upload(&self, key: &str, content_type: &str) -> StorageResult<MultipartUpload> {
        Self::check_key(key)?;
        let upload_id = Uuid::new_v4().simple().to_string();
        let mut state = self.lock();
        state.calls.push(StoreCall::Start {
            key: key.to_string(),
            upload_id: upload_id.clone(),
        });
        if let Some(kind) = state.take_fault(|t| *t == FaultTarget::Start) {
            return Err(fault_error(
                kind,
                StorageError::Unavailable("injected fault on start".to_string()),
            ));
        }
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
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
        let delay = {
            let mut state = self.lock();
            state.calls.push(StoreCall::UploadPart {
                upload_id: upload.upload_id.clone(),
                part_number,
                size: data.len() as u64,
            });
            if let Some(kind) = state.take_fault(|t| *t == FaultTarget::Part(part_number)) {
                return Err(fault_error(
                    kind,
                    StorageError::UploadFailed(format!("injected fault on part {}", part_number)),
                ));
            }
            state.part_delays.get(&part_number).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        let pending = state
            .uploads
            .get_mut(&upload.upload_id)
            .ok_or_else(|| StorageError::NoSuchUpload(upload.upload_id.clone()))?;
        let e_tag = format!("\"{}\"", Uuid::new_v4().simple());
        pending.parts.insert(part_number, (e_tag.clone(), data));
        Ok(e_tag)
    }

    async fn complete_upload(&self, upload: &MultipartUpload, parts: &[PartRecord]) -> StorageResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Complete {
            upload_id: upload.upload_id.clone(),
            part_numbers: parts.iter().map(|p| p.part_number).collect(),
        });
        if let Some(kind) = state.take_fault(|t| *t == FaultTarget::Complete) {
            return Err(fault_error(
                kind,
                StorageError::Unavailable("injected fault on complete".to_string()),
            ));
        }
        validate_completion(parts, self.min_part_size)?;

        let pending = state
            .uploads
            .get(&upload.upload_id)
            .ok_or_else(|| StorageError::NoSuchUpload(upload.upload_id.clone()))?;
        let mut assembled = BytesMut::new();
        let last = parts.len() - 1;
        for (index, part) in parts.iter().enumerate() {
            let (e_tag, data) = pending.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::IncompleteUpload(format!("part {} was never uploaded", part.part_number))
            })?;
            if *e_tag != part.e_tag {
                return Err(StorageError::IncompleteUpload(format!(
                    "part {} ETag mismatch",
                    part.part_number
                )));
            }
            if index < last && (data.len() as u64) < self.min_part_size {
                return Err(StorageError::InvalidPart {
                    part_number: part.part_number,
                    size: data.len() as u64,
                    min_size: self.min_part_size,
                });
            }
            assembled.extend_from_slice(data);
        }

        if let Some(pending) = state.uploads.remove(&upload.upload_id) {
            state.objects.insert(
                pending.key,
                StoredObject {
                    data: assembled.freeze(),
                    content_type: pending.content_type,
                },
            );
        }
        Ok(())
    }

    async fn abort_upload(&self, upload: &MultipartUpload) -> StorageResult<()> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Abort {
            upload_id: upload.upload_id.clone(),
        });
        if let Some(kind) = state.take_fault(|t| *t == FaultTarget::Abort) {
            return Err(fault_error(
                kind,
                StorageError::Unavailable("injected fault on abort".to_string()),
            ));
        }
        state
            .uploads
            .remove(&upload.upload_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NoSuchUpload(upload.upload_id.clone()))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u32, e_tag: String, size: u64) -> PartRecord {
        PartRecord {
            part_number: n,
            e_tag,
            size,
        }
    }

    #[tokio::test]
    async fn multipart_assembles_parts_in_order() {
        let store = MemoryStorage::new().with_min_part_size(4);
        let upload = store.start_upload("videos/a.mp4", "video/mp4").await.unwrap();

        let e2 = store
            .upload_part(&upload, 2, Bytes::from_static(b"efgh"))
            .await
            .unwrap();
        let e1 = store
            .upload_part(&upload, 1, Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        let e3 = store
            .upload_part(&upload, 3, Bytes::from_static(b"ij"))
            .await
            .unwrap();

        store
            .complete_upload(
                &upload,
                &[record(1, e1, 4), record(2, e2, 4), record(3, e3, 2)],
            )
            .await
            .unwrap();

        assert_eq!(store.object("videos/a.mp4").unwrap(), Bytes::from_static(b"abcdefghij"));
        assert_eq!(store.content_type("videos/a.mp4").as_deref(), Some("video/mp4"));
        assert_eq!(store.open_uploads(), 0);
    }

    #[tokio::test]
    async fn complete_rejects_missing_part() {
        let store = MemoryStorage::new().with_min_part_size(1);
        let upload = store.start_upload("k", "video/mp4").await.unwrap();
        let e1 = store
            .upload_part(&upload, 1, Bytes::from_static(b"a"))
            .await
            .unwrap();
        let err = store
            .complete_upload(&upload, &[record(1, e1, 1), record(2, "x".into(), 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::IncompleteUpload(_)));
        assert!(store.object("k").is_none());
    }

    #[tokio::test]
    async fn abort_discards_session() {
        let store = MemoryStorage::new();
        let upload = store.start_upload("k", "video/mp4").await.unwrap();
        store.abort_upload(&upload).await.unwrap();
        assert_eq!(store.open_uploads(), 0);
        let err = store
            .upload_part(&upload, 1, Bytes::from_static(b"a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NoSuchUpload(_)));
    }

    #[tokio::test]
    async fn injected_fault_fires_requested_times() {
        let store = MemoryStorage::new();
        store.fail(FaultTarget::Put("seg".into()), FaultKind::Transient, Some(1));

        let first = store.put("a/seg0.ts", Bytes::from_static(b"x"), "video/MP2T").await;
        assert!(first.unwrap_err().is_transient());
        store
            .put("a/seg0.ts", Bytes::from_static(b"x"), "video/MP2T")
            .await
            .unwrap();
        store
            .put("a/other", Bytes::from_static(b"y"), "text/plain")
            .await
            .unwrap();
        assert_eq!(store.keys(), vec!["a/other".to_string(), "a/seg0.ts".to_string()]);
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let store = MemoryStorage::new();
        let err = store
            .put("../etc/passwd", Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = MemoryStorage::new();
        assert!(matches!(
            store.get("nope").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!store.exists("nope").await.unwrap());
    }
}
