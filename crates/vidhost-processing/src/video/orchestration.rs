//! Video transcoding orchestration: download → probe → encode ladder → upload HLS →
//! master playlist → delete source → confirm.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use vidhost_broker::ConfirmationPublisher;
use vidhost_core::constants::{CONTENT_TYPE_HLS_PLAYLIST, DEFAULT_SEGMENT_DURATION_SECS};
use vidhost_core::keys::{master_playlist_key, normalized_extension, rendition_file_key, validate_key};
use vidhost_core::models::{JobStatus, RenditionTask, Resolution, TranscodeJob, TranscodeRequest};
use vidhost_infra::{retry_with_backoff, BoundedPool, PoolError, RetryPolicy};
use vidhost_storage::{ObjectStore, StorageError};

use super::artifacts::{content_type_for, rendition_outputs};
use super::codec::HlsEncodeArgs;
use super::ladder::build_ladder;
use super::playlist::master_playlist;
use super::transcoder::Transcoder;
use super::TranscodeError;

#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    /// HLS target segment length in seconds.
    pub segment_duration: u32,
    /// FFmpeg processes running at the same time within one job.
    pub encode_concurrency: usize,
    /// Rendition files stored at the same time within one job.
    pub upload_concurrency: usize,
    /// Budget for one output file, including the first attempt.
    pub upload_retry: RetryPolicy,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            segment_duration: DEFAULT_SEGMENT_DURATION_SECS,
            encode_concurrency: 2,
            upload_concurrency: 8,
            upload_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeReport {
    pub video_uuid: String,
    pub renditions: Vec<Resolution>,
    /// Rendition playlists and segments, the master playlist excluded.
    pub files_uploaded: usize,
    /// A previous delivery had already stored the output; only the confirmation
    /// was published.
    pub resumed: bool,
}

/// Runs one transcode job end to end. All-or-nothing: the confirmation is only
/// published once every rendition and the master playlist are stored.
pub struct TranscodeEngine {
    store: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
    confirmations: ConfirmationPublisher,
    settings: TranscodeSettings,
}

fn validate_request(request: &TranscodeRequest) -> Result<(), TranscodeError> {
    let uuid_ok = !request.uuid.is_empty()
        && request
            .uuid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !uuid_ok {
        return Err(TranscodeError::InvalidRequest(format!(
            "video uuid {:?} is not a plain identifier",
            request.uuid
        )));
    }
    validate_key(&request.video_path).map_err(TranscodeError::InvalidRequest)
}

impl TranscodeEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        confirmations: ConfirmationPublisher,
        settings: TranscodeSettings,
    ) -> Self {
        Self {
            store,
            transcoder,
            confirmations,
            settings,
        }
    }

    pub fn settings(&self) -> &TranscodeSettings {
        &self.settings
    }

    /// Process `request` using `workspace` for the downloaded source and encoder
    /// output. The caller owns the workspace and removes it afterwards.
    #[tracing::instrument(
        skip(self, request, workspace),
        fields(video_uuid = %request.uuid, source_key = %request.video_path)
    )]
    pub async fn process(
        &self,
        request: &TranscodeRequest,
        workspace: &Path,
    ) -> Result<TranscodeReport, TranscodeError> {
        let start = Instant::now();
        validate_request(request)?;

        let mut job = TranscodeJob::from(request);
        let result = self.run(&mut job, workspace).await;
        match &result {
            Ok(report) => tracing::info!(
                renditions = report.renditions.len(),
                files = report.files_uploaded,
                resumed = report.resumed,
                duration_ms = start.elapsed().as_millis() as u64,
                "Video processing completed"
            ),
            Err(e) => {
                let failed_during = job.status();
                job.fail();
                tracing::error!(
                    status = %failed_during,
                    error = %e,
                    recoverable = e.is_recoverable(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Video processing failed"
                );
            }
        }
        result
    }

    async fn run(&self, job: &mut TranscodeJob, workspace: &Path) -> Result<TranscodeReport, TranscodeError> {
        job.advance(JobStatus::Downloading);
        let input = workspace.join(format!(
            "source{}",
            normalized_extension(&job.source_object_key)
        ));
        match self.store.download_to_file(&job.source_object_key, &input).await {
            Ok(size) => {
                tracing::info!(size_bytes = size, "Source downloaded");
            }
            Err(StorageError::NotFound(_)) => return self.resume(job).await,
            Err(source) => {
                return Err(TranscodeError::Download {
                    key: job.source_object_key.clone(),
                    source,
                })
            }
        }

        let probe = self.transcoder.probe(&input).await?;
        let renditions: Vec<RenditionTask> = build_ladder(probe.resolution())
            .into_iter()
            .map(|resolution| RenditionTask::new(&job.video_uuid, resolution))
            .collect();
        tracing::info!(
            source_resolution = %probe.resolution(),
            ladder = ?renditions.iter().map(|r| r.height).collect::<Vec<_>>(),
            "Rendition ladder selected"
        );

        job.advance(JobStatus::Encoding);
        let output_dir = workspace.join("hls");
        tokio::fs::create_dir_all(&output_dir).await?;
        self.encode_all(&input, &output_dir, &renditions).await?;

        job.advance(JobStatus::Uploading);
        let files_uploaded = self
            .upload_all(&job.video_uuid, &output_dir, &renditions)
            .await?;

        let master_key = master_playlist_key(&job.video_uuid);
        let master = Bytes::from(master_playlist(&renditions));
        self.put_with_retry(&master_key, master).await?;
        tracing::debug!(key = %master_key, "Master playlist stored");

        self.store
            .delete(&job.source_object_key)
            .await
            .map_err(|source| TranscodeError::Cleanup {
                key: job.source_object_key.clone(),
                source,
            })?;
        tracing::debug!(key = %job.source_object_key, "Source object deleted");

        self.confirmations.publish(&job.video_uuid).await?;
        job.advance(JobStatus::Confirmed);

        Ok(TranscodeReport {
            video_uuid: job.video_uuid.clone(),
            renditions: renditions.iter().map(RenditionTask::resolution).collect(),
            files_uploaded,
            resumed: false,
        })
    }

    /// The source is gone. A stored master playlist means an earlier delivery got
    /// past cleanup and only the confirmation may be missing.
    async fn resume(&self, job: &mut TranscodeJob) -> Result<TranscodeReport, TranscodeError> {
        let master_key = master_playlist_key(&job.video_uuid);
        let stored = self
            .store
            .exists(&master_key)
            .await
            .map_err(|source| TranscodeError::Download {
                key: master_key.clone(),
                source,
            })?;
        if !stored {
            return Err(TranscodeError::SourceMissing {
                key: job.source_object_key.clone(),
            });
        }

        tracing::warn!(
            master_key = %master_key,
            "Source already removed and output stored; re-sending confirmation"
        );
        self.confirmations.publish(&job.video_uuid).await?;
        job.advance(JobStatus::Confirmed);
        Ok(TranscodeReport {
            video_uuid: job.video_uuid.clone(),
            renditions: Vec::new(),
            files_uploaded: 0,
            resumed: true,
        })
    }

    async fn encode_all(
        &self,
        input: &Path,
        output_dir: &Path,
        renditions: &[RenditionTask],
    ) -> Result<(), TranscodeError> {
        let mut pool: BoundedPool<Result<(), TranscodeError>> =
            BoundedPool::new(self.settings.encode_concurrency);
        for rendition in renditions {
            let args = HlsEncodeArgs::for_rendition(
                input,
                output_dir,
                rendition,
                self.settings.segment_duration,
            );
            let transcoder = self.transcoder.clone();
            pool.spawn(async move { transcoder.encode_hls(&args).await });
        }
        pool.try_join_all().await.map_err(pool_error)?;
        Ok(())
    }

    async fn upload_all(
        &self,
        video_uuid: &str,
        output_dir: &Path,
        renditions: &[RenditionTask],
    ) -> Result<usize, TranscodeError> {
        let mut files: Vec<(String, PathBuf)> = Vec::new();
        for rendition in renditions {
            let outputs = rendition_outputs(output_dir, rendition).await?;
            let playlist = output_dir.join(rendition.playlist_name());
            if !outputs.contains(&playlist) {
                return Err(TranscodeError::MissingOutput(playlist));
            }
            for path in outputs {
                let filename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| TranscodeError::MissingOutput(path.clone()))?
                    .to_string();
                files.push((rendition_file_key(video_uuid, &filename), path));
            }
        }

        let count = files.len();
        let mut pool: BoundedPool<Result<u64, TranscodeError>> =
            BoundedPool::new(self.settings.upload_concurrency);
        for (key, path) in files {
            pool.spawn(upload_file(
                self.store.clone(),
                key,
                path,
                self.settings.upload_retry,
            ));
        }
        let sizes = pool.try_join_all().await.map_err(pool_error)?;
        tracing::info!(
            files = count,
            size_bytes = sizes.iter().sum::<u64>(),
            "Rendition files stored"
        );
        Ok(count)
    }

    async fn put_with_retry(&self, key: &str, data: Bytes) -> Result<(), TranscodeError> {
        retry_with_backoff(
            self.settings.upload_retry,
            "put_master_playlist",
            TranscodeError::is_transient_upload,
            |_| {
                let data = data.clone();
                async move {
                    self.store
                        .put(key, data, CONTENT_TYPE_HLS_PLAYLIST)
                        .await
                        .map_err(|source| TranscodeError::Upload {
                            key: key.to_string(),
                            source,
                        })
                }
            },
        )
        .await
    }
}

fn pool_error(err: PoolError<TranscodeError>) -> TranscodeError {
    match err {
        PoolError::Task(e) => e,
        PoolError::Join(e) => TranscodeError::Task(e.to_string()),
    }
}

async fn upload_file(
    store: Arc<dyn ObjectStore>,
    key: String,
    path: PathBuf,
    retry: RetryPolicy,
) -> Result<u64, TranscodeError> {
    let content_type = content_type_for(&key);
    retry_with_backoff(
        retry,
        "upload_rendition_file",
        TranscodeError::is_transient_upload,
        |_| {
            let store = store.clone();
            let key = key.clone();
            let path = path.clone();
            async move {
                store
                    .put_file(&key, &path, content_type)
                    .await
                    .map_err(|source| TranscodeError::Upload {
                        key: key.clone(),
                        source,
                    })
            }
        },
    )
    .await
}
