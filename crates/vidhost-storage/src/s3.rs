use crate::traits::{
    validate_completion, with_deadline, MultipartUpload, ObjectStore, StorageError, StorageResult,
    StorageTimeouts,
};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use vidhost_core::constants::RENDITIONS_PREFIX;
use vidhost_core::models::PartRecord;

/// Connection settings for [`S3Storage`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible servers (e.g. "http://minio:9000").
    pub endpoint_url: Option<String>,
    /// Static `(access_key, secret_key)`; the default AWS chain is used otherwise.
    pub credentials: Option<(String, String)>,
    pub timeouts: StorageTimeouts,
    /// Install a public-read bucket policy on the rendition prefix at startup.
    pub public_renditions: bool,
}

/// S3 storage implementation (AWS S3 or any S3-compatible server such as MinIO)
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    timeouts: StorageTimeouts,
    public_renditions: bool,
}

/// Bucket policy letting anyone `GetObject` under the rendition prefix, so HLS
/// players can fetch playlists and segments straight from the bucket.
fn rendition_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": format!("arn:aws:s3:::{}/{}/*", bucket, RENDITIONS_PREFIX),
        }],
    })
    .to_string()
}

/// Map an SDK failure onto the storage taxonomy.
fn classify<E>(operation: &'static str, key: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!("{} {}: {}", operation, key, DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Unavailable(message)
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            match (status, err.code()) {
                (_, Some("NoSuchUpload")) => StorageError::NoSuchUpload(message),
                (_, Some("NoSuchKey")) | (404, _) => StorageError::NotFound(key.to_string()),
                (_, Some("InvalidPart" | "InvalidPartOrder" | "EntityTooSmall")) => {
                    StorageError::IncompleteUpload(message)
                }
                (429 | 500..=599, _) => StorageError::Unavailable(message),
                _ => StorageError::BackendError(message),
            }
        }
        _ => StorageError::BackendError(message),
    }
}

impl S3Storage {
    /// Build the client. No network call is made; use [`ObjectStore::check_ready`] for that.
    pub async fn new(settings: S3Settings) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let Some((access_key, secret_key)) = &settings.credentials {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "vidhost-static",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::standard().with_max_attempts(5));

        if let Some(endpoint) = &settings.endpoint_url {
            // S3-compatible servers generally only support path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(S3Storage {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket,
            region: settings.region,
            timeouts: settings.timeouts,
            public_renditions: settings.public_renditions,
        })
    }

    async fn create_bucket(&self) -> StorageResult<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| classify("create_bucket", &self.bucket, e))?;
        tracing::info!(bucket = %self.bucket, region = %self.region, "S3 bucket created");
        Ok(())
    }

    async fn apply_rendition_policy(&self) -> StorageResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(rendition_read_policy(&self.bucket))
            .send()
            .await
            .map_err(|e| classify("put_bucket_policy", &self.bucket, e))?;
        tracing::info!(
            bucket = %self.bucket,
            prefix = RENDITIONS_PREFIX,
            "Public read policy applied to renditions"
        );
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        let result = with_deadline("put", self.timeouts.transfer, async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| classify("put_object", key, e))
        })
        .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 put failed"
            );
            e
        })?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );
        Ok(())
    }

    async fn put_file(&self, key: &str, path: &Path, content_type: &str) -> StorageResult<u64> {
        let size = tokio::fs::metadata(path).await?.len();
        let start = std::time::Instant::now();

        with_deadline("put_file", self.timeouts.transfer, async {
            let body = ByteStream::from_path(path)
                .await
                .map_err(|e| StorageError::UploadFailed(format!("{}: {}", path.display(), e)))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .content_length(size as i64)
                .body(body)
                .send()
                .await
                .map_err(|e| classify("put_object", key, e))
        })
        .await?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 file upload successful"
        );
        Ok(size)
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let start = std::time::Instant::now();

        let data = with_deadline("get", self.timeouts.transfer, async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify("get_object", key, e))?;
            let aggregated = output
                .body
                .collect()
                .await
                .map_err(|e| StorageError::DownloadFailed(format!("{}: {}", key, e)))?;
            Ok(aggregated.into_bytes())
        })
        .await?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 get successful"
        );
        Ok(data)
    }

    async fn download_to_file(&self, key: &str, path: &Path) -> StorageResult<u64> {
        let start = std::time::Instant::now();

        let written = with_deadline("download", self.timeouts.transfer, async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify("get_object", key, e))?;

            let mut body = output.body;
            let mut file = tokio::fs::File::create(path).await?;
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| StorageError::DownloadFailed(format!("{}: {}", key, e)))?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(written)
        })
        .await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );
        Ok(written)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();

        with_deadline("delete", self.timeouts.control, async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify("delete_object", key, e))
        })
        .await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let result = with_deadline("head", self.timeouts.control, async {
            self.client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify("head_object", key, e))
        })
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn check_ready(&self) -> StorageResult<()> {
        let head = with_deadline("head_bucket", self.timeouts.control, async {
            self.client
                .head_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| classify("head_bucket", &self.bucket, e))
        })
        .await;

        match head {
            Ok(_) => {}
            Err(StorageError::NotFound(_)) => {
                with_deadline("create_bucket", self.timeouts.control, self.create_bucket()).await?
            }
            Err(e) => return Err(e),
        }

        if self.public_renditions {
            with_deadline(
                "put_bucket_policy",
                self.timeouts.control,
                self.apply_rendition_policy(),
            )
            .await?;
        }
        Ok(())
    }

    async fn start_upload(&self, key: &str, content_type: &str) -> StorageResult<MultipartUpload> {
        let output = with_deadline("start_upload", self.timeouts.control, async {
            self.client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .send()
                .await
                .map_err(|e| classify("create_multipart_upload", key, e))
        })
        .await?;

        let upload_id = output.upload_id().ok_or_else(|| {
            StorageError::BackendError(format!("create_multipart_upload {} returned no upload id", key))
        })?;

        tracing::debug!(bucket = %self.bucket, key = %key, upload_id = %upload_id, "S3 multipart upload started");
        Ok(MultipartUpload {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        })
    }

    async fn upload_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        let size = data.len();
        let start = std::time::Instant::now();

        let output = with_deadline("upload_part", self.timeouts.transfer, async {
            self.client
                .upload_part()
                .bucket(&self.bucket)
                .key(&upload.key)
                .upload_id(&upload.upload_id)
                .part_number(part_number as i32)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| classify("upload_part", &upload.key, e))
        })
        .await?;

        let e_tag = output.e_tag().ok_or_else(|| {
            StorageError::BackendError(format!("upload_part {} returned no ETag", part_number))
        })?;

        tracing::debug!(
            key = %upload.key,
            upload_id = %upload.upload_id,
            part_number,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 part uploaded"
        );
        Ok(e_tag.to_string())
    }

    async fn complete_upload(&self, upload: &MultipartUpload, parts: &[PartRecord]) -> StorageResult<()> {
        validate_completion(parts, self.min_part_size())?;

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        CompletedPart::builder()
                            .part_number(p.part_number as i32)
                            .e_tag(&p.e_tag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        with_deadline("complete_upload", self.timeouts.control, async {
            self.client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(&upload.key)
                .upload_id(&upload.upload_id)
                .multipart_upload(completed)
                .send()
                .await
                .map_err(|e| classify("complete_multipart_upload", &upload.key, e))
        })
        .await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %upload.key,
            upload_id = %upload.upload_id,
            parts = parts.len(),
            "S3 multipart upload completed"
        );
        Ok(())
    }

    async fn abort_upload(&self, upload: &MultipartUpload) -> StorageResult<()> {
        with_deadline("abort_upload", self.timeouts.control, async {
            self.client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&upload.key)
                .upload_id(&upload.upload_id)
                .send()
                .await
                .map_err(|e| classify("abort_multipart_upload", &upload.key, e))
        })
        .await?;

        tracing::info!(
            bucket = %self.bucket,
            key = %upload.key,
            upload_id = %upload.upload_id,
            "S3 multipart upload aborted"
        );
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
