//! Environment configuration.
//!
//! Values are read once at startup (`.env` is honored through dotenvy). A missing or
//! invalid required value makes [`Config::from_env`] or [`Config::validate`] fail and
//! the binary exits non-zero.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::{BrokerBackend, StorageBackend};
use crate::constants::{DEFAULT_PART_SIZE_BYTES, DEFAULT_SEGMENT_DURATION_SECS, MIN_PART_SIZE_BYTES};

/// All settings shared by the API and the worker.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub environment: String,
    pub server_port: u16,
    pub worker_port: u16,
    pub log_format: String,
    /// Requests served at once by the API before new ones queue.
    pub http_concurrency_limit: usize,

    // Object storage
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub aws_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub local_storage_path: Option<String>,
    /// Grant anonymous read on `video_files/*` so players can stream renditions.
    pub s3_public_renditions: bool,

    // Message broker
    pub broker_backend: BrokerBackend,
    pub sqs_endpoint: Option<String>,
    pub sqs_region: Option<String>,
    pub upload_completed_topic: String,
    pub transcode_topic: String,
    pub confirmation_topic: String,
    pub dead_letter_topic: String,

    // Uploads
    pub upload_part_size_bytes: u64,
    pub upload_part_concurrency: usize,
    pub upload_spool_threshold_bytes: u64,
    pub max_upload_size_bytes: u64,
    pub part_retry_attempts: u32,

    // Workers
    pub worker_concurrency: usize,
    pub rendition_upload_concurrency: usize,
    pub encode_concurrency: usize,
    pub job_timeout_secs: u64,
    pub relay_upload_events: bool,
    pub work_dir: Option<String>,

    // Deadlines
    pub control_timeout_secs: u64,
    pub transfer_timeout_secs: u64,

    // Codec
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub hls_segment_duration: u32,

    // Auth collaborator
    pub auth_service_url: String,
    pub auth_timeout_secs: u64,
    pub auth_disabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server_port: 8080,
            worker_port: 8090,
            log_format: "text".to_string(),
            http_concurrency_limit: 10_000,
            storage_backend: StorageBackend::S3,
            s3_bucket: None,
            s3_region: None,
            aws_region: None,
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            local_storage_path: None,
            s3_public_renditions: true,
            broker_backend: BrokerBackend::Sqs,
            sqs_endpoint: None,
            sqs_region: None,
            upload_completed_topic: "unprocessed_video_uploaded".to_string(),
            transcode_topic: "convert_video_to_hls".to_string(),
            confirmation_topic: "confirm_video_hls_converting".to_string(),
            dead_letter_topic: "video_dead_letter".to_string(),
            upload_part_size_bytes: DEFAULT_PART_SIZE_BYTES,
            upload_part_concurrency: 4,
            upload_spool_threshold_bytes: 64 * 1024 * 1024,
            max_upload_size_bytes: 10 * 1024 * 1024 * 1024,
            part_retry_attempts: 3,
            worker_concurrency: 5,
            rendition_upload_concurrency: 8,
            encode_concurrency: 2,
            job_timeout_secs: 3600,
            relay_upload_events: true,
            work_dir: None,
            control_timeout_secs: 5,
            transfer_timeout_secs: 120,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            hls_segment_duration: DEFAULT_SEGMENT_DURATION_SECS,
            auth_service_url: "http://auth_service:8000/auth/token".to_string(),
            auth_timeout_secs: 3,
            auth_disabled: false,
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_opt(name)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env_opt(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = ServiceConfig::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or(defaults.environment);

        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(raw) => raw.parse::<StorageBackend>().map_err(anyhow::Error::msg)?,
            None => defaults.storage_backend,
        };
        let broker_backend = match env_opt("BROKER_BACKEND") {
            Some(raw) => raw.parse::<BrokerBackend>().map_err(anyhow::Error::msg)?,
            None => defaults.broker_backend,
        };

        // VIDEO_POSTPROCESS_WORKERS is the name older deployments use.
        let worker_concurrency = env_opt("WORKER_CONCURRENCY")
            .or_else(|| env_opt("VIDEO_POSTPROCESS_WORKERS"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(defaults.worker_concurrency);

        Ok(Self {
            environment,
            server_port: env_or("PORT", defaults.server_port),
            worker_port: env_or("WORKER_PORT", defaults.worker_port),
            log_format: env_opt("LOG_FORMAT").unwrap_or(defaults.log_format),
            http_concurrency_limit: env_or("HTTP_CONCURRENCY_LIMIT", defaults.http_concurrency_limit),
            storage_backend,
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION"),
            aws_region: env_opt("AWS_REGION"),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            s3_access_key: env_opt("S3_ACCESS_KEY"),
            s3_secret_key: env_opt("S3_SECRET_KEY"),
            local_storage_path: env_opt("LOCAL_STORAGE_PATH"),
            s3_public_renditions: env_bool("S3_PUBLIC_RENDITIONS", defaults.s3_public_renditions),
            broker_backend,
            sqs_endpoint: env_opt("SQS_ENDPOINT"),
            sqs_region: env_opt("SQS_REGION"),
            upload_completed_topic: env_opt("UPLOAD_COMPLETED_TOPIC")
                .unwrap_or(defaults.upload_completed_topic),
            transcode_topic: env_opt("TRANSCODE_TOPIC").unwrap_or(defaults.transcode_topic),
            confirmation_topic: env_opt("CONFIRMATION_TOPIC")
                .unwrap_or(defaults.confirmation_topic),
            dead_letter_topic: env_opt("DEAD_LETTER_TOPIC").unwrap_or(defaults.dead_letter_topic),
            upload_part_size_bytes: env_or("UPLOAD_PART_SIZE_BYTES", defaults.upload_part_size_bytes),
            upload_part_concurrency: env_or(
                "UPLOAD_PART_CONCURRENCY",
                defaults.upload_part_concurrency,
            ),
            upload_spool_threshold_bytes: env_or(
                "UPLOAD_SPOOL_THRESHOLD_BYTES",
                defaults.upload_spool_threshold_bytes,
            ),
            max_upload_size_bytes: env_or("MAX_UPLOAD_SIZE_BYTES", defaults.max_upload_size_bytes),
            part_retry_attempts: env_or("PART_RETRY_ATTEMPTS", defaults.part_retry_attempts),
            worker_concurrency,
            rendition_upload_concurrency: env_or(
                "RENDITION_UPLOAD_CONCURRENCY",
                defaults.rendition_upload_concurrency,
            ),
            encode_concurrency: env_or("ENCODE_CONCURRENCY", defaults.encode_concurrency),
            job_timeout_secs: env_or("JOB_TIMEOUT_SECS", defaults.job_timeout_secs),
            relay_upload_events: env_bool("RELAY_UPLOAD_EVENTS", defaults.relay_upload_events),
            work_dir: env_opt("WORK_DIR"),
            control_timeout_secs: env_or("CONTROL_TIMEOUT_SECS", defaults.control_timeout_secs),
            transfer_timeout_secs: env_or("TRANSFER_TIMEOUT_SECS", defaults.transfer_timeout_secs),
            ffmpeg_path: env_opt("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: env_opt("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
            hls_segment_duration: env_or("HLS_SEGMENT_DURATION", defaults.hls_segment_duration),
            auth_service_url: env_opt("AUTH_SERVICE_URL").unwrap_or(defaults.auth_service_url),
            auth_timeout_secs: env_or("AUTH_TIMEOUT_SECS", defaults.auth_timeout_secs),
            auth_disabled: env_bool("AUTH_DISABLED", defaults.auth_disabled),
        })
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!("S3_BUCKET is required for the s3 storage backend"));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION is required for the s3 storage backend"
                    ));
                }
                if self.upload_part_size_bytes < MIN_PART_SIZE_BYTES {
                    return Err(anyhow::anyhow!(
                        "UPLOAD_PART_SIZE_BYTES must be at least {} bytes for S3",
                        MIN_PART_SIZE_BYTES
                    ));
                }
                if self.s3_access_key.is_some() != self.s3_secret_key.is_some() {
                    return Err(anyhow::anyhow!(
                        "S3_ACCESS_KEY and S3_SECRET_KEY must be set together"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH is required for the local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "The memory storage backend cannot be used in production"
                    ));
                }
            }
        }

        if self.broker_backend == BrokerBackend::Memory && self.is_production() {
            return Err(anyhow::anyhow!(
                "The memory broker backend cannot be used in production"
            ));
        }

        if self.upload_part_size_bytes == 0 {
            return Err(anyhow::anyhow!("UPLOAD_PART_SIZE_BYTES must be greater than 0"));
        }

        for (name, value) in [
            ("UPLOAD_PART_CONCURRENCY", self.upload_part_concurrency),
            ("WORKER_CONCURRENCY", self.worker_concurrency),
            ("RENDITION_UPLOAD_CONCURRENCY", self.rendition_upload_concurrency),
            ("ENCODE_CONCURRENCY", self.encode_concurrency),
            ("HTTP_CONCURRENCY_LIMIT", self.http_concurrency_limit),
        ] {
            if value == 0 {
                return Err(anyhow::anyhow!("{} must be greater than 0", name));
            }
        }

        for (name, value) in [
            ("CONTROL_TIMEOUT_SECS", self.control_timeout_secs),
            ("TRANSFER_TIMEOUT_SECS", self.transfer_timeout_secs),
            ("JOB_TIMEOUT_SECS", self.job_timeout_secs),
            ("AUTH_TIMEOUT_SECS", self.auth_timeout_secs),
        ] {
            if value == 0 {
                return Err(anyhow::anyhow!("{} must be greater than 0", name));
            }
        }

        if self.hls_segment_duration == 0 {
            return Err(anyhow::anyhow!("HLS_SEGMENT_DURATION must be greater than 0"));
        }

        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_BYTES must be greater than 0"));
        }

        if self.auth_disabled && self.is_production() {
            return Err(anyhow::anyhow!("AUTH_DISABLED cannot be set in production"));
        }

        Ok(())
    }
}

/// Shared, immutable configuration handle.
#[derive(Debug, Clone)]
pub struct Config(Box<ServiceConfig>);

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ServiceConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn from_parts(config: ServiceConfig) -> Self {
        Config(Box::new(config))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.0.validate()
    }

    pub fn inner(&self) -> &ServiceConfig {
        &self.0
    }

    pub fn environment(&self) -> &str {
        &self.0.environment
    }

    pub fn is_production(&self) -> bool {
        self.0.is_production()
    }

    pub fn server_port(&self) -> u16 {
        self.0.server_port
    }

    pub fn worker_port(&self) -> u16 {
        self.0.worker_port
    }

    pub fn log_format(&self) -> &str {
        &self.0.log_format
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.0.http_concurrency_limit
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.0.storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.0.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.0.s3_region.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.0.aws_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.0.s3_endpoint.as_deref()
    }

    /// Static credentials, when both halves are configured.
    pub fn s3_credentials(&self) -> Option<(&str, &str)> {
        match (&self.0.s3_access_key, &self.0.s3_secret_key) {
            (Some(access), Some(secret)) => Some((access.as_str(), secret.as_str())),
            _ => None,
        }
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.0.local_storage_path.as_deref()
    }

    pub fn s3_public_renditions(&self) -> bool {
        self.0.s3_public_renditions
    }

    pub fn broker_backend(&self) -> BrokerBackend {
        self.0.broker_backend
    }

    pub fn sqs_endpoint(&self) -> Option<&str> {
        self.0.sqs_endpoint.as_deref()
    }

    /// SQS region, falling back to the storage region settings.
    pub fn sqs_region(&self) -> Option<&str> {
        self.0
            .sqs_region
            .as_deref()
            .or(self.0.aws_region.as_deref())
            .or(self.0.s3_region.as_deref())
    }

    pub fn upload_completed_topic(&self) -> &str {
        &self.0.upload_completed_topic
    }

    pub fn transcode_topic(&self) -> &str {
        &self.0.transcode_topic
    }

    pub fn confirmation_topic(&self) -> &str {
        &self.0.confirmation_topic
    }

    pub fn dead_letter_topic(&self) -> &str {
        &self.0.dead_letter_topic
    }

    pub fn upload_part_size_bytes(&self) -> u64 {
        self.0.upload_part_size_bytes
    }

    pub fn upload_part_concurrency(&self) -> usize {
        self.0.upload_part_concurrency
    }

    pub fn upload_spool_threshold_bytes(&self) -> u64 {
        self.0.upload_spool_threshold_bytes
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.0.max_upload_size_bytes
    }

    pub fn part_retry_attempts(&self) -> u32 {
        self.0.part_retry_attempts
    }

    pub fn worker_concurrency(&self) -> usize {
        self.0.worker_concurrency
    }

    pub fn rendition_upload_concurrency(&self) -> usize {
        self.0.rendition_upload_concurrency
    }

    pub fn encode_concurrency(&self) -> usize {
        self.0.encode_concurrency
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.0.job_timeout_secs)
    }

    pub fn relay_upload_events(&self) -> bool {
        self.0.relay_upload_events
    }

    pub fn work_dir(&self) -> Option<&str> {
        self.0.work_dir.as_deref()
    }

    /// Deadline for control-plane calls (start/complete/abort/delete/publish/ack).
    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.0.control_timeout_secs)
    }

    /// Deadline for data-transfer calls (part upload, get, put).
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.0.transfer_timeout_secs)
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.0.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &str {
        &self.0.ffprobe_path
    }

    pub fn hls_segment_duration(&self) -> u32 {
        self.0.hls_segment_duration
    }

    pub fn auth_service_url(&self) -> &str {
        &self.0.auth_service_url
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.0.auth_timeout_secs)
    }

    pub fn auth_disabled(&self) -> bool {
        self.0.auth_disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_config() -> ServiceConfig {
        ServiceConfig {
            s3_bucket: Some("videos".to_string()),
            s3_region: Some("us-east-1".to_string()),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.worker_concurrency, 5);
        assert_eq!(config.upload_part_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.hls_segment_duration, 5);
        assert_eq!(config.control_timeout_secs, 5);
        assert_eq!(config.auth_timeout_secs, 3);
        assert_eq!(config.http_concurrency_limit, 10_000);
        assert!(config.s3_public_renditions);
    }

    #[test]
    fn zero_http_concurrency_is_rejected() {
        let config = ServiceConfig {
            http_concurrency_limit: 0,
            ..s3_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn s3_requires_bucket_and_region() {
        assert!(s3_config().validate().is_ok());

        let missing_bucket = ServiceConfig {
            s3_bucket: None,
            ..s3_config()
        };
        assert!(missing_bucket.validate().is_err());

        let missing_region = ServiceConfig {
            s3_region: None,
            ..s3_config()
        };
        assert!(missing_region.validate().is_err());
    }

    #[test]
    fn s3_rejects_parts_below_store_minimum() {
        let config = ServiceConfig {
            upload_part_size_bytes: 1024,
            ..s3_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_worker_concurrency_is_rejected() {
        let config = ServiceConfig {
            worker_concurrency: 0,
            ..s3_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("WORKER_CONCURRENCY"));
    }

    #[test]
    fn auth_cannot_be_disabled_in_production() {
        let config = ServiceConfig {
            environment: "production".to_string(),
            auth_disabled: true,
            ..s3_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn memory_backends_are_dev_only() {
        let config = ServiceConfig {
            storage_backend: StorageBackend::Memory,
            broker_backend: BrokerBackend::Memory,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_ok());

        let prod = ServiceConfig {
            environment: "prod".to_string(),
            ..config
        };
        assert!(prod.validate().is_err());
    }

    #[test]
    fn sqs_region_falls_back_to_storage_region() {
        let config = Config::from_parts(s3_config());
        assert_eq!(config.sqs_region(), Some("us-east-1"));
    }
}
