use std::path::PathBuf;
use vidhost_broker::BrokerError;
use vidhost_core::JobError;
use vidhost_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Invalid transcode request: {0}")]
    InvalidRequest(String),

    #[error("Source object {key} does not exist")]
    SourceMissing { key: String },

    #[error("Failed to download {key}: {source}")]
    Download { key: String, source: StorageError },

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Source has no readable video stream: {0}")]
    NoVideoStream(String),

    #[error("Invalid codec argument: {0}")]
    InvalidArgument(String),

    #[error("Encoding {height}p failed: {message}")]
    Encode { height: u32, message: String },

    #[error("Encoder did not produce {0}")]
    MissingOutput(PathBuf),

    #[error("Failed to upload {key}: {source}")]
    Upload { key: String, source: StorageError },

    #[error("Failed to delete source {key}: {source}")]
    Cleanup { key: String, source: StorageError },

    #[error("Failed to publish confirmation: {0}")]
    Publish(#[from] BrokerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transcode task failed: {0}")]
    Task(String),
}

impl TranscodeError {
    /// Whether redelivering the job may succeed. Only input that can never be
    /// processed is unrecoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TranscodeError::InvalidRequest(_)
            | TranscodeError::SourceMissing { .. }
            | TranscodeError::NoVideoStream(_)
            | TranscodeError::InvalidArgument(_) => false,
            TranscodeError::Upload {
                source: StorageError::InvalidKey(_),
                ..
            } => false,
            _ => true,
        }
    }

    /// Whether retrying the same file upload in place may succeed.
    pub(crate) fn is_transient_upload(&self) -> bool {
        matches!(self, TranscodeError::Upload { source, .. } if source.is_transient())
    }
}

impl From<TranscodeError> for JobError {
    fn from(err: TranscodeError) -> Self {
        if err.is_recoverable() {
            JobError::recoverable(err)
        } else {
            JobError::unrecoverable(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_is_unrecoverable() {
        let err: JobError = TranscodeError::SourceMissing {
            key: "unprocessed_videos/a.mp4".to_string(),
        }
        .into();
        assert!(!err.is_recoverable());
        assert!(!JobError::from(TranscodeError::NoVideoStream("empty".into())).is_recoverable());
    }

    #[test]
    fn infrastructure_failures_are_recoverable() {
        let err: JobError = TranscodeError::Download {
            key: "k".to_string(),
            source: StorageError::Unavailable("down".to_string()),
        }
        .into();
        assert!(err.is_recoverable());
        assert!(JobError::from(TranscodeError::Encode {
            height: 720,
            message: "killed".into()
        })
        .is_recoverable());
    }

    #[test]
    fn only_transient_uploads_retry_in_place() {
        let transient = TranscodeError::Upload {
            key: "k".into(),
            source: StorageError::Timeout {
                operation: "put",
                timeout: std::time::Duration::from_secs(1),
            },
        };
        let permanent = TranscodeError::Upload {
            key: "k".into(),
            source: StorageError::BackendError("denied".into()),
        };
        assert!(transient.is_transient_upload());
        assert!(!permanent.is_transient_upload());
    }
}
