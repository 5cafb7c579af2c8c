use thiserror::Error;
use vidhost_core::models::SessionError;
use vidhost_core::AppError;
use vidhost_storage::StorageError;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Refusing to upload an empty payload")]
    EmptySource,

    #[error("Payload exceeds the {limit} byte upload limit")]
    TooLarge { limit: u64 },

    #[error("Part size {part_size} is below the store minimum of {min_size} bytes")]
    PartSizeBelowMinimum { part_size: u64, min_size: u64 },

    #[error("Upload would need {parts} parts, more than the {max} allowed")]
    TooManyParts { parts: u64, max: u32 },

    #[error("Failed to read the upload source: {0}")]
    Source(#[from] std::io::Error),

    #[error("Failed to buffer the request body: {0}")]
    Body(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Upload session violation: {0}")]
    Session(#[from] SessionError),

    #[error("Part task failed: {0}")]
    Task(String),
}

impl UploadError {
    /// Whether retrying the part that produced this error may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Storage(e) => e.is_transient(),
            UploadError::Source(_) => true,
            _ => false,
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::EmptySource => AppError::InvalidInput(err.to_string()),
            UploadError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            UploadError::Body(_) => AppError::InvalidInput(err.to_string()),
            UploadError::TooManyParts { .. } => AppError::InvalidInput(err.to_string()),
            UploadError::PartSizeBelowMinimum { .. } | UploadError::Session(_) => {
                AppError::StoreProtocol(err.to_string())
            }
            UploadError::Source(_) => AppError::TransientIo(err.to_string()),
            UploadError::Storage(e) => e.into(),
            UploadError::Task(_) => AppError::Internal(err.to_string()),
        }
    }
}
