//! Job execution error types
//!
//! A queue job fails either recoverably (the message is negatively acknowledged and
//! redelivered) or unrecoverably (the message is dead-lettered). Only permanently
//! malformed input should be unrecoverable.

use std::fmt;

/// Job execution error that can be either recoverable or unrecoverable
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    /// Create an unrecoverable job error.
    ///
    /// The delivery is dead-lettered instead of requeued. Use this for input that will
    /// never succeed no matter how often it is redelivered, such as an event whose
    /// object key carries no video id.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Create a recoverable job error.
    ///
    /// The delivery is requeued and processed again. Use this for store or broker
    /// outages, deadline expiry, and codec failures.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    /// Check if this error is recoverable (should be requeued)
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Get the inner error
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Consume self and return the inner error
    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Default conversion from anyhow::Error creates a recoverable error
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Extension trait for Result to classify job errors
pub trait JobResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, JobError>;

    /// Mark this result as recoverable on error
    fn recoverable(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::unrecoverable(e.into()))
    }

    fn recoverable(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::recoverable(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecoverable_error() {
        let err = JobError::unrecoverable(anyhow::anyhow!("object key has no stem"));
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("object key has no stem"));
    }

    #[test]
    fn test_recoverable_error() {
        let err = JobError::recoverable(anyhow::anyhow!("Network timeout"));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("Network timeout"));
    }

    #[test]
    fn test_from_anyhow() {
        let err: JobError = anyhow::anyhow!("Some error").into();
        assert!(err.is_recoverable(), "Default should be recoverable");
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), anyhow::Error> = Err(anyhow::anyhow!("bad payload"));
        let job_result = result.unrecoverable();
        assert!(!job_result.unwrap_err().is_recoverable());

        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(result.recoverable().unwrap_err().is_recoverable());
    }
}
