use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::events::TranscodeRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    Downloading,
    Encoding,
    Uploading,
    Confirmed,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Received => 0,
            JobStatus::Downloading => 1,
            JobStatus::Encoding => 2,
            JobStatus::Uploading => 3,
            JobStatus::Confirmed => 4,
            JobStatus::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Confirmed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Received => "received",
            JobStatus::Downloading => "downloading",
            JobStatus::Encoding => "encoding",
            JobStatus::Uploading => "uploading",
            JobStatus::Confirmed => "confirmed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One transcode job, owned by the worker task that received it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub video_uuid: String,
    pub source_object_key: String,
    status: JobStatus,
    pub received_at: DateTime<Utc>,
}

impl TranscodeJob {
    pub fn new(video_uuid: impl Into<String>, source_object_key: impl Into<String>) -> Self {
        Self {
            video_uuid: video_uuid.into(),
            source_object_key: source_object_key.into(),
            status: JobStatus::Received,
            received_at: Utc::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Move forward through the pipeline. Backward moves and moves out of a
    /// terminal status are ignored and return `false`.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }

    pub fn fail(&mut self) -> bool {
        self.advance(JobStatus::Failed)
    }
}

impl From<&TranscodeRequest> for TranscodeJob {
    fn from(request: &TranscodeRequest) -> Self {
        TranscodeJob::new(request.uuid.clone(), request.video_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_moves_forward_only() {
        let mut job = TranscodeJob::new("abc", "unprocessed_videos/abc.mp4");
        assert_eq!(job.status(), JobStatus::Received);
        assert!(job.advance(JobStatus::Downloading));
        assert!(job.advance(JobStatus::Encoding));
        assert!(!job.advance(JobStatus::Downloading));
        assert!(job.advance(JobStatus::Uploading));
        assert!(job.advance(JobStatus::Confirmed));
        assert!(!job.fail());
        assert_eq!(job.status(), JobStatus::Confirmed);
    }

    #[test]
    fn job_can_fail_from_any_running_status() {
        let mut job = TranscodeJob::new("abc", "k");
        job.advance(JobStatus::Encoding);
        assert!(job.fail());
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn job_from_request() {
        let request = TranscodeRequest {
            video_path: "unprocessed_videos/abc.mp4".to_string(),
            uuid: "abc".to_string(),
        };
        let job = TranscodeJob::from(&request);
        assert_eq!(job.video_uuid, "abc");
        assert_eq!(job.source_object_key, "unprocessed_videos/abc.mp4");
    }
}
