//! Turns upload-completed events into transcode requests.

use anyhow::anyhow;
use async_trait::async_trait;
use vidhost_broker::TranscodeRequestPublisher;
use vidhost_core::keys::video_uuid_from_source_key;
use vidhost_core::models::UploadCompletedEvent;
use vidhost_core::{JobError, JobResultExt};

use crate::context::{JobContext, JobHandler};

pub struct UploadRelayHandler {
    publisher: TranscodeRequestPublisher,
}

impl UploadRelayHandler {
    pub fn new(publisher: TranscodeRequestPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl JobHandler for UploadRelayHandler {
    type Message = UploadCompletedEvent;

    fn name(&self) -> &'static str {
        "upload-relay"
    }

    async fn handle(&self, event: UploadCompletedEvent, _ctx: &JobContext<'_>) -> Result<(), JobError> {
        let video_uuid = video_uuid_from_source_key(&event.video_path)
            .ok_or_else(|| anyhow!("object key {:?} carries no video id", event.video_path))
            .unrecoverable()?;

        self.publisher
            .publish(&event.video_path, video_uuid)
            .await
            .recoverable()?;
        tracing::debug!(
            user_id = %event.user_id,
            video_uuid = %video_uuid,
            "Upload relayed to transcoding"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use vidhost_broker::MemoryBroker;
    use vidhost_core::models::TranscodeRequest;

    fn ctx() -> JobContext<'static> {
        JobContext {
            key: None,
            delivery_count: 1,
            workspace: Path::new("/tmp"),
        }
    }

    fn event(path: &str) -> UploadCompletedEvent {
        UploadCompletedEvent {
            user_id: "7".to_string(),
            video_path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn publishes_transcode_request() {
        let broker = Arc::new(MemoryBroker::new("dlq"));
        let handler = UploadRelayHandler::new(TranscodeRequestPublisher::new(
            broker.clone(),
            "convert_video_to_hls",
        ));

        handler
            .handle(event("unprocessed_videos/abc123.mp4"), &ctx())
            .await
            .unwrap();

        let published = broker.published("convert_video_to_hls").await;
        let request: TranscodeRequest = published[0].json().unwrap();
        assert_eq!(request.uuid, "abc123");
        assert_eq!(request.video_path, "unprocessed_videos/abc123.mp4");
        assert_eq!(published[0].key, "abc123");
    }

    #[tokio::test]
    async fn key_without_id_is_unrecoverable() {
        let broker = Arc::new(MemoryBroker::new("dlq"));
        let handler = UploadRelayHandler::new(TranscodeRequestPublisher::new(broker, "t"));
        let err = handler.handle(event("unprocessed_videos/"), &ctx()).await.unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn publish_failure_is_recoverable() {
        let broker = Arc::new(MemoryBroker::new("dlq"));
        broker.fail_next_publishes(1).await;
        let handler = UploadRelayHandler::new(TranscodeRequestPublisher::new(broker, "t"));
        let err = handler
            .handle(event("unprocessed_videos/abc.mp4"), &ctx())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
