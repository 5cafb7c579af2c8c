//! Typed publishers for the pipeline events.
//!
//! Each publish is a single broker call; failures are returned to the caller.

use crate::{BrokerResult, MessageBroker};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use vidhost_core::keys::video_uuid_from_source_key;
use vidhost_core::models::{ConfirmationEvent, TranscodeRequest, UploadCompletedEvent};

async fn publish_json<T: Serialize>(
    broker: &dyn MessageBroker,
    topic: &str,
    key: &str,
    message: &T,
) -> BrokerResult<()> {
    let payload = Bytes::from(serde_json::to_vec(message)?);
    broker.publish(topic, key, payload).await
}

/// Announces a freshly stored source video.
#[derive(Clone)]
pub struct UploadEventPublisher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
}

impl UploadEventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    /// Keyed by the video id embedded in `object_key`.
    pub async fn publish(&self, user_id: &str, object_key: &str) -> BrokerResult<UploadCompletedEvent> {
        let event = UploadCompletedEvent {
            user_id: user_id.to_string(),
            video_path: object_key.to_string(),
        };
        let key = video_uuid_from_source_key(object_key).unwrap_or(object_key);
        publish_json(self.broker.as_ref(), &self.topic, key, &event).await?;
        tracing::info!(topic = %self.topic, key = %object_key, user_id = %user_id, "Upload completed event published");
        Ok(event)
    }
}

/// Requests an HLS conversion.
#[derive(Clone)]
pub struct TranscodeRequestPublisher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
}

impl TranscodeRequestPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub async fn publish(&self, video_path: &str, video_uuid: &str) -> BrokerResult<TranscodeRequest> {
        let request = TranscodeRequest {
            video_path: video_path.to_string(),
            uuid: video_uuid.to_string(),
        };
        publish_json(self.broker.as_ref(), &self.topic, video_uuid, &request).await?;
        tracing::info!(topic = %self.topic, video_uuid = %video_uuid, "Transcode request published");
        Ok(request)
    }
}

/// Announces that every rendition of a video is stored.
#[derive(Clone)]
pub struct ConfirmationPublisher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
}

impl ConfirmationPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub async fn publish(&self, video_uuid: &str) -> BrokerResult<()> {
        let event = ConfirmationEvent {
            uuid: video_uuid.to_string(),
        };
        publish_json(self.broker.as_ref(), &self.topic, video_uuid, &event).await?;
        tracing::info!(topic = %self.topic, video_uuid = %video_uuid, "Conversion confirmation published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBroker;

    #[tokio::test]
    async fn upload_event_keyed_by_video_id() {
        let broker = Arc::new(MemoryBroker::new("dlq"));
        let publisher = UploadEventPublisher::new(broker.clone(), "unprocessed_video_uploaded");

        publisher
            .publish("7", "unprocessed_videos/0a1b2c.mp4")
            .await
            .unwrap();

        let published = broker.published("unprocessed_video_uploaded").await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, "0a1b2c");
        let event: UploadCompletedEvent = published[0].json().unwrap();
        assert_eq!(event.user_id, "7");
        assert_eq!(event.video_path, "unprocessed_videos/0a1b2c.mp4");
    }

    #[tokio::test]
    async fn confirmation_payload() {
        let broker = Arc::new(MemoryBroker::new("dlq"));
        let publisher = ConfirmationPublisher::new(broker.clone(), "confirm_video_hls_converting");
        publisher.publish("abc").await.unwrap();

        let published = broker.published("confirm_video_hls_converting").await;
        assert_eq!(published[0].key, "abc");
        assert_eq!(published[0].payload, Bytes::from_static(br#"{"uuid":"abc"}"#));
    }

    #[tokio::test]
    async fn publish_failure_is_returned() {
        let broker = Arc::new(MemoryBroker::new("dlq"));
        broker.fail_next_publishes(1).await;
        let publisher = TranscodeRequestPublisher::new(broker.clone(), "convert_video_to_hls");
        assert!(publisher
            .publish("unprocessed_videos/abc.mp4", "abc")
            .await
            .is_err());
        assert!(broker.published("convert_video_to_hls").await.is_empty());
    }
}
