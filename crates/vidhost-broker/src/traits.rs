//! Message broker abstraction

use crate::BrokerBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use vidhost_core::AppError;

/// Broker operation errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Settlement failed: {0}")]
    SettleFailed(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker call {operation} exceeded its {}ms deadline", timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BrokerError {
    /// Whether repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::PublishFailed(_)
                | BrokerError::ReceiveFailed(_)
                | BrokerError::SettleFailed(_)
                | BrokerError::Unavailable(_)
                | BrokerError::Timeout { .. }
        )
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::ConfigError(msg) => AppError::Config(msg),
            BrokerError::UnknownTopic(topic) => AppError::Config(format!("unknown topic {}", topic)),
            BrokerError::Serialization(e) => AppError::Internal(e.to_string()),
            e @ BrokerError::Unavailable(_) => AppError::UpstreamUnavailable(e.to_string()),
            e => AppError::TransientIo(e.to_string()),
        }
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Run one broker call under a deadline; expiry becomes [`BrokerError::Timeout`].
pub async fn with_deadline<T, F>(operation: &'static str, timeout: Duration, call: F) -> BrokerResult<T>
where
    F: Future<Output = BrokerResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::Timeout { operation, timeout }),
    }
}

/// One received, not yet settled message.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    /// Routing key set by the publisher, if any.
    pub key: Option<String>,
    pub payload: Bytes,
    /// Backend handle used to settle this delivery.
    pub receipt: String,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
}

/// Message broker abstraction
///
/// Delivery is at-least-once: every received message must be settled with exactly one
/// of [`ack`](MessageBroker::ack), [`nack_requeue`](MessageBroker::nack_requeue) or
/// [`dead_letter`](MessageBroker::dead_letter).
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish one message. `key` identifies the entity the message is about.
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> BrokerResult<()>;

    /// Pull up to `max_messages` deliveries, waiting at most `wait` for the first one.
    /// An empty result means nothing arrived in time.
    async fn receive(
        &self,
        topic: &str,
        max_messages: usize,
        wait: Duration,
    ) -> BrokerResult<Vec<Delivery>>;

    /// Settle as processed.
    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Make the message immediately available for redelivery.
    async fn nack_requeue(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Move the message to the dead-letter topic; it is never redelivered on its own topic.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()>;

    /// Make sure `topic` exists and is reachable (boot-time check).
    async fn ensure_topic(&self, topic: &str) -> BrokerResult<()>;

    fn backend_type(&self) -> BrokerBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BrokerError::Unavailable("down".into()).is_transient());
        assert!(!BrokerError::UnknownTopic("t".into()).is_transient());
    }

    #[test]
    fn maps_to_app_error_taxonomy() {
        let app: AppError = BrokerError::Unavailable("down".into()).into();
        assert!(matches!(app, AppError::UpstreamUnavailable(_)));
        let app: AppError = BrokerError::Timeout {
            operation: "publish",
            timeout: Duration::from_secs(5),
        }
        .into();
        assert!(matches!(app, AppError::TransientIo(_)));
    }

    #[tokio::test]
    async fn deadline_expiry_is_timeout() {
        let result: BrokerResult<()> = with_deadline("publish", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(BrokerError::Timeout {
                operation: "publish",
                ..
            })
        ));
    }
}
