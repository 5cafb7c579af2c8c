//! In-process broker.
//!
//! Used for local development (`BROKER_BACKEND=memory`) and as the broker double in
//! tests. Each topic keeps a ready queue and the set of in-flight deliveries, so
//! redelivery, dead-lettering and prefetch bounds behave like the real thing.

use crate::traits::{BrokerError, BrokerResult, Delivery, MessageBroker};
use crate::BrokerBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    key: String,
    payload: Bytes,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct TopicState {
    ready: VecDeque<StoredMessage>,
    inflight: HashMap<String, StoredMessage>,
}

/// A message as it was handed to `publish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Bytes,
}

impl PublishedMessage {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, TopicState>,
    history: Vec<PublishedMessage>,
    failing_publishes: u32,
}

pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    next_id: AtomicU64,
    dead_letter_topic: String,
}

impl MemoryBroker {
    pub fn new(dead_letter_topic: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            dead_letter_topic: dead_letter_topic.into(),
        }
    }

    pub fn dead_letter_topic(&self) -> &str {
        &self.dead_letter_topic
    }

    /// Make the next `count` publishes fail with a transient error.
    pub async fn fail_next_publishes(&self, count: u32) {
        self.state.lock().await.failing_publishes = count;
    }

    /// Every successful publish, oldest first.
    pub async fn published(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Messages waiting to be received.
    pub async fn ready_len(&self, topic: &str) -> usize {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map_or(0, |t| t.ready.len())
    }

    /// Messages received but not yet settled.
    pub async fn inflight_len(&self, topic: &str) -> usize {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map_or(0, |t| t.inflight.len())
    }

    async fn take_inflight(&self, delivery: &Delivery) -> BrokerResult<StoredMessage> {
        let mut state = self.state.lock().await;
        state
            .topics
            .get_mut(&delivery.topic)
            .and_then(|t| t.inflight.remove(&delivery.receipt))
            .ok_or_else(|| {
                BrokerError::SettleFailed(format!(
                    "delivery {} on {} is not in flight",
                    delivery.receipt, delivery.topic
                ))
            })
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> BrokerResult<()> {
        {
            let mut state = self.state.lock().await;
            if state.failing_publishes > 0 {
                state.failing_publishes -= 1;
                return Err(BrokerError::PublishFailed(format!(
                    "injected publish failure on {}",
                    topic
                )));
            }
            let message = StoredMessage {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                key: key.to_string(),
                payload: payload.clone(),
                delivery_count: 0,
            };
            state
                .topics
                .entry(topic.to_string())
                .or_default()
                .ready
                .push_back(message);
            state.history.push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                payload,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        topic: &str,
        max_messages: usize,
        wait: Duration,
    ) -> BrokerResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            // Register before checking so a publish between the check and the wait is not missed.
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                let topic_state = state.topics.entry(topic.to_string()).or_default();
                let mut deliveries = Vec::new();
                while deliveries.len() < max_messages {
                    let Some(mut message) = topic_state.ready.pop_front() else {
                        break;
                    };
                    message.delivery_count += 1;
                    let receipt = format!("{}-{}", message.id, message.delivery_count);
                    deliveries.push(Delivery {
                        topic: topic.to_string(),
                        key: Some(message.key.clone()),
                        payload: message.payload.clone(),
                        receipt: receipt.clone(),
                        delivery_count: message.delivery_count,
                    });
                    topic_state.inflight.insert(receipt, message);
                }
                if !deliveries.is_empty() || max_messages == 0 {
                    return Ok(deliveries);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        self.take_inflight(delivery).await.map(|_| ())
    }

    async fn nack_requeue(&self, delivery: &Delivery) -> BrokerResult<()> {
        let message = self.take_inflight(delivery).await?;
        {
            let mut state = self.state.lock().await;
            state
                .topics
                .entry(delivery.topic.clone())
                .or_default()
                .ready
                .push_back(message);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()> {
        let message = self.take_inflight(delivery).await?;
        tracing::debug!(
            topic = %delivery.topic,
            dead_letter_topic = %self.dead_letter_topic,
            reason,
            "Dead-lettering message"
        );
        let dead_letter_topic = self.dead_letter_topic.clone();
        self.publish(&dead_letter_topic, &message.key, message.payload)
            .await
    }

    async fn ensure_topic(&self, topic: &str) -> BrokerResult<()> {
        self.state
            .lock()
            .await
            .topics
            .entry(topic.to_string())
            .or_default();
        Ok(())
    }

    fn backend_type(&self) -> BrokerBackend {
        BrokerBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn publish_then_receive_and_ack() {
        let broker = MemoryBroker::new("dlq");
        broker
            .publish("jobs", "abc", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let deliveries = broker.receive("jobs", 10, WAIT).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].key.as_deref(), Some("abc"));
        assert_eq!(deliveries[0].delivery_count, 1);
        assert_eq!(broker.inflight_len("jobs").await, 1);

        broker.ack(&deliveries[0]).await.unwrap();
        assert_eq!(broker.inflight_len("jobs").await, 0);
        assert_eq!(broker.ready_len("jobs").await, 0);
    }

    #[tokio::test]
    async fn nack_requeues_with_higher_delivery_count() {
        let broker = MemoryBroker::new("dlq");
        broker
            .publish("jobs", "abc", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let first = broker.receive("jobs", 1, WAIT).await.unwrap();
        broker.nack_requeue(&first[0]).await.unwrap();

        let second = broker.receive("jobs", 1, WAIT).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].delivery_count, 2);
        assert_ne!(second[0].receipt, first[0].receipt);
    }

    #[tokio::test]
    async fn dead_letter_moves_message() {
        let broker = MemoryBroker::new("dlq");
        broker
            .publish("jobs", "abc", Bytes::from_static(b"not json"))
            .await
            .unwrap();

        let deliveries = broker.receive("jobs", 1, WAIT).await.unwrap();
        broker
            .dead_letter(&deliveries[0], "malformed")
            .await
            .unwrap();

        assert_eq!(broker.ready_len("jobs").await, 0);
        assert_eq!(broker.inflight_len("jobs").await, 0);
        let dead = broker.published("dlq").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload, Bytes::from_static(b"not json"));
    }

    #[tokio::test]
    async fn receive_respects_max_messages() {
        let broker = MemoryBroker::new("dlq");
        for i in 0..4 {
            broker
                .publish("jobs", &i.to_string(), Bytes::from_static(b"{}"))
                .await
                .unwrap();
        }
        let deliveries = broker.receive("jobs", 3, WAIT).await.unwrap();
        assert_eq!(deliveries.len(), 3);
        assert_eq!(broker.ready_len("jobs").await, 1);
    }

    #[tokio::test]
    async fn receive_times_out_empty() {
        let broker = MemoryBroker::new("dlq");
        let deliveries = broker.receive("jobs", 5, WAIT).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn receive_wakes_on_publish() {
        let broker = std::sync::Arc::new(MemoryBroker::new("dlq"));
        let receiver = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.receive("jobs", 1, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker
            .publish("jobs", "k", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let deliveries = receiver.await.unwrap().unwrap();
        assert_eq!(deliveries.len(), 1);
    }

    #[tokio::test]
    async fn double_ack_is_an_error() {
        let broker = MemoryBroker::new("dlq");
        broker
            .publish("jobs", "k", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let deliveries = broker.receive("jobs", 1, WAIT).await.unwrap();
        broker.ack(&deliveries[0]).await.unwrap();
        assert!(broker.ack(&deliveries[0]).await.is_err());
    }

    #[tokio::test]
    async fn injected_publish_failures() {
        let broker = MemoryBroker::new("dlq");
        broker.fail_next_publishes(1).await;
        assert!(broker
            .publish("t", "k", Bytes::new())
            .await
            .unwrap_err()
            .is_transient());
        broker.publish("t", "k", Bytes::new()).await.unwrap();
        assert_eq!(broker.published("t").await.len(), 1);
    }
}
