//! Amazon SQS broker: one queue per topic.
//!
//! Topic names resolve to queue URLs through `GetQueueUrl` (cached). Settlement maps
//! onto SQS primitives: ack deletes the message, nack-requeue resets its visibility
//! timeout to zero, dead-letter re-sends the body to the dead-letter queue and deletes
//! the original.

use crate::traits::{with_deadline, BrokerError, BrokerResult, Delivery, MessageBroker};
use crate::BrokerBackend;
use async_trait::async_trait;
use aws_sdk_sqs::config::http::HttpResponse;
use aws_sdk_sqs::config::{Credentials, Region};
use aws_sdk_sqs::error::{DisplayErrorContext, SdkError};
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

const KEY_ATTRIBUTE: &str = "key";
const REASON_ATTRIBUTE: &str = "dead_letter_reason";
/// SQS caps a single receive at 10 messages.
const MAX_BATCH: usize = 10;
/// SQS caps long polling at 20 seconds.
const MAX_WAIT_SECS: u64 = 20;
/// SQS caps a visibility timeout at 12 hours.
const MAX_VISIBILITY_SECS: u64 = 12 * 60 * 60;

/// Connection settings for [`SqsBroker`].
#[derive(Debug, Clone)]
pub struct SqsSettings {
    pub region: String,
    /// Custom endpoint for SQS-compatible servers (e.g. "http://localstack:4566").
    pub endpoint_url: Option<String>,
    /// Static `(access_key, secret_key)`; the default AWS chain is used otherwise.
    pub credentials: Option<(String, String)>,
    pub dead_letter_topic: String,
    /// Deadline for every call except the long poll.
    pub control_timeout: Duration,
    /// Create queues that do not exist yet in [`MessageBroker::ensure_topic`].
    pub create_missing_queues: bool,
    /// How long a received message stays hidden from other consumers. Must cover
    /// the longest job, or SQS hands the message to a second worker mid-run.
    pub visibility_timeout: Duration,
}

pub struct SqsBroker {
    client: Client,
    queue_urls: RwLock<HashMap<String, String>>,
    dead_letter_topic: String,
    control_timeout: Duration,
    create_missing_queues: bool,
    visibility_timeout_secs: i32,
}

fn classify<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> BrokerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("{}: {}", operation, DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            BrokerError::Unavailable(message)
        }
        SdkError::ServiceError(service) if service.raw().status().is_server_error() => {
            BrokerError::Unavailable(message)
        }
        _ => match operation {
            "send_message" => BrokerError::PublishFailed(message),
            "receive_message" => BrokerError::ReceiveFailed(message),
            _ => BrokerError::SettleFailed(message),
        },
    }
}

fn is_fifo(queue_url: &str) -> bool {
    queue_url.ends_with(".fifo")
}

/// Whole seconds, rounded up and clamped to what SQS accepts.
fn visibility_timeout_secs(timeout: Duration) -> i32 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.clamp(1, MAX_VISIBILITY_SECS) as i32
}

fn queue_attributes(topic: &str, visibility_timeout_secs: i32) -> Vec<(QueueAttributeName, String)> {
    let mut attributes = vec![(
        QueueAttributeName::VisibilityTimeout,
        visibility_timeout_secs.to_string(),
    )];
    if topic.ends_with(".fifo") {
        attributes.push((QueueAttributeName::FifoQueue, "true".to_string()));
    }
    attributes
}

impl SqsBroker {
    pub async fn new(settings: SqsSettings) -> BrokerResult<Self> {
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
        let mut builder = aws_sdk_sqs::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            queue_urls: RwLock::new(HashMap::new()),
            dead_letter_topic: settings.dead_letter_topic,
            control_timeout: settings.control_timeout,
            create_missing_queues: settings.create_missing_queues,
            visibility_timeout_secs: visibility_timeout_secs(settings.visibility_timeout),
        })
    }

    async fn queue_url(&self, topic: &str) -> BrokerResult<String> {
        if let Some(url) = self.queue_urls.read().await.get(topic) {
            return Ok(url.clone());
        }

        let result = with_deadline("get_queue_url", self.control_timeout, async {
            self.client
                .get_queue_url()
                .queue_name(topic)
                .send()
                .await
                .map_err(|e| {
                    if e.as_service_error()
                        .map(|se| se.is_queue_does_not_exist())
                        .unwrap_or(false)
                    {
                        BrokerError::UnknownTopic(topic.to_string())
                    } else {
                        classify("get_queue_url", e)
                    }
                })
        })
        .await?;

        let url = result
            .queue_url()
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?
            .to_string();
        self.queue_urls
            .write()
            .await
            .insert(topic.to_string(), url.clone());
        Ok(url)
    }

    async fn create_queue(&self, topic: &str) -> BrokerResult<String> {
        let mut request = self.client.create_queue().queue_name(topic);
        for (name, value) in queue_attributes(topic, self.visibility_timeout_secs) {
            request = request.attributes(name, value);
        }
        let output = with_deadline("create_queue", self.control_timeout, async {
            request.send().await.map_err(|e| classify("create_queue", e))
        })
        .await?;
        let url = output
            .queue_url()
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?
            .to_string();
        tracing::info!(topic = %topic, queue_url = %url, "SQS queue created");
        self.queue_urls
            .write()
            .await
            .insert(topic.to_string(), url.clone());
        Ok(url)
    }

    async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &Bytes,
        reason: Option<&str>,
    ) -> BrokerResult<()> {
        let queue_url = self.queue_url(topic).await?;
        let body = std::str::from_utf8(payload)
            .map_err(|e| BrokerError::PublishFailed(format!("payload is not UTF-8: {}", e)))?
            .to_string();

        let key_attribute = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(key)
            .build()
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))?;

        let mut request = self
            .client
            .send_message()
            .queue_url(&queue_url)
            .message_body(body)
            .message_attributes(KEY_ATTRIBUTE, key_attribute);

        if let Some(reason) = reason {
            let reason_attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(reason)
                .build()
                .map_err(|e| BrokerError::PublishFailed(e.to_string()))?;
            request = request.message_attributes(REASON_ATTRIBUTE, reason_attribute);
        }

        if is_fifo(&queue_url) {
            request = request
                .message_group_id(key)
                .message_deduplication_id(Uuid::new_v4().simple().to_string());
        }

        with_deadline("publish", self.control_timeout, async {
            request
                .send()
                .await
                .map_err(|e| classify("send_message", e))
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, delivery: &Delivery) -> BrokerResult<()> {
        let queue_url = self.queue_url(&delivery.topic).await?;
        with_deadline("ack", self.control_timeout, async {
            self.client
                .delete_message()
                .queue_url(&queue_url)
                .receipt_handle(&delivery.receipt)
                .send()
                .await
                .map_err(|e| classify("delete_message", e))
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for SqsBroker {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> BrokerResult<()> {
        self.send(topic, key, &payload, None).await?;
        tracing::debug!(topic = %topic, key = %key, size_bytes = payload.len(), "Message published");
        Ok(())
    }

    async fn receive(
        &self,
        topic: &str,
        max_messages: usize,
        wait: Duration,
    ) -> BrokerResult<Vec<Delivery>> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let queue_url = self.queue_url(topic).await?;
        let wait_secs = wait.as_secs().min(MAX_WAIT_SECS);

        let output = with_deadline(
            "receive",
            Duration::from_secs(wait_secs) + self.control_timeout,
            async {
                self.client
                    .receive_message()
                    .queue_url(&queue_url)
                    .max_number_of_messages(max_messages.min(MAX_BATCH) as i32)
                    .wait_time_seconds(wait_secs as i32)
                    .visibility_timeout(self.visibility_timeout_secs)
                    .message_attribute_names(KEY_ATTRIBUTE)
                    .message_system_attribute_names(
                        MessageSystemAttributeName::ApproximateReceiveCount,
                    )
                    .send()
                    .await
                    .map_err(|e| classify("receive_message", e))
            },
        )
        .await?;

        let deliveries = output
            .messages()
            .iter()
            .filter_map(|message| {
                let receipt = message.receipt_handle()?.to_string();
                let key = message
                    .message_attributes()
                    .and_then(|attrs| attrs.get(KEY_ATTRIBUTE))
                    .and_then(|value| value.string_value())
                    .map(String::from);
                let delivery_count = message
                    .attributes()
                    .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                    .and_then(|count| count.parse().ok())
                    .unwrap_or(1);
                Some(Delivery {
                    topic: topic.to_string(),
                    key,
                    payload: Bytes::from(message.body().unwrap_or_default().to_string()),
                    receipt,
                    delivery_count,
                })
            })
            .collect();
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        self.delete(delivery).await
    }

    async fn nack_requeue(&self, delivery: &Delivery) -> BrokerResult<()> {
        let queue_url = self.queue_url(&delivery.topic).await?;
        with_deadline("nack", self.control_timeout, async {
            self.client
                .change_message_visibility()
                .queue_url(&queue_url)
                .receipt_handle(&delivery.receipt)
                .visibility_timeout(0)
                .send()
                .await
                .map_err(|e| classify("change_message_visibility", e))
        })
        .await?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()> {
        let key = delivery.key.as_deref().unwrap_or("unknown");
        self.send(&self.dead_letter_topic, key, &delivery.payload, Some(reason))
            .await?;
        self.delete(delivery).await?;
        tracing::warn!(
            topic = %delivery.topic,
            dead_letter_topic = %self.dead_letter_topic,
            reason,
            "Message moved to dead-letter queue"
        );
        Ok(())
    }

    async fn ensure_topic(&self, topic: &str) -> BrokerResult<()> {
        match self.queue_url(topic).await {
            Ok(_) => Ok(()),
            Err(BrokerError::UnknownTopic(_)) if self.create_missing_queues => {
                self.create_queue(topic).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    fn backend_type(&self) -> BrokerBackend {
        BrokerBackend::Sqs
    }
}
