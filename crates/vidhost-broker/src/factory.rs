use crate::{BrokerBackend, BrokerError, BrokerResult, MemoryBroker, MessageBroker};
use std::sync::Arc;
use vidhost_core::Config;

/// Create a message broker based on configuration
pub async fn create_broker(config: &Config) -> BrokerResult<Arc<dyn MessageBroker>> {
    match config.broker_backend() {
        #[cfg(feature = "broker-sqs")]
        BrokerBackend::Sqs => {
            let region = config
                .sqs_region()
                .map(String::from)
                .ok_or_else(|| {
                    BrokerError::ConfigError("SQS_REGION or AWS_REGION not configured".to_string())
                })?;

            let broker = crate::SqsBroker::new(crate::SqsSettings {
                region,
                endpoint_url: config.sqs_endpoint().map(String::from),
                // SQS always resolves credentials through the default AWS chain.
                credentials: None,
                dead_letter_topic: config.dead_letter_topic().to_string(),
                control_timeout: config.control_timeout(),
                create_missing_queues: !config.is_production(),
                visibility_timeout: config.job_timeout() + config.control_timeout(),
            })
            .await?;
            Ok(Arc::new(broker))
        }

        #[cfg(not(feature = "broker-sqs"))]
        BrokerBackend::Sqs => Err(BrokerError::ConfigError(
            "SQS broker not available (broker-sqs feature not enabled)".to_string(),
        )),

        BrokerBackend::Memory => {
            tracing::warn!("Using in-memory broker; messages are lost on restart and not shared between processes");
            Ok(Arc::new(MemoryBroker::new(config.dead_letter_topic())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidhost_core::config::ServiceConfig;

    #[tokio::test]
    async fn builds_memory_broker() {
        let config = Config::from_parts(ServiceConfig {
            broker_backend: BrokerBackend::Memory,
            ..ServiceConfig::default()
        });
        let broker = create_broker(&config).await.unwrap();
        assert_eq!(broker.backend_type(), BrokerBackend::Memory);
        broker.ensure_topic("convert_video_to_hls").await.unwrap();
    }
}
