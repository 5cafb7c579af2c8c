//! Broker consumer pool: bounded workers, settlement and graceful drain.
//!
//! Exactly `max_workers` jobs run at once. The receive loop takes a worker permit
//! *before* pulling from the broker and asks for at most as many messages as it holds
//! permits, so no more than `max_workers` deliveries are ever unacknowledged.
//!
//! Shutdown: once the [`ShutdownSignal`] fires the loop stops receiving and
//! [`JobConsumerPool::run`] returns only after every in-flight job has been settled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use vidhost_broker::{Delivery, MessageBroker};
use vidhost_core::keys::sanitize_filename;
use vidhost_core::JobError;
use vidhost_infra::ShutdownSignal;

use crate::context::{JobContext, JobHandler};

/// How a delivery was settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Requeued,
    DeadLettered,
}

#[derive(Debug, Clone)]
pub struct JobConsumerConfig {
    pub topic: String,
    pub max_workers: usize,
    pub job_timeout: Duration,
    /// Long-poll duration of one receive call.
    pub receive_wait: Duration,
    /// Pause after a failed receive.
    pub error_backoff: Duration,
    /// Parent directory of job workspaces; the system temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

impl JobConsumerConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }
}

impl Default for JobConsumerConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            max_workers: 5,
            job_timeout: Duration::from_secs(3600),
            receive_wait: Duration::from_secs(20),
            error_backoff: Duration::from_secs(1),
            work_dir: None,
        }
    }
}

pub struct JobConsumerPool<H: JobHandler> {
    broker: Arc<dyn MessageBroker>,
    handler: Arc<H>,
    config: JobConsumerConfig,
}

impl<H: JobHandler> JobConsumerPool<H> {
    pub fn new(broker: Arc<dyn MessageBroker>, handler: Arc<H>, config: JobConsumerConfig) -> Self {
        Self {
            broker,
            handler,
            config,
        }
    }

    /// Consume until `shutdown` fires, then drain in-flight jobs.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let max_workers = self.config.max_workers.max(1);
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut jobs: JoinSet<Settlement> = JoinSet::new();

        tracing::info!(
            handler = self.handler.name(),
            topic = %self.config.topic,
            max_workers,
            "Job consumer pool started"
        );

        loop {
            while let Some(finished) = jobs.try_join_next() {
                log_join_result(finished);
            }

            let first = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let mut permits = vec![first];
            while let Ok(permit) = semaphore.clone().try_acquire_owned() {
                permits.push(permit);
            }

            let received = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                received = self.broker.receive(&self.config.topic, permits.len(), self.config.receive_wait) => received,
            };

            match received {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        let Some(permit) = permits.pop() else {
                            tracing::warn!(topic = %self.config.topic, "Broker returned more deliveries than requested");
                            settle_requeue(self.broker.as_ref(), &delivery).await;
                            continue;
                        };
                        jobs.spawn(process_delivery(
                            self.broker.clone(),
                            self.handler.clone(),
                            self.config.clone(),
                            delivery,
                            permit,
                        ));
                    }
                }
                Err(e) => {
                    drop(permits);
                    tracing::warn!(
                        topic = %self.config.topic,
                        error = %e,
                        backoff_ms = self.config.error_backoff.as_millis() as u64,
                        "Failed to receive deliveries"
                    );
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        tracing::info!(
            handler = self.handler.name(),
            in_flight = jobs.len(),
            "Job consumer pool draining"
        );
        while let Some(finished) = jobs.join_next().await {
            log_join_result(finished);
        }
        tracing::info!(handler = self.handler.name(), "Job consumer pool stopped");
    }
}

fn log_join_result(result: Result<Settlement, tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Job task panicked");
    }
}

/// Decode, run and settle one delivery. The permit is held until settlement.
#[tracing::instrument(
    skip_all,
    fields(
        handler = handler.name(),
        topic = %delivery.topic,
        key = delivery.key.as_deref().unwrap_or(""),
        delivery_count = delivery.delivery_count
    )
)]
pub(crate) async fn process_delivery<H: JobHandler>(
    broker: Arc<dyn MessageBroker>,
    handler: Arc<H>,
    config: JobConsumerConfig,
    delivery: Delivery,
    permit: OwnedSemaphorePermit,
) -> Settlement {
    let _permit = permit;
    let start = Instant::now();

    let message = match serde_json::from_slice::<H::Message>(&delivery.payload) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed job payload");
            return settle_dead_letter(broker.as_ref(), &delivery, &format!("malformed payload: {}", e)).await;
        }
    };

    let workspace = match job_workspace(handler.name(), &delivery, config.work_dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create job workspace");
            return settle_requeue(broker.as_ref(), &delivery).await;
        }
    };

    let ctx = JobContext {
        key: delivery.key.as_deref(),
        delivery_count: delivery.delivery_count,
        workspace: workspace.path(),
    };

    let result = tokio::time::timeout(config.job_timeout, handler.handle(message, &ctx)).await;
    let settlement = match result {
        Ok(Ok(())) => {
            tracing::info!(duration_ms = start.elapsed().as_millis() as u64, "Job completed");
            match broker.ack(&delivery).await {
                Ok(()) => Settlement::Acked,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to ack delivery; it will be redelivered");
                    Settlement::Requeued
                }
            }
        }
        Ok(Err(e)) => settle_failure(broker.as_ref(), &delivery, e).await,
        Err(_) => {
            tracing::error!(
                timeout_secs = config.job_timeout.as_secs(),
                "Job timed out"
            );
            settle_requeue(broker.as_ref(), &delivery).await
        }
    };

    // Removing the workspace can be slow for large encodes.
    match tokio::task::spawn_blocking(move || workspace.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to remove job workspace"),
        Err(e) => tracing::warn!(error = %e, "Workspace cleanup task failed"),
    }
    settlement
}

fn job_workspace(
    handler: &str,
    delivery: &Delivery,
    work_dir: Option<&std::path::Path>,
) -> std::io::Result<tempfile::TempDir> {
    let id = delivery
        .key
        .as_deref()
        .map(sanitize_filename)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let prefix = format!("{}-{}-", handler, id);
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix);
    match work_dir {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
}

async fn settle_failure(broker: &dyn MessageBroker, delivery: &Delivery, err: JobError) -> Settlement {
    if err.is_recoverable() {
        tracing::warn!(error = %err, "Job failed, requeueing");
        settle_requeue(broker, delivery).await
    } else {
        tracing::error!(error = %err, "Job failed permanently");
        settle_dead_letter(broker, delivery, &err.to_string()).await
    }
}

async fn settle_requeue(broker: &dyn MessageBroker, delivery: &Delivery) -> Settlement {
    if let Err(e) = broker.nack_requeue(delivery).await {
        tracing::error!(error = %e, "Failed to requeue delivery; it will be redelivered after its lease expires");
    }
    Settlement::Requeued
}

async fn settle_dead_letter(broker: &dyn MessageBroker, delivery: &Delivery, reason: &str) -> Settlement {
    match broker.dead_letter(delivery, reason).await {
        Ok(()) => Settlement::DeadLettered,
        Err(e) => {
            tracing::error!(error = %e, "Failed to dead-letter delivery; requeueing");
            settle_requeue(broker, delivery).await
        }
    }
}
