//! Job handler trait
//!
//! A [`JobConsumerPool`](crate::queue::JobConsumerPool) decodes each delivery into the
//! handler's message type and calls [`JobHandler::handle`] with a per-job context.
//! The returned [`JobError`] decides between requeue and dead-letter.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::Path;
use vidhost_core::JobError;

/// Per-delivery information handed to a handler.
#[derive(Debug)]
pub struct JobContext<'a> {
    /// Broker message key, if the producer set one.
    pub key: Option<&'a str>,
    /// 1 on first delivery.
    pub delivery_count: u32,
    /// Scratch directory owned by this job, removed once the job is settled.
    pub workspace: &'a Path,
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Message: DeserializeOwned + Send + Sync + 'static;

    /// Short name used in logs and workspace prefixes.
    fn name(&self) -> &'static str;

    async fn handle(&self, message: Self::Message, ctx: &JobContext<'_>) -> Result<(), JobError>;
}
