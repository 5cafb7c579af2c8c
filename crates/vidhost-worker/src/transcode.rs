//! Transcode request handler.

use async_trait::async_trait;
use std::sync::Arc;
use vidhost_core::models::TranscodeRequest;
use vidhost_core::JobError;
use vidhost_processing::TranscodeEngine;

use crate::context::{JobContext, JobHandler};

pub struct TranscodeJobHandler {
    engine: Arc<TranscodeEngine>,
}

impl TranscodeJobHandler {
    pub fn new(engine: Arc<TranscodeEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for TranscodeJobHandler {
    type Message = TranscodeRequest;

    fn name(&self) -> &'static str {
        "transcode"
    }

    async fn handle(&self, request: TranscodeRequest, ctx: &JobContext<'_>) -> Result<(), JobError> {
        if ctx.delivery_count > 1 {
            tracing::info!(
                video_uuid = %request.uuid,
                delivery_count = ctx.delivery_count,
                "Redelivered transcode job"
            );
        }
        self.engine.process(&request, ctx.workspace).await?;
        Ok(())
    }
}
