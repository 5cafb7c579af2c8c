//! Vidhost Worker Library
//!
//! Broker consumers of the transcode pipeline: a bounded consumer pool, the
//! transcode handler and the upload-event relay.

pub mod context;
pub mod health;
pub mod queue;
pub mod relay;
pub mod transcode;

pub use context::{JobContext, JobHandler};
pub use health::health_router;
pub use queue::{JobConsumerConfig, JobConsumerPool, Settlement};
pub use relay::UploadRelayHandler;
pub use transcode::TranscodeJobHandler;
