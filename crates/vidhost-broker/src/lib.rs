//! Vidhost Broker Library
//!
//! Topic-based message broker abstraction with at-least-once delivery and explicit
//! ack / nack-requeue / dead-letter settlement, plus the typed event publishers.
//!
//! Backends: Amazon SQS (one queue per topic, any SQS-compatible endpoint) and an
//! in-process broker for development and tests.

pub mod factory;
pub mod memory;
pub mod publisher;
#[cfg(feature = "broker-sqs")]
pub mod sqs;
pub mod traits;

// Re-export commonly used types
pub use factory::create_broker;
pub use memory::{MemoryBroker, PublishedMessage};
pub use publisher::{ConfirmationPublisher, TranscodeRequestPublisher, UploadEventPublisher};
#[cfg(feature = "broker-sqs")]
pub use sqs::{SqsBroker, SqsSettings};
pub use traits::{BrokerError, BrokerResult, Delivery, MessageBroker};
pub use vidhost_core::BrokerBackend;
