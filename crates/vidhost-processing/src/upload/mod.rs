//! Multipart upload coordination

mod chunker;
mod coordinator;
mod error;
mod source;

pub use chunker::{plan_parts, PartPlan};
pub use coordinator::{UploadCoordinator, UploadOutcome, UploadSettings};
pub use error::UploadError;
pub use source::{buffer_stream, BufferedSource, RandomAccessSource, SpooledFile};
