pub mod events;
pub mod job;
pub mod rendition;
pub mod upload;

pub use events::{ConfirmationEvent, TranscodeRequest, UploadCompletedEvent};
pub use job::{JobStatus, TranscodeJob};
pub use rendition::{RenditionTask, Resolution};
pub use upload::{PartRecord, SessionError, UploadSession, UploadState};
