//! Vidhost Processing Library
//!
//! The two halves of the pipeline:
//! - `upload`: streams large payloads into object storage with the multipart protocol
//! - `video`: probes a source, transcodes the HLS ladder with FFmpeg and stores the result

#[cfg(feature = "upload")]
pub mod upload;
#[cfg(feature = "video")]
pub mod video;

#[cfg(feature = "upload")]
pub use upload::{
    buffer_stream, plan_parts, BufferedSource, PartPlan, RandomAccessSource, SpooledFile,
    UploadCoordinator, UploadError, UploadOutcome, UploadSettings,
};
#[cfg(feature = "video")]
pub use video::{
    build_ladder, FfmpegTranscoder, HlsEncodeArgs, ProbeResult, TranscodeEngine,
    TranscodeError, TranscodeReport, TranscodeSettings, Transcoder,
};
