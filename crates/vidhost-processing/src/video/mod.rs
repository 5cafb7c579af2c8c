//! HLS transcoding: probe the source, encode the rendition ladder, store the output.

mod artifacts;
mod codec;
mod error;
mod ladder;
mod orchestration;
mod playlist;
mod probe;
mod transcoder;

pub use artifacts::{content_type_for, rendition_outputs};
pub use codec::HlsEncodeArgs;
pub use error::TranscodeError;
pub use ladder::{build_ladder, FLOOR_RENDITION, STANDARD_LADDER};
pub use orchestration::{TranscodeEngine, TranscodeReport, TranscodeSettings};
pub use playlist::{bandwidth_for_height, master_playlist};
pub use probe::{parse_probe_output, ProbeResult};
pub use transcoder::{validate_binary_path, FfmpegTranscoder, Transcoder};
