//! Typed FFmpeg argument list for one HLS rendition.

use super::TranscodeError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use vidhost_core::models::{RenditionTask, Resolution};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsEncodeArgs {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// `{height}p-{uuid}`; names the playlist and prefixes every segment.
    pub output_prefix: String,
    pub resolution: Resolution,
    /// Target segment length in seconds.
    pub segment_duration: u32,
}

impl HlsEncodeArgs {
    pub fn for_rendition(
        input: &Path,
        output_dir: &Path,
        task: &RenditionTask,
        segment_duration: u32,
    ) -> Self {
        Self {
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            output_prefix: task.output_prefix.clone(),
            resolution: task.resolution(),
            segment_duration,
        }
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.m3u8", self.output_prefix))
    }

    pub fn validate(&self) -> Result<(), TranscodeError> {
        let prefix_ok = !self.output_prefix.is_empty()
            && self
                .output_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !prefix_ok {
            return Err(TranscodeError::InvalidArgument(format!(
                "output prefix {:?}",
                self.output_prefix
            )));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(TranscodeError::InvalidArgument(format!(
                "resolution {}",
                self.resolution
            )));
        }
        if self.segment_duration == 0 {
            return Err(TranscodeError::InvalidArgument(
                "segment duration must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Arguments passed to the ffmpeg binary, in order. Segments are written next to
    /// the playlist as `{prefix}{n}.ts`, numbered from zero.
    pub fn to_args(&self) -> Result<Vec<OsString>, TranscodeError> {
        self.validate()?;
        let mut args: Vec<OsString> = Vec::with_capacity(26);
        args.push("-i".into());
        args.push(self.input.clone().into_os_string());
        for arg in [
            "-vf".to_string(),
            format!("scale={}:{}", self.resolution.width, self.resolution.height),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "fast".to_string(),
            "-profile:v".to_string(),
            "baseline".to_string(),
            "-level".to_string(),
            "3.0".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-start_number".to_string(),
            "0".to_string(),
            "-hls_time".to_string(),
            self.segment_duration.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-f".to_string(),
            "hls".to_string(),
        ] {
            args.push(arg.into());
        }
        args.push(self.playlist_path().into_os_string());
        Ok(args)
    }
}
