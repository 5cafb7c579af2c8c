//! External codec collaborator.

use super::codec::HlsEncodeArgs;
use super::probe::{parse_probe_output, ProbeResult};
use super::TranscodeError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Native dimensions of the first video stream of `input`.
    async fn probe(&self, input: &Path) -> Result<ProbeResult, TranscodeError>;

    /// Produce the playlist and segments described by `args`.
    async fn encode_hls(&self, args: &HlsEncodeArgs) -> Result<(), TranscodeError>;
}

/// Reject binary paths that could smuggle shell syntax or escape via `..`.
pub fn validate_binary_path(path: &str) -> Result<(), TranscodeError> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r', ' '];
    if path.is_empty() || path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(TranscodeError::InvalidArgument(format!(
            "binary path contains dangerous characters: {:?}",
            path
        )));
    }
    if path.contains("..") {
        return Err(TranscodeError::InvalidArgument(format!(
            "binary path contains directory traversal: {:?}",
            path
        )));
    }
    Ok(())
}

/// Runs the `ffprobe` and `ffmpeg` binaries directly, without a shell.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Result<Self, TranscodeError> {
        let ffmpeg_path = ffmpeg_path.into();
        let ffprobe_path = ffprobe_path.into();
        validate_binary_path(&ffmpeg_path)?;
        validate_binary_path(&ffprobe_path)?;
        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(1999)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[tracing::instrument(skip(self), fields(input = %input.display()))]
    async fn probe(&self, input: &Path) -> Result<ProbeResult, TranscodeError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=p=0",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscodeError::Probe(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(TranscodeError::Probe(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        let probe = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(width = probe.width, height = probe.height, "Source probed");
        Ok(probe)
    }

    #[tracing::instrument(skip(self, args), fields(prefix = %args.output_prefix, resolution = %args.resolution))]
    async fn encode_hls(&self, args: &HlsEncodeArgs) -> Result<(), TranscodeError> {
        let argv = args.to_args()?;
        let start = Instant::now();
        let output = Command::new(&self.ffmpeg_path)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscodeError::Encode {
                height: args.resolution.height,
                message: format!("failed to execute ffmpeg: {}", e),
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Encode {
                height: args.resolution.height,
                message: format!("ffmpeg exited with {}: {}", output.status, stderr_tail(&output.stderr)),
            });
        }

        let playlist = args.playlist_path();
        if !tokio::fs::try_exists(&playlist).await? {
            return Err(TranscodeError::MissingOutput(playlist));
        }

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Rendition encoded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_absolute_paths() {
        assert!(validate_binary_path("ffmpeg").is_ok());
        assert!(validate_binary_path("/usr/local/bin/ffprobe").is_ok());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        for path in ["ffmpeg; rm -rf /", "$(ffmpeg)", "ffmpeg|cat", "../bin/ffmpeg", ""] {
            assert!(validate_binary_path(path).is_err(), "{:?} accepted", path);
        }
        assert!(FfmpegTranscoder::new("ffmpeg", "`ffprobe`").is_err());
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let long = "x".repeat(5000) + "final error";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.ends_with("final error"));
        assert_eq!(tail.chars().count(), 2000);
    }
}
