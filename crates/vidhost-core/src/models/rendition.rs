use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::rendition_prefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when neither dimension exceeds `other`.
    pub fn fits_within(&self, other: &Resolution) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One rung of a video's HLS ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionTask {
    pub width: u32,
    pub height: u32,
    /// `{height}p-{video_uuid}`, shared by the playlist and its segments.
    pub output_prefix: String,
}

impl RenditionTask {
    pub fn new(video_uuid: &str, resolution: Resolution) -> Self {
        Self {
            width: resolution.width,
            height: resolution.height,
            output_prefix: rendition_prefix(video_uuid, resolution.height),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn playlist_name(&self) -> String {
        format!("{}.m3u8", self.output_prefix)
    }

    /// Whether `filename` belongs to this rendition's output set.
    pub fn owns_file(&self, filename: &str) -> bool {
        filename == self.playlist_name()
            || (filename.starts_with(&self.output_prefix) && filename.ends_with(".ts"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendition_names() {
        let task = RenditionTask::new("abc", Resolution::new(1280, 720));
        assert_eq!(task.output_prefix, "720p-abc");
        assert_eq!(task.playlist_name(), "720p-abc.m3u8");
        assert!(task.owns_file("720p-abc0.ts"));
        assert!(task.owns_file("720p-abc.m3u8"));
        assert!(!task.owns_file("480p-abc0.ts"));
    }

    #[test]
    fn fits_within_checks_both_dimensions() {
        let source = Resolution::new(1080, 1920);
        assert!(!Resolution::new(1920, 1080).fits_within(&source));
        assert!(Resolution::new(640, 360).fits_within(&source));
    }
}
