//! Object key conventions.
//!
//! - source upload: `unprocessed_videos/{uuid simple hex}{ext}`
//! - rendition files: `video_files/{uuid}/{filename}`
//! - master playlist: `video_files/{uuid}/master.m3u8`
//! - raw chunks: `chunks/{filename}/chunk_{uuid}`
//!
//! Keys must not contain `..` or a leading `/`.

use std::path::Path;
use uuid::Uuid;

use crate::constants::{CHUNKS_PREFIX, MASTER_PLAYLIST_NAME, RENDITIONS_PREFIX, UNPROCESSED_PREFIX};

/// Lowercased extension of `filename` including the dot, or an empty string.
///
/// Extensions longer than 10 characters or containing anything but ASCII
/// alphanumerics are dropped.
pub fn normalized_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Key for a freshly uploaded source video.
pub fn source_key(video_id: Uuid, original_filename: &str) -> String {
    format!(
        "{}/{}{}",
        UNPROCESSED_PREFIX,
        video_id.simple(),
        normalized_extension(original_filename)
    )
}

/// Video id embedded in a source key: the file stem of its last path segment.
pub fn video_uuid_from_source_key(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next()?;
    let stem = match name.rfind('.') {
        Some(0) => return None,
        Some(idx) => &name[..idx],
        None => name,
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

/// Output name shared by a rendition's playlist and segments, e.g. `720p-{uuid}`.
pub fn rendition_prefix(video_uuid: &str, height: u32) -> String {
    format!("{}p-{}", height, video_uuid)
}

/// Key for one HLS output file of a video.
pub fn rendition_file_key(video_uuid: &str, filename: &str) -> String {
    format!("{}/{}/{}", RENDITIONS_PREFIX, video_uuid, filename)
}

/// Key for the master playlist of a video.
pub fn master_playlist_key(video_uuid: &str) -> String {
    rendition_file_key(video_uuid, MASTER_PLAYLIST_NAME)
}

/// Key for one raw chunk uploaded through the streaming endpoint.
pub fn chunk_key(filename: &str, chunk_id: Uuid) -> String {
    format!(
        "{}/{}/chunk_{}",
        CHUNKS_PREFIX,
        sanitize_filename(filename),
        chunk_id
    )
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`, strip leading dots and
/// break up `..` runs.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.').replace("..", "_");
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

/// Reject keys that could escape a backend's namespace.
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("Storage key is empty".to_string());
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(format!("Storage key contains invalid characters: {}", key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_uses_simple_hex_and_lowercase_extension() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            source_key(id, "Holiday.MP4"),
            "unprocessed_videos/67e5504410b1426f9247bb680e5fe0c8.mp4"
        );
        assert_eq!(
            source_key(id, "no_extension"),
            "unprocessed_videos/67e5504410b1426f9247bb680e5fe0c8"
        );
        assert_eq!(
            source_key(id, "weird.m p4"),
            "unprocessed_videos/67e5504410b1426f9247bb680e5fe0c8"
        );
    }

    #[test]
    fn uuid_is_recovered_from_source_key() {
        assert_eq!(
            video_uuid_from_source_key("unprocessed_videos/abc123.mp4"),
            Some("abc123")
        );
        assert_eq!(video_uuid_from_source_key("abc123"), Some("abc123"));
        assert_eq!(video_uuid_from_source_key("unprocessed_videos/"), None);
        assert_eq!(video_uuid_from_source_key("unprocessed_videos/.mp4"), None);
    }

    #[test]
    fn rendition_keys() {
        assert_eq!(rendition_prefix("abc", 720), "720p-abc");
        assert_eq!(
            rendition_file_key("abc", "720p-abc0.ts"),
            "video_files/abc/720p-abc0.ts"
        );
        assert_eq!(master_playlist_key("abc"), "video_files/abc/master.m3u8");
    }

    #[test]
    fn chunk_key_sanitizes_filename() {
        let id = Uuid::nil();
        assert_eq!(
            chunk_key("../my video.mp4", id),
            format!("chunks/_my_video.mp4/chunk_{}", id)
        );
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(validate_key("video_files/a/b.ts").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("").is_err());
    }
}
