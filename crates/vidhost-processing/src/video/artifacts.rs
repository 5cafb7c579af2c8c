//! Encoder output discovery and content types.

use std::io;
use std::path::{Path, PathBuf};
use vidhost_core::constants::{CONTENT_TYPE_HLS_PLAYLIST, CONTENT_TYPE_MPEG_TS, CONTENT_TYPE_OCTET_STREAM};
use vidhost_core::models::RenditionTask;

pub fn content_type_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("m3u8") => CONTENT_TYPE_HLS_PLAYLIST,
        Some("ts") => CONTENT_TYPE_MPEG_TS,
        _ => CONTENT_TYPE_OCTET_STREAM,
    }
}

/// Files in `dir` that belong to `task`, sorted by name.
pub async fn rendition_outputs(dir: &Path, task: &RenditionTask) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let owned = entry
            .file_name()
            .to_str()
            .map(|name| task.owns_file(name))
            .unwrap_or(false);
        if owned {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidhost_core::models::Resolution;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for("720p-abc.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("720p-abc12.ts"), "video/MP2T");
        assert_eq!(content_type_for("MASTER.M3U8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("thumbnail.jpg"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn outputs_are_filtered_per_rendition() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["720p-abc.m3u8", "720p-abc0.ts", "720p-abc1.ts", "480p-abc.m3u8", "480p-abc0.ts"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        let task = RenditionTask::new("abc", Resolution::new(1280, 720));
        let names: Vec<String> = rendition_outputs(dir.path(), &task)
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["720p-abc.m3u8", "720p-abc0.ts", "720p-abc1.ts"]);
    }
}
