//! Master playlist generation.

use vidhost_core::models::RenditionTask;

/// Advertised peak bitrate for a rendition height. Unknown heights get the
/// lowest tier.
pub fn bandwidth_for_height(height: u32) -> u32 {
    match height {
        2160 => 16_000_000,
        1440 => 8_000_000,
        1080 => 5_000_000,
        720 => 2_500_000,
        480 => 1_500_000,
        360 => 1_000_000,
        240 => 750_000,
        _ => 500_000,
    }
}

/// `master.m3u8` referencing each rendition playlist by relative name.
pub fn master_playlist(renditions: &[RenditionTask]) -> String {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for rendition in renditions {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}\n",
            bandwidth_for_height(rendition.height),
            rendition.resolution(),
            rendition.playlist_name()
        ));
    }
    playlist
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidhost_core::models::Resolution;

    #[test]
    fn master_lists_every_rendition() {
        let renditions = vec![
            RenditionTask::new("abc", Resolution::new(1280, 720)),
            RenditionTask::new("abc", Resolution::new(256, 144)),
        ];
        assert_eq!(
            master_playlist(&renditions),
            "#EXTM3U\n#EXT-X-VERSION:3\n\
             #EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\n720p-abc.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=256x144\n144p-abc.m3u8\n"
        );
    }

    #[test]
    fn unknown_height_uses_lowest_tier() {
        assert_eq!(bandwidth_for_height(144), 500_000);
        assert_eq!(bandwidth_for_height(999), 500_000);
        assert_eq!(bandwidth_for_height(1080), 5_000_000);
    }
}
