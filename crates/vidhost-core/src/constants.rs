//! Application-wide constants.

/// Smallest non-final part most S3-compatible stores accept.
pub const MIN_PART_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Default multipart chunk size.
pub const DEFAULT_PART_SIZE_BYTES: u64 = MIN_PART_SIZE_BYTES;

/// S3 rejects part numbers above this.
pub const MAX_PART_COUNT: u32 = 10_000;

/// Prefix for uploaded sources awaiting transcoding.
pub const UNPROCESSED_PREFIX: &str = "unprocessed_videos";

/// Prefix for HLS output, one directory per video UUID.
pub const RENDITIONS_PREFIX: &str = "video_files";

/// Prefix for objects written by the raw chunk endpoint.
pub const CHUNKS_PREFIX: &str = "chunks";

pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";

pub const CONTENT_TYPE_HLS_PLAYLIST: &str = "application/vnd.apple.mpegurl";
pub const CONTENT_TYPE_MPEG_TS: &str = "video/MP2T";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// HLS target segment duration in seconds.
pub const DEFAULT_SEGMENT_DURATION_SECS: u32 = 5;

/// Name of the cookie carrying the caller's access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
