//! Video pipeline constants

/// Maximum upload size accepted at the HTTP boundary (500 MB)
pub const MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Allowed source container extensions
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv", "avi"];

/// Fixed length of one adaptive segment in seconds
pub const SEGMENT_DURATION_SECS: u32 = 6;

/// Default viewing-credential lifetime (1 hour)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Default thumbnail capture offset
pub const DEFAULT_THUMBNAIL_OFFSET_SECS: u32 = 5;

/// Thumbnail output dimensions (letterboxed)
pub const THUMBNAIL_WIDTH: u32 = 1280;
pub const THUMBNAIL_HEIGHT: u32 = 720;

/// Default ceiling on one encoder invocation (1 hour)
pub const DEFAULT_ENCODE_TIMEOUT_SECS: u64 = 60 * 60;
