/// Configuration management for video-service
///
/// Loads configuration from environment variables with sensible defaults,
/// once at process start. The resulting `Config` is immutable and handed to
/// services by value; nothing reads the environment after boot.
use serde::Deserialize;
use std::path::PathBuf;

use video_core::constants::{
    DEFAULT_ENCODE_TIMEOUT_SECS, DEFAULT_TOKEN_TTL_SECS, MAX_UPLOAD_BYTES,
};
use video_core::QualityLevel;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub s3: S3Config,
    pub cdn: CdnConfig,
    pub auth: AuthConfig,
    pub video: VideoConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CdnConfig {
    /// CDN host serving public artifacts; raw object-store URLs when absent
    pub domain: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    /// Secret validating platform bearer tokens
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VideoConfig {
    /// Dedicated signing secret for viewing credentials. When absent a
    /// purpose-scoped key is derived from the auth secret at startup.
    pub token_secret: Option<String>,
    pub token_ttl_secs: u64,
    pub default_preset: QualityLevel,
    pub max_upload_bytes: u64,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub encode_timeout_secs: u64,
    /// Root for per-lesson temp workspaces
    pub work_dir: PathBuf,
    /// Whether the watermark flow deletes the artifact it supersedes
    pub delete_replaced: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let jwt_secret = std::env::var("AUTH_JWT_SECRET")
            .map_err(|_| "AUTH_JWT_SECRET must be set")?;

        Ok(Config {
            app: AppConfig {
                host: std::env::var("VIDEO_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("VIDEO_SERVICE_PORT")
                    .unwrap_or_else(|_| "8085".to_string())
                    .parse()
                    .unwrap_or(8085),
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/coursa".to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            s3: S3Config {
                bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "coursa-videos".to_string()),
                region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
            },
            cdn: CdnConfig {
                domain: std::env::var("CDN_DOMAIN").ok().filter(|d| !d.is_empty()),
            },
            auth: AuthConfig { jwt_secret },
            video: VideoConfig {
                token_secret: std::env::var("VIDEO_TOKEN_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty()),
                token_ttl_secs: std::env::var("VIDEO_TOKEN_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TOKEN_TTL_SECS),
                default_preset: std::env::var("VIDEO_DEFAULT_PRESET")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(QualityLevel::Medium),
                max_upload_bytes: std::env::var("VIDEO_MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(MAX_UPLOAD_BYTES),
                ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
                ffprobe_path: std::env::var("FFPROBE_PATH")
                    .unwrap_or_else(|_| "ffprobe".to_string()),
                encode_timeout_secs: std::env::var("VIDEO_ENCODE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_ENCODE_TIMEOUT_SECS),
                work_dir: std::env::var("MEDIA_WORK_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| std::env::temp_dir().join("coursa-video")),
                delete_replaced: std::env::var("VIDEO_DELETE_REPLACED")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_defaults() {
        let video = VideoConfig {
            token_secret: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            default_preset: QualityLevel::Medium,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            encode_timeout_secs: DEFAULT_ENCODE_TIMEOUT_SECS,
            work_dir: PathBuf::from("/tmp/coursa-video"),
            delete_replaced: false,
        };
        assert_eq!(video.token_ttl_secs, 3600);
        assert_eq!(video.max_upload_bytes, 500 * 1024 * 1024);
        assert!(!video.delete_replaced);
    }
}
