/// Service layer for the video pipeline
///
/// - Entitlement gate: may this user read this lesson
/// - Transcoder: probe, adaptive segmenting, thumbnails, watermarks
/// - Object store gateway: uploads, deletes, public and signed URLs
/// - Access token service: viewing credentials and playback URLs
/// - Pipeline: the all-or-nothing publish orchestrator
pub mod entitlement;
pub mod manifest;
pub mod pipeline;
pub mod storage;
pub mod tokens;
pub mod transcoder;
pub mod workspace;

pub use entitlement::EntitlementGate;
pub use pipeline::{UploadOutcome, VideoPipeline, WatermarkOutcome};
pub use storage::{MemoryStorage, ObjectStorage, S3Storage};
pub use tokens::{AccessTokenService, VideoTokenKey};
pub use transcoder::{FakeTranscoder, FfmpegTranscoder, Transcoder};
pub use workspace::TempWorkspace;
