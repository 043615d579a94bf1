/// HTTP handlers for the video service
pub mod secure_video;
pub mod videos;

pub use secure_video::{issue_token, secure_stream, thumbnail, verify_token};
pub use videos::{delete_video, stream_video, upload_video, video_info, watermark_video};
