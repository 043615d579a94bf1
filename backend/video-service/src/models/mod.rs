/// Data models for the video service
///
/// Catalog rows read through the ports, the video fields the pipeline owns,
/// and the typed request/response bodies for every endpoint. Request bodies
/// reject unknown fields at the boundary instead of passing them through.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Caller role carried in the platform bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Lesson row as seen by this service
///
/// The catalog owns the record; this service reads it and mutates only the
/// four video columns, always together.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub video_url: Option<String>,
    pub video_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<i32>,
}

impl Lesson {
    /// Published means both video fields are present; the commit step keeps
    /// them in lockstep so a half-set pair never exists.
    pub fn has_video(&self) -> bool {
        self.video_url.is_some() && self.video_key.is_some()
    }
}

/// Course row, read-only here
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub instructor_id: Uuid,
}

/// The four lesson columns written by the single commit point
#[derive(Debug, Clone)]
pub struct PublishedVideo {
    pub video_url: String,
    pub video_key: String,
    pub thumbnail_url: String,
    pub duration_seconds: i32,
}

// ============================================
// Request/Response Models
// ============================================

/// Response for a completed upload pipeline run
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub lesson_id: Uuid,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration_seconds: i32,
    pub manifest_key: String,
    pub segment_count: usize,
}

/// Legacy unauthenticated stream lookup
#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub lesson_id: Uuid,
    pub video_url: String,
}

/// Lesson video fields, nullable when nothing is published
#[derive(Debug, Serialize)]
pub struct VideoInfoResponse {
    pub lesson_id: Uuid,
    pub video_url: Option<String>,
    pub video_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<i32>,
}

impl From<Lesson> for VideoInfoResponse {
    fn from(lesson: Lesson) -> Self {
        VideoInfoResponse {
            lesson_id: lesson.id,
            video_url: lesson.video_url,
            video_key: lesson.video_key,
            thumbnail_url: lesson.thumbnail_url,
            duration_seconds: lesson.duration_seconds,
        }
    }
}

/// Signed playback URL for an entitled viewer
#[derive(Debug, Serialize)]
pub struct PlaybackUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

/// Issued viewing credential
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Decoded claims returned by the verify endpoint
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub exp: i64,
}

/// Watermark request body
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatermarkRequest {
    pub text: String,
}

/// Watermark result: the lesson now points at the new artifact
#[derive(Debug, Serialize)]
pub struct WatermarkResponse {
    pub lesson_id: Uuid,
    pub video_key: String,
    pub video_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("Instructor".parse::<Role>().unwrap(), Role::Instructor);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_has_video_requires_both_fields() {
        let mut lesson = Lesson {
            id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            video_url: Some("https://cdn.coursa.dev/videos/x.mp4".into()),
            video_key: Some("videos/x.mp4".into()),
            thumbnail_url: None,
            duration_seconds: Some(30),
        };
        assert!(lesson.has_video());

        lesson.video_key = None;
        assert!(!lesson.has_video());
    }

    #[test]
    fn test_watermark_request_rejects_unknown_fields() {
        let err = serde_json::from_str::<WatermarkRequest>(
            r#"{"text": "Coursa", "position": "center"}"#,
        );
        assert!(err.is_err());
    }
}
