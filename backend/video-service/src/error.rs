/// Error types for the video service
///
/// This module defines all error types that can occur in the video pipeline.
/// Errors are converted to appropriate HTTP responses for API clients. The
/// taxonomy deliberately keeps "you are not allowed" (403) distinct from
/// "the backend failed" (502), which clients rely on for retry decisions.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use std::fmt;

/// Result type for video-service operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Lesson, course, or stored object missing
    NotFound(String),

    /// Role or ownership check failed
    Forbidden(String),

    /// Bad file type, oversize upload, malformed request
    Validation(String),

    /// Source container could not be parsed
    Metadata(String),

    /// Encoder exited nonzero or timed out
    Transcode(String),

    /// Still-frame extraction failed
    Thumbnail(String),

    /// Overlay re-encode failed
    Watermark(String),

    /// Object store upload/download/sign/delete failed
    Storage(String),

    /// Viewing credential signature invalid or expired
    TokenInvalid(String),

    /// Credential was issued for a different lesson
    LessonMismatch(String),

    /// Entitlement gone between issuance and verification
    AccessRevoked(String),

    /// Catalog or entitlement store query failed
    Database(String),

    /// Anything else
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Metadata(msg) => write!(f, "Metadata error: {}", msg),
            AppError::Transcode(msg) => write!(f, "Transcode error: {}", msg),
            AppError::Thumbnail(msg) => write!(f, "Thumbnail error: {}", msg),
            AppError::Watermark(msg) => write!(f, "Watermark error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::TokenInvalid(msg) => write!(f, "Token invalid: {}", msg),
            AppError::LessonMismatch(msg) => write!(f, "Lesson mismatch: {}", msg),
            AppError::AccessRevoked(msg) => write!(f, "Access revoked: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl AppError {
    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Metadata(_) => "METADATA_ERROR",
            AppError::Transcode(_) => "TRANSCODE_ERROR",
            AppError::Thumbnail(_) => "THUMBNAIL_ERROR",
            AppError::Watermark(_) => "WATERMARK_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::TokenInvalid(_) => "TOKEN_INVALID",
            AppError::LessonMismatch(_) => "LESSON_MISMATCH",
            AppError::AccessRevoked(_) => "ACCESS_REVOKED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

/// JSON error envelope returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub code: &'static str,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_)
            | AppError::LessonMismatch(_)
            | AppError::AccessRevoked(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::Metadata(_)
            | AppError::Transcode(_)
            | AppError::Thumbnail(_)
            | AppError::Watermark(_)
            | AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let response = ErrorResponse {
            error: match status {
                StatusCode::BAD_REQUEST => "Bad Request",
                StatusCode::UNAUTHORIZED => "Unauthorized",
                StatusCode::FORBIDDEN => "Forbidden",
                StatusCode::NOT_FOUND => "Not Found",
                StatusCode::BAD_GATEWAY => "Bad Gateway",
                StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
                _ => "Error",
            }
            .to_string(),
            message: self.to_string(),
            status: status.as_u16(),
            code: self.code(),
        };

        HttpResponse::build(status).json(response)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_and_backend_failures_stay_distinct() {
        assert_eq!(
            AppError::Forbidden("not the course instructor".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Transcode("encoder exited with 1".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Storage("upload failed".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_credential_errors_map_to_auth_statuses() {
        assert_eq!(
            AppError::TokenInvalid("expired".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::LessonMismatch("wrong lesson".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::AccessRevoked("grant inactive".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(AppError::Metadata("x".into()).code(), "METADATA_ERROR");
        assert_eq!(AppError::NotFound("x".into()).code(), "NOT_FOUND");
    }
}
