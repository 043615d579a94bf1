/// Database access layer
///
/// The course/lesson catalog and the entitlement ledger are owned by other
/// services; this module defines the two ports the pipeline consumes and the
/// thin Postgres adapters behind them. `memory` provides in-process
/// implementations for tests and local development.
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Course, Lesson, PublishedVideo};

pub mod grant_repo;
pub mod lesson_repo;
pub mod memory;

pub use grant_repo::PgGrantStore;
pub use lesson_repo::PgLessonCatalog;

/// Read access to lessons and courses, plus the video columns this service
/// owns. Every mutation touches the video fields as one statement so readers
/// never observe a half-published lesson.
#[async_trait]
pub trait LessonCatalog: Send + Sync {
    async fn get_lesson(&self, lesson_id: Uuid) -> Result<Option<Lesson>>;

    async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>>;

    /// Single commit point of the upload pipeline
    async fn publish_video(&self, lesson_id: Uuid, video: &PublishedVideo) -> Result<()>;

    /// Repoint the lesson at a replacement artifact (watermark flow)
    async fn swap_video(&self, lesson_id: Uuid, video_key: &str, video_url: &str) -> Result<()>;

    /// Null out all video fields (delete flow)
    async fn clear_video(&self, lesson_id: Uuid) -> Result<()>;
}

/// Entitlement ledger, read-only: a grant is valid iff it is active at query
/// time. Expiry semantics live in the external store.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn has_active_grant(&self, user_id: Uuid, course_id: Uuid) -> Result<bool>;
}
