/// Lesson catalog adapter - database operations against the catalog store
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::LessonCatalog;
use crate::error::{AppError, Result};
use crate::models::{Course, Lesson, PublishedVideo};

pub struct PgLessonCatalog {
    pool: PgPool,
}

impl PgLessonCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LessonCatalog for PgLessonCatalog {
    async fn get_lesson(&self, lesson_id: Uuid) -> Result<Option<Lesson>> {
        let lesson = sqlx::query_as::<_, Lesson>(
            "SELECT id, course_id, video_url, video_key, thumbnail_url, duration_seconds \
             FROM lessons WHERE id = $1",
        )
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lesson)
    }

    async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT id, instructor_id FROM courses WHERE id = $1",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(course)
    }

    async fn publish_video(&self, lesson_id: Uuid, video: &PublishedVideo) -> Result<()> {
        let result = sqlx::query(
            "UPDATE lessons \
             SET video_url = $2, video_key = $3, thumbnail_url = $4, duration_seconds = $5, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(lesson_id)
        .bind(&video.video_url)
        .bind(&video.video_key)
        .bind(&video.thumbnail_url)
        .bind(video.duration_seconds)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Lesson not found".to_string()));
        }
        Ok(())
    }

    async fn swap_video(&self, lesson_id: Uuid, video_key: &str, video_url: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE lessons SET video_key = $2, video_url = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(lesson_id)
        .bind(video_key)
        .bind(video_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Lesson not found".to_string()));
        }
        Ok(())
    }

    async fn clear_video(&self, lesson_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE lessons \
             SET video_url = NULL, video_key = NULL, thumbnail_url = NULL, \
                 duration_seconds = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(lesson_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Lesson not found".to_string()));
        }
        Ok(())
    }
}
