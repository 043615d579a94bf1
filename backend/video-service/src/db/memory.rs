/// In-memory catalog and grant stores
///
/// Used by tests and local development where the catalog and entitlement
/// services are not running. Behavior mirrors the Postgres adapters,
/// including the all-columns-at-once video mutations.
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{GrantStore, LessonCatalog};
use crate::error::{AppError, Result};
use crate::models::{Course, Lesson, PublishedVideo};

#[derive(Default)]
pub struct MemoryCatalog {
    lessons: RwLock<HashMap<Uuid, Lesson>>,
    courses: RwLock<HashMap<Uuid, Course>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_course(&self, course: Course) {
        self.courses.write().await.insert(course.id, course);
    }

    pub async fn insert_lesson(&self, lesson: Lesson) {
        self.lessons.write().await.insert(lesson.id, lesson);
    }
}

#[async_trait]
impl LessonCatalog for MemoryCatalog {
    async fn get_lesson(&self, lesson_id: Uuid) -> Result<Option<Lesson>> {
        Ok(self.lessons.read().await.get(&lesson_id).cloned())
    }

    async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>> {
        Ok(self.courses.read().await.get(&course_id).cloned())
    }

    async fn publish_video(&self, lesson_id: Uuid, video: &PublishedVideo) -> Result<()> {
        let mut lessons = self.lessons.write().await;
        let lesson = lessons
            .get_mut(&lesson_id)
            .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

        lesson.video_url = Some(video.video_url.clone());
        lesson.video_key = Some(video.video_key.clone());
        lesson.thumbnail_url = Some(video.thumbnail_url.clone());
        lesson.duration_seconds = Some(video.duration_seconds);
        Ok(())
    }

    async fn swap_video(&self, lesson_id: Uuid, video_key: &str, video_url: &str) -> Result<()> {
        let mut lessons = self.lessons.write().await;
        let lesson = lessons
            .get_mut(&lesson_id)
            .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

        lesson.video_key = Some(video_key.to_string());
        lesson.video_url = Some(video_url.to_string());
        Ok(())
    }

    async fn clear_video(&self, lesson_id: Uuid) -> Result<()> {
        let mut lessons = self.lessons.write().await;
        let lesson = lessons
            .get_mut(&lesson_id)
            .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

        lesson.video_url = None;
        lesson.video_key = None;
        lesson.thumbnail_url = None;
        lesson.duration_seconds = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGrantStore {
    grants: RwLock<HashMap<(Uuid, Uuid), bool>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a grant's active flag
    pub async fn set_grant(&self, user_id: Uuid, course_id: Uuid, is_active: bool) {
        self.grants
            .write()
            .await
            .insert((user_id, course_id), is_active);
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn has_active_grant(&self, user_id: Uuid, course_id: Uuid) -> Result<bool> {
        Ok(self
            .grants
            .read()
            .await
            .get(&(user_id, course_id))
            .copied()
            .unwrap_or(false))
    }
}
