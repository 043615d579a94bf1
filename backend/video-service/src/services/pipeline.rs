/// Ingestion orchestrator
///
/// Drives one upload, delete, or watermark request as a strictly sequential
/// pipeline: authorize, probe, upload original, transcode, upload segments
/// then manifest, thumbnail, and finally the single lesson commit. Nothing is
/// visible to readers before the commit succeeds, and the per-job temp
/// workspace is reclaimed on every exit path. Retries belong to the caller;
/// the orchestrator never re-runs the encoder on its own.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use video_core::constants::DEFAULT_THUMBNAIL_OFFSET_SECS;
use video_core::{QualityLevel, QualityPreset, SourceMetadata};

use crate::db::LessonCatalog;
use crate::error::{AppError, Result};
use crate::models::{Course, Lesson, PublishedVideo, Role};
use crate::services::storage::{is_missing_object_error, ObjectStorage};
use crate::services::transcoder::Transcoder;
use crate::services::workspace::TempWorkspace;

/// Keys and URLs produced by one successful upload run
#[derive(Debug, Clone)]
pub struct UploadedArtifacts {
    pub video_key: String,
    pub video_url: String,
    pub manifest_key: String,
    pub segment_keys: Vec<String>,
    pub thumbnail_key: String,
    pub thumbnail_url: String,
}

/// Result of a completed upload pipeline
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub lesson: Lesson,
    pub artifacts: UploadedArtifacts,
    pub metadata: SourceMetadata,
}

/// Result of a watermark run: where the lesson now points
#[derive(Debug, Clone)]
pub struct WatermarkOutcome {
    pub video_key: String,
    pub video_url: String,
}

pub struct VideoPipeline {
    catalog: Arc<dyn LessonCatalog>,
    storage: Arc<dyn ObjectStorage>,
    transcoder: Arc<dyn Transcoder>,
    work_dir: PathBuf,
    default_preset: QualityLevel,
    delete_replaced: bool,
}

impl VideoPipeline {
    pub fn new(
        catalog: Arc<dyn LessonCatalog>,
        storage: Arc<dyn ObjectStorage>,
        transcoder: Arc<dyn Transcoder>,
        work_dir: PathBuf,
        default_preset: QualityLevel,
        delete_replaced: bool,
    ) -> Self {
        Self {
            catalog,
            storage,
            transcoder,
            work_dir,
            default_preset,
            delete_replaced,
        }
    }

    /// Run the full ingest pipeline for a staged source file. The staged file
    /// is consumed: moved into the job workspace on the happy path, removed
    /// otherwise.
    pub async fn upload(
        &self,
        input: &Path,
        lesson_id: Uuid,
        acting_user: Uuid,
        acting_role: Role,
        preset: Option<QualityLevel>,
    ) -> Result<UploadOutcome> {
        let result = self
            .upload_inner(input, lesson_id, acting_user, acting_role, preset)
            .await;

        // The staged input never outlives the request
        if tokio::fs::try_exists(input).await.unwrap_or(false) {
            if let Err(err) = tokio::fs::remove_file(input).await {
                warn!(%lesson_id, "failed to remove staged upload: {}", err);
            }
        }

        match result {
            Ok(outcome) => {
                info!(
                    %lesson_id,
                    duration = outcome.metadata.duration_seconds,
                    segments = outcome.artifacts.segment_keys.len(),
                    "video published"
                );
                Ok(outcome)
            }
            Err(err) => {
                error!(%lesson_id, "upload pipeline aborted: {}", err);
                Err(err)
            }
        }
    }

    async fn upload_inner(
        &self,
        input: &Path,
        lesson_id: Uuid,
        acting_user: Uuid,
        acting_role: Role,
        preset: Option<QualityLevel>,
    ) -> Result<UploadOutcome> {
        let lesson = self.resolve_lesson(lesson_id).await?;
        let course = self.resolve_course(&lesson).await?;
        authorize_manage(&course, acting_user, acting_role)?;

        let preset = QualityPreset::for_level(preset.unwrap_or(self.default_preset));

        let workspace = TempWorkspace::create(&self.work_dir, lesson_id).await?;
        let result = self
            .run_upload(&workspace, input, lesson_id, &preset)
            .await;
        if let Err(err) = workspace.close().await {
            warn!(%lesson_id, "temp workspace cleanup failed: {}", err);
        }
        result
    }

    async fn run_upload(
        &self,
        workspace: &TempWorkspace,
        input: &Path,
        lesson_id: Uuid,
        preset: &QualityPreset,
    ) -> Result<UploadOutcome> {
        let source = workspace.file("source.mp4");
        stage_file(input, &source).await?;

        // Fail fast: nothing is uploaded when the container is unreadable
        let metadata = self.transcoder.probe(&source).await?;

        let job_id = Uuid::new_v4();
        let video_key = format!("videos/lessons/{}/{}.mp4", lesson_id, job_id);
        self.storage.upload_file(&source, &video_key).await?;

        let hls_dir = workspace.subdir("hls").await?;
        let output = self
            .transcoder
            .transcode_adaptive(
                &source,
                lesson_id,
                preset,
                metadata.duration_seconds,
                &hls_dir,
            )
            .await?;

        // Segments first, manifest last: a reader that can fetch the manifest
        // can fetch everything it references
        let hls_prefix = format!("hls/lessons/{}/{}", lesson_id, job_id);
        let mut segment_keys = Vec::with_capacity(output.segments.len());
        for segment in &output.segments {
            let name = file_name(segment)?;
            let key = format!("{}/{}", hls_prefix, name);
            self.storage.upload_file(segment, &key).await?;
            segment_keys.push(key);
        }
        let manifest_key = format!("{}/{}", hls_prefix, file_name(&output.manifest)?);
        self.storage.upload_file(&output.manifest, &manifest_key).await?;

        // Clamp the capture offset into the clip
        let offset = (DEFAULT_THUMBNAIL_OFFSET_SECS as f64)
            .min(metadata.duration_seconds / 2.0)
            .floor() as u32;
        let thumbnail = self
            .transcoder
            .thumbnail(&source, lesson_id, offset, workspace.path())
            .await?;
        let thumbnail_key = format!("videos/lessons/{}/thumbs/{}.jpg", lesson_id, job_id);
        self.storage.upload_file(&thumbnail, &thumbnail_key).await?;

        // Single commit point: all four fields in one statement
        let published = PublishedVideo {
            video_url: self.storage.public_url(&video_key),
            video_key: video_key.clone(),
            thumbnail_url: self.storage.public_url(&thumbnail_key),
            duration_seconds: metadata.duration_rounded(),
        };
        self.catalog.publish_video(lesson_id, &published).await?;

        let lesson = self.resolve_lesson(lesson_id).await?;
        Ok(UploadOutcome {
            lesson,
            artifacts: UploadedArtifacts {
                video_key,
                video_url: published.video_url,
                manifest_key,
                segment_keys,
                thumbnail_key,
                thumbnail_url: published.thumbnail_url,
            },
            metadata,
        })
    }

    /// Remove the backing object and null the lesson's video fields.
    /// Idempotent: a missing object and an already-empty lesson both succeed.
    pub async fn delete(
        &self,
        lesson_id: Uuid,
        acting_user: Uuid,
        acting_role: Role,
    ) -> Result<()> {
        let lesson = self.resolve_lesson(lesson_id).await?;
        let course = self.resolve_course(&lesson).await?;
        authorize_manage(&course, acting_user, acting_role)?;

        if let Some(video_key) = &lesson.video_key {
            match self.storage.delete(video_key).await {
                Ok(()) => {}
                Err(err) if is_missing_object_error(&err) => {
                    warn!(%lesson_id, "stored object already gone: {}", err);
                }
                Err(err) => {
                    error!(%lesson_id, "delete pipeline aborted: {}", err);
                    return Err(err);
                }
            }
        }

        self.catalog.clear_video(lesson_id).await?;
        info!(%lesson_id, "video removed");
        Ok(())
    }

    /// Re-encode the stored video with a text overlay and repoint the lesson
    /// at the new artifact. The superseded artifact is retained unless the
    /// replacement policy says otherwise.
    pub async fn watermark(
        &self,
        lesson_id: Uuid,
        text: &str,
        acting_user: Uuid,
        acting_role: Role,
    ) -> Result<WatermarkOutcome> {
        let lesson = self.resolve_lesson(lesson_id).await?;
        let course = self.resolve_course(&lesson).await?;
        authorize_manage(&course, acting_user, acting_role)?;

        let old_key = lesson
            .video_key
            .ok_or_else(|| AppError::NotFound("no video published for this lesson".to_string()))?;

        let workspace = TempWorkspace::create(&self.work_dir, lesson_id).await?;
        let result = self
            .run_watermark(&workspace, lesson_id, &old_key, text)
            .await;
        if let Err(err) = workspace.close().await {
            warn!(%lesson_id, "temp workspace cleanup failed: {}", err);
        }

        match result {
            Ok(outcome) => {
                if self.delete_replaced {
                    if let Err(err) = self.storage.delete(&old_key).await {
                        warn!(%lesson_id, "failed to delete superseded artifact: {}", err);
                    }
                }
                info!(%lesson_id, new_key = %outcome.video_key, "watermark applied");
                Ok(outcome)
            }
            Err(err) => {
                error!(%lesson_id, "watermark pipeline aborted: {}", err);
                Err(err)
            }
        }
    }

    async fn run_watermark(
        &self,
        workspace: &TempWorkspace,
        lesson_id: Uuid,
        video_key: &str,
        text: &str,
    ) -> Result<WatermarkOutcome> {
        let source = workspace.file("source.mp4");
        self.storage.download(video_key, &source).await?;

        let output = self
            .transcoder
            .watermark(&source, lesson_id, text, workspace.path())
            .await?;

        let new_key = format!("videos/lessons/{}/{}.mp4", lesson_id, Uuid::new_v4());
        self.storage.upload_file(&output, &new_key).await?;

        let new_url = self.storage.public_url(&new_key);
        self.catalog.swap_video(lesson_id, &new_key, &new_url).await?;

        Ok(WatermarkOutcome {
            video_key: new_key,
            video_url: new_url,
        })
    }

    async fn resolve_lesson(&self, lesson_id: Uuid) -> Result<Lesson> {
        self.catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))
    }

    async fn resolve_course(&self, lesson: &Lesson) -> Result<Course> {
        self.catalog
            .get_course(lesson.course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))
    }
}

/// Role and ownership rule shared by upload, delete, and watermark:
/// students never manage videos, instructors only on their own courses,
/// admins always.
fn authorize_manage(course: &Course, acting_user: Uuid, acting_role: Role) -> Result<()> {
    match acting_role {
        Role::Admin => Ok(()),
        Role::Instructor if course.instructor_id == acting_user => Ok(()),
        Role::Instructor => Err(AppError::Forbidden(
            "not the course instructor".to_string(),
        )),
        Role::Student => Err(AppError::Forbidden(
            "students cannot manage lesson videos".to_string(),
        )),
    }
}

/// Move a staged file into the workspace; copy across devices when renaming
/// is not possible.
async fn stage_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| AppError::Internal(format!("artifact path has no name: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_students_never_manage_videos() {
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: Uuid::new_v4(),
        };
        let err = authorize_manage(&course, course.instructor_id, Role::Student).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_instructor_must_own_the_course() {
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: Uuid::new_v4(),
        };
        assert!(authorize_manage(&course, course.instructor_id, Role::Instructor).is_ok());
        assert!(authorize_manage(&course, Uuid::new_v4(), Role::Instructor).is_err());
    }

    #[test]
    fn test_admin_manages_any_course() {
        let course = Course {
            id: Uuid::new_v4(),
            instructor_id: Uuid::new_v4(),
        };
        assert!(authorize_manage(&course, Uuid::new_v4(), Role::Admin).is_ok());
    }
}
