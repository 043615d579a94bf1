//! End-to-end pipeline tests against the in-memory catalog, grant store, and
//! object store, with the deterministic fake encoder standing in for ffmpeg.

use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use video_core::QualityLevel;
use video_service::db::memory::MemoryCatalog;
use video_service::db::LessonCatalog;
use video_service::models::{Course, Lesson, Role};
use video_service::services::transcoder::FakeTranscoder;
use video_service::services::{MemoryStorage, ObjectStorage, VideoPipeline};
use video_service::AppError;

struct Harness {
    pipeline: VideoPipeline,
    catalog: Arc<MemoryCatalog>,
    storage: Arc<MemoryStorage>,
    work_dir: PathBuf,
    instructor: Uuid,
    course: Uuid,
    lesson: Uuid,
    // Kept alive so the work dir survives the test body
    _tmp: tempfile::TempDir,
}

async fn harness_with(transcoder: FakeTranscoder, delete_replaced: bool) -> Harness {
    let catalog = Arc::new(MemoryCatalog::new());
    let storage = Arc::new(MemoryStorage::new());
    let tmp = tempfile::tempdir().unwrap();
    let work_dir = tmp.path().to_path_buf();

    let instructor = Uuid::new_v4();
    let course = Uuid::new_v4();
    let lesson = Uuid::new_v4();

    catalog
        .insert_course(Course {
            id: course,
            instructor_id: instructor,
        })
        .await;
    catalog
        .insert_lesson(Lesson {
            id: lesson,
            course_id: course,
            video_url: None,
            video_key: None,
            thumbnail_url: None,
            duration_seconds: None,
        })
        .await;

    let pipeline = VideoPipeline::new(
        catalog.clone(),
        storage.clone(),
        Arc::new(transcoder),
        work_dir.clone(),
        QualityLevel::Medium,
        delete_replaced,
    );

    Harness {
        pipeline,
        catalog,
        storage,
        work_dir,
        instructor,
        course,
        lesson,
        _tmp: tmp,
    }
}

async fn harness(duration: f64) -> Harness {
    harness_with(FakeTranscoder::new(duration), false).await
}

async fn stage_source(h: &Harness) -> PathBuf {
    let incoming = h.work_dir.join("incoming");
    tokio::fs::create_dir_all(&incoming).await.unwrap();
    let path = incoming.join(format!("{}.mp4", Uuid::new_v4()));
    tokio::fs::write(&path, b"source bytes").await.unwrap();
    path
}

async fn job_workspaces(h: &Harness) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(&h.work_dir).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name != "incoming" {
            names.push(name);
        }
    }
    names
}

#[tokio::test]
async fn upload_publishes_lesson_and_artifacts() {
    let h = harness(44.0).await;
    let staged = stage_source(&h).await;

    let outcome = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap();

    // Single commit point: all four fields set together
    let lesson = h.catalog.get_lesson(h.lesson).await.unwrap().unwrap();
    assert!(lesson.has_video());
    assert_eq!(lesson.duration_seconds, Some(44));
    assert_eq!(lesson.video_key.as_deref(), Some(outcome.artifacts.video_key.as_str()));

    // All artifacts live under lesson-scoped keys
    assert!(outcome
        .artifacts
        .video_key
        .starts_with(&format!("videos/lessons/{}/", h.lesson)));
    assert!(outcome
        .artifacts
        .manifest_key
        .starts_with(&format!("hls/lessons/{}/", h.lesson)));
    for key in &outcome.artifacts.segment_keys {
        assert!(key.starts_with(&format!("hls/lessons/{}/", h.lesson)));
        assert!(h.storage.contains(key).await);
    }
    assert!(h.storage.contains(&outcome.artifacts.video_key).await);
    assert!(h.storage.contains(&outcome.artifacts.thumbnail_key).await);

    // The manifest references exactly the uploaded segments
    let manifest = String::from_utf8(
        h.storage.object(&outcome.artifacts.manifest_key).await.unwrap(),
    )
    .unwrap();
    for key in &outcome.artifacts.segment_keys {
        let name = key.rsplit('/').next().unwrap();
        assert!(manifest.contains(name));
    }

    // Staged input consumed, workspace reclaimed
    assert!(!staged.exists());
    assert!(job_workspaces(&h).await.is_empty());
}

#[tokio::test]
async fn manifest_durations_sum_to_clip_duration() {
    let duration = 44.0;
    let h = harness(duration).await;
    let staged = stage_source(&h).await;

    let outcome = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap();

    let manifest = String::from_utf8(
        h.storage.object(&outcome.artifacts.manifest_key).await.unwrap(),
    )
    .unwrap();

    let sum: f64 = manifest
        .lines()
        .filter_map(|line| line.strip_prefix("#EXTINF:"))
        .filter_map(|rest| rest.trim_end_matches(',').parse::<f64>().ok())
        .sum();
    assert!((sum - duration).abs() <= 6.0, "manifest sums to {}", sum);

    // Exactly one thumbnail artifact
    let thumbs: Vec<String> = h
        .storage
        .keys()
        .await
        .into_iter()
        .filter(|k| k.ends_with(".jpg"))
        .collect();
    assert_eq!(thumbs.len(), 1);
}

#[tokio::test]
async fn probe_failure_aborts_before_any_upload() {
    let h = harness_with(FakeTranscoder::new(30.0).with_probe_failure(), false).await;
    let staged = stage_source(&h).await;

    let err = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Metadata(_)));

    // Fail fast: no partial writes anywhere
    assert!(h.storage.keys().await.is_empty());
    let lesson = h.catalog.get_lesson(h.lesson).await.unwrap().unwrap();
    assert!(!lesson.has_video());
    assert!(!staged.exists());
    assert!(job_workspaces(&h).await.is_empty());
}

#[tokio::test]
async fn transcode_failure_leaves_lesson_untouched_and_cleans_up() {
    let h = harness_with(FakeTranscoder::new(30.0).with_transcode_failure(), false).await;
    let staged = stage_source(&h).await;

    let err = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Transcode(_)));

    // The commit never ran, so readers still see the old (empty) state
    let lesson = h.catalog.get_lesson(h.lesson).await.unwrap().unwrap();
    assert!(!lesson.has_video());
    assert!(job_workspaces(&h).await.is_empty());
}

#[tokio::test]
async fn students_are_always_forbidden() {
    let h = harness(30.0).await;
    let staged = stage_source(&h).await;

    let err = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Student, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert!(h.storage.keys().await.is_empty());
    assert!(!staged.exists());
}

#[tokio::test]
async fn instructors_cannot_touch_foreign_courses() {
    let h = harness(30.0).await;
    let staged = stage_source(&h).await;

    let err = h
        .pipeline
        .upload(&staged, h.lesson, Uuid::new_v4(), Role::Instructor, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Delete and watermark follow the same rule
    let err = h
        .pipeline
        .delete(h.lesson, Uuid::new_v4(), Role::Instructor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn missing_lesson_fails_not_found() {
    let h = harness(30.0).await;
    let staged = stage_source(&h).await;

    let err = h
        .pipeline
        .upload(&staged, Uuid::new_v4(), h.instructor, Role::Instructor, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delete_clears_fields_and_is_idempotent() {
    let h = harness(30.0).await;
    let staged = stage_source(&h).await;

    let outcome = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap();
    assert!(h.storage.contains(&outcome.artifacts.video_key).await);

    h.pipeline
        .delete(h.lesson, h.instructor, Role::Instructor)
        .await
        .unwrap();

    let lesson = h.catalog.get_lesson(h.lesson).await.unwrap().unwrap();
    assert!(lesson.video_url.is_none());
    assert!(lesson.video_key.is_none());
    assert!(!h.storage.contains(&outcome.artifacts.video_key).await);

    // Second delete on an already-empty lesson succeeds
    h.pipeline
        .delete(h.lesson, h.instructor, Role::Instructor)
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_tolerates_object_already_gone() {
    let h = harness(30.0).await;
    let staged = stage_source(&h).await;

    let outcome = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap();

    // Someone removed the object out of band
    h.storage.delete(&outcome.artifacts.video_key).await.unwrap();

    h.pipeline
        .delete(h.lesson, h.instructor, Role::Admin)
        .await
        .unwrap();
    let lesson = h.catalog.get_lesson(h.lesson).await.unwrap().unwrap();
    assert!(!lesson.has_video());
}

#[tokio::test]
async fn concurrent_uploads_stay_in_their_own_lanes() {
    let h = harness(30.0).await;

    // Second lesson on the same course
    let lesson_b = Uuid::new_v4();
    h.catalog
        .insert_lesson(Lesson {
            id: lesson_b,
            course_id: h.course,
            video_url: None,
            video_key: None,
            thumbnail_url: None,
            duration_seconds: None,
        })
        .await;

    let staged_a = stage_source(&h).await;
    let staged_b = stage_source(&h).await;

    let (a, b) = tokio::join!(
        h.pipeline
            .upload(&staged_a, h.lesson, h.instructor, Role::Instructor, None),
        h.pipeline
            .upload(&staged_b, lesson_b, h.instructor, Role::Instructor, None),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let prefix_a = format!("{}", h.lesson);
    let prefix_b = format!("{}", lesson_b);
    for key in a
        .artifacts
        .segment_keys
        .iter()
        .chain([&a.artifacts.video_key, &a.artifacts.manifest_key])
    {
        assert!(key.contains(&prefix_a));
        assert!(!key.contains(&prefix_b));
    }
    for key in b
        .artifacts
        .segment_keys
        .iter()
        .chain([&b.artifacts.video_key, &b.artifacts.manifest_key])
    {
        assert!(key.contains(&prefix_b));
        assert!(!key.contains(&prefix_a));
    }

    // Both temp workspaces reclaimed
    assert!(job_workspaces(&h).await.is_empty());
}

#[tokio::test]
async fn watermark_swaps_key_and_retains_old_artifact_by_default() {
    let h = harness(30.0).await;
    let staged = stage_source(&h).await;

    let outcome = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap();
    let old_key = outcome.artifacts.video_key.clone();

    let wm = h
        .pipeline
        .watermark(h.lesson, "Coursa Preview", h.instructor, Role::Instructor)
        .await
        .unwrap();

    assert_ne!(wm.video_key, old_key);
    let lesson = h.catalog.get_lesson(h.lesson).await.unwrap().unwrap();
    assert_eq!(lesson.video_key.as_deref(), Some(wm.video_key.as_str()));

    // Default policy: the superseded artifact stays for rollback
    assert!(h.storage.contains(&old_key).await);
    assert!(h.storage.contains(&wm.video_key).await);
    assert!(job_workspaces(&h).await.is_empty());
}

#[tokio::test]
async fn watermark_can_delete_replaced_artifact_when_configured() {
    let h = harness_with(FakeTranscoder::new(30.0), true).await;
    let staged = stage_source(&h).await;

    let outcome = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap();
    let old_key = outcome.artifacts.video_key.clone();

    let wm = h
        .pipeline
        .watermark(h.lesson, "Coursa", h.instructor, Role::Admin)
        .await
        .unwrap();

    assert!(!h.storage.contains(&old_key).await);
    assert!(h.storage.contains(&wm.video_key).await);
}

#[tokio::test]
async fn watermark_without_published_video_fails_not_found() {
    let h = harness(30.0).await;
    let err = h
        .pipeline
        .watermark(h.lesson, "Coursa", h.instructor, Role::Instructor)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn short_clip_clamps_thumbnail_offset() {
    // 4-second clip: the default 5s offset must be clamped inside the clip,
    // which the fake rejects if the pipeline fails to do so
    let h = harness(4.0).await;
    let staged = stage_source(&h).await;

    let outcome = h
        .pipeline
        .upload(&staged, h.lesson, h.instructor, Role::Instructor, None)
        .await
        .unwrap();
    assert!(h.storage.contains(&outcome.artifacts.thumbnail_key).await);
}
