/// Video management handlers - upload, legacy streaming, delete, watermark
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use video_core::constants::ALLOWED_EXTENSIONS;
use video_core::QualityLevel;

use crate::config::Config;
use crate::db::LessonCatalog;
use crate::error::{AppError, Result};
use crate::middleware::AuthedUser;
use crate::models::{
    StreamResponse, UploadResponse, VideoInfoResponse, WatermarkRequest, WatermarkResponse,
};
use crate::services::VideoPipeline;

/// Longest accepted watermark text
const MAX_WATERMARK_LEN: usize = 64;

struct StagedUpload {
    path: PathBuf,
    preset: Option<QualityLevel>,
}

/// Upload a lesson video and run the full publish pipeline
/// POST /api/v1/videos/upload/{lesson_id}
pub async fn upload_video(
    pipeline: web::Data<VideoPipeline>,
    config: web::Data<Config>,
    user: AuthedUser,
    lesson_id: web::Path<Uuid>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let lesson_id = lesson_id.into_inner();
    let staged = stage_multipart(payload, &config).await?;

    let outcome = pipeline
        .upload(&staged.path, lesson_id, user.id, user.role, staged.preset)
        .await?;

    Ok(HttpResponse::Created().json(UploadResponse {
        lesson_id,
        video_url: outcome.artifacts.video_url,
        thumbnail_url: outcome.artifacts.thumbnail_url,
        duration_seconds: outcome.metadata.duration_rounded(),
        manifest_key: outcome.artifacts.manifest_key,
        segment_count: outcome.artifacts.segment_keys.len(),
    }))
}

/// Stream a field's bytes to the staging area, enforcing the size ceiling
/// and the source-type filter before the pipeline ever runs. A rejected
/// request leaves nothing behind in the staging directory.
async fn stage_multipart(payload: Multipart, config: &Config) -> Result<StagedUpload> {
    let staging_dir = config.video.work_dir.join("incoming");
    tokio::fs::create_dir_all(&staging_dir).await?;

    let mut staged_path: Option<PathBuf> = None;
    let result = stage_fields(payload, config, &staging_dir, &mut staged_path).await;

    match result {
        Ok(preset) => {
            let path = staged_path
                .ok_or_else(|| AppError::Validation("missing file field".to_string()))?;
            Ok(StagedUpload { path, preset })
        }
        Err(err) => {
            if let Some(path) = staged_path {
                let _ = tokio::fs::remove_file(&path).await;
            }
            Err(err)
        }
    }
}

async fn stage_fields(
    mut payload: Multipart,
    config: &Config,
    staging_dir: &std::path::Path,
    staged_path: &mut Option<PathBuf>,
) -> Result<Option<QualityLevel>> {
    let mut preset: Option<QualityLevel> = None;

    while let Some(item) = payload.next().await {
        let mut field = item
            .map_err(|e| AppError::Validation(format!("malformed multipart payload: {}", e)))?;
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                if staged_path.is_some() {
                    return Err(AppError::Validation(
                        "duplicate file field".to_string(),
                    ));
                }
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(|f| f.to_string())
                    .unwrap_or_default();
                let content_type = field.content_type().map(|m| m.essence_str().to_string());
                check_source_type(&filename, content_type.as_deref())?;

                let path = staging_dir.join(format!("{}.mp4", Uuid::new_v4()));
                // Record the path up front so the caller reclaims partial
                // writes on any failure below
                *staged_path = Some(path.clone());
                let mut file = tokio::fs::File::create(&path).await?;
                let mut written: u64 = 0;

                while let Some(chunk) = field.next().await {
                    let data = chunk.map_err(|e| {
                        AppError::Validation(format!("upload stream aborted: {}", e))
                    })?;
                    written += data.len() as u64;
                    if written > config.video.max_upload_bytes {
                        return Err(AppError::Validation(format!(
                            "upload exceeds the {} byte limit",
                            config.video.max_upload_bytes
                        )));
                    }
                    file.write_all(&data).await?;
                }
                file.flush().await?;

                if written == 0 {
                    return Err(AppError::Validation("uploaded file is empty".to_string()));
                }
            }
            "preset" => {
                let mut raw = Vec::new();
                while let Some(chunk) = field.next().await {
                    let data = chunk.map_err(|e| {
                        AppError::Validation(format!("upload stream aborted: {}", e))
                    })?;
                    raw.extend_from_slice(&data);
                }
                let text = String::from_utf8(raw)
                    .map_err(|_| AppError::Validation("preset must be UTF-8".to_string()))?;
                preset = Some(
                    text.trim()
                        .parse()
                        .map_err(|e: String| AppError::Validation(e))?,
                );
            }
            other => {
                return Err(AppError::Validation(format!(
                    "unexpected multipart field: {}",
                    other
                )));
            }
        }
    }

    Ok(preset)
}

/// Reject anything that is not a video source before touching disk quota
fn check_source_type(filename: &str, content_type: Option<&str>) -> Result<()> {
    if let Some(ct) = content_type {
        if ct.starts_with("video/") {
            return Ok(());
        }
        if ct != "application/octet-stream" {
            return Err(AppError::Validation(format!(
                "unsupported content type: {}",
                ct
            )));
        }
    }

    let extension = filename
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "unsupported file type: {:?}",
            filename
        )))
    }
}

/// Legacy unauthenticated lookup of the stored URL
/// GET /api/v1/videos/stream/{lesson_id}
pub async fn stream_video(
    catalog: web::Data<Arc<dyn LessonCatalog>>,
    lesson_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let lesson_id = lesson_id.into_inner();
    let lesson = catalog
        .get_lesson(lesson_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

    let video_url = lesson
        .video_url
        .ok_or_else(|| AppError::NotFound("no video published for this lesson".to_string()))?;

    Ok(HttpResponse::Ok().json(StreamResponse {
        lesson_id,
        video_url,
    }))
}

/// Lesson video fields, all nullable when nothing is published
/// GET /api/v1/videos/{lesson_id}/info
pub async fn video_info(
    catalog: web::Data<Arc<dyn LessonCatalog>>,
    _user: AuthedUser,
    lesson_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let lesson = catalog
        .get_lesson(lesson_id.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;

    Ok(HttpResponse::Ok().json(VideoInfoResponse::from(lesson)))
}

/// Remove the stored video and clear the lesson record
/// DELETE /api/v1/videos/{lesson_id}
pub async fn delete_video(
    pipeline: web::Data<VideoPipeline>,
    user: AuthedUser,
    lesson_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    pipeline
        .delete(lesson_id.into_inner(), user.id, user.role)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Re-encode the stored video with a text overlay
/// POST /api/v1/videos/{lesson_id}/watermark
pub async fn watermark_video(
    pipeline: web::Data<VideoPipeline>,
    user: AuthedUser,
    lesson_id: web::Path<Uuid>,
    req: web::Json<WatermarkRequest>,
) -> Result<HttpResponse> {
    let lesson_id = lesson_id.into_inner();
    let text = req.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("watermark text is required".to_string()));
    }
    if text.len() > MAX_WATERMARK_LEN {
        return Err(AppError::Validation(format!(
            "watermark text exceeds {} characters",
            MAX_WATERMARK_LEN
        )));
    }
    if !text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || " @._-".contains(c))
    {
        return Err(AppError::Validation(
            "watermark text may only contain letters, digits, spaces, and @._-".to_string(),
        ));
    }

    let outcome = pipeline
        .watermark(lesson_id, text, user.id, user.role)
        .await?;

    Ok(HttpResponse::Ok().json(WatermarkResponse {
        lesson_id,
        video_key: outcome.video_key,
        video_url: outcome.video_url,
    }))
}
