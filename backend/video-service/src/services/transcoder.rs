/// Transcoder port and FFmpeg adapter
///
/// The pipeline talks to a `Transcoder` trait; production shells out to
/// ffmpeg/ffprobe, while `FakeTranscoder` produces deterministic artifacts so
/// tests and local development never need the encoder binary. Every encoder
/// invocation runs under the configured timeout; a timed-out child is killed
/// and reported as a transcode failure.
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use video_core::constants::{SEGMENT_DURATION_SECS, THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};
use video_core::{QualityPreset, SourceMetadata, TranscodeProgress};

use crate::error::{AppError, Result};
use crate::services::manifest;

/// Artifacts of one adaptive transcode: ordered segments plus the manifest
/// referencing exactly those segments.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub manifest: PathBuf,
    pub segments: Vec<PathBuf>,
}

impl TranscodeOutput {
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.segments.clone();
        paths.push(self.manifest.clone());
        paths
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Extract container metadata; fails when the file cannot be parsed
    async fn probe(&self, input: &Path) -> Result<SourceMetadata>;

    /// Produce fixed-length segments plus a manifest under `out_dir`
    async fn transcode_adaptive(
        &self,
        input: &Path,
        lesson_id: Uuid,
        preset: &QualityPreset,
        duration_seconds: f64,
        out_dir: &Path,
    ) -> Result<TranscodeOutput>;

    /// Extract one still frame at `at_secs` into `out_dir`
    async fn thumbnail(
        &self,
        input: &Path,
        lesson_id: Uuid,
        at_secs: u32,
        out_dir: &Path,
    ) -> Result<PathBuf>;

    /// Re-encode with a text overlay; the source file is left untouched
    async fn watermark(
        &self,
        input: &Path,
        lesson_id: Uuid,
        text: &str,
        out_dir: &Path,
    ) -> Result<PathBuf>;
}

/// Shell-out adapter around ffmpeg/ffprobe
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Duration,
    progress: Option<mpsc::Sender<TranscodeProgress>>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: String, ffprobe_path: String, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            timeout,
            progress: None,
        }
    }

    /// Attach a channel receiving encoder progress events
    pub fn with_progress(mut self, sender: mpsc::Sender<TranscodeProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Wait for an encoder child under the timeout, draining stderr so the
    /// child cannot block on a full pipe. Returns the stderr tail for error
    /// reporting.
    async fn wait_with_timeout(
        &self,
        mut child: Child,
        what: &str,
    ) -> Result<std::result::Result<String, String>> {
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(ref mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => {
                status.map_err(|e| AppError::Transcode(format!("{} wait failed: {}", what, e)))?
            }
            Err(_) => {
                if let Err(err) = child.kill().await {
                    warn!("failed to kill timed-out {} process: {}", what, err);
                }
                return Err(AppError::Transcode(format!(
                    "{} timed out after {}s",
                    what,
                    self.timeout.as_secs()
                )));
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();
        if status.success() {
            Ok(Ok(stderr))
        } else {
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("; ");
            Ok(Err(format!(
                "{} exited with {}: {}",
                what,
                status.code().unwrap_or(-1),
                tail
            )))
        }
    }

    fn spawn_progress_reader(
        &self,
        child: &mut Child,
        lesson_id: Uuid,
        duration_seconds: f64,
    ) {
        let Some(sender) = self.progress.clone() else {
            return;
        };
        let Some(stdout) = child.stdout.take() else {
            return;
        };

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                // -progress emits key=value pairs; out_time_ms counts
                // microseconds despite the name
                if let Some(raw) = line.strip_prefix("out_time_ms=") {
                    if let Ok(micros) = raw.trim().parse::<u64>() {
                        let out_time_ms = micros / 1000;
                        let fraction = if duration_seconds > 0.0 {
                            Some(
                                (out_time_ms as f64 / 1000.0 / duration_seconds).clamp(0.0, 1.0),
                            )
                        } else {
                            None
                        };
                        let event = TranscodeProgress {
                            lesson_id,
                            out_time_ms,
                            fraction,
                        };
                        if sender.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

fn seconds_to_timestamp(secs: u32) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Escape a drawtext value; the HTTP boundary already restricts the charset,
/// this keeps the filter graph well-formed regardless of the call site.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe(&self, input: &Path) -> Result<SourceMetadata> {
        if !input.exists() {
            return Err(AppError::Metadata(format!(
                "input file not found: {}",
                input.display()
            )));
        }

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_streams",
                "-show_format",
                "-of",
                "json",
            ])
            .arg(input)
            .output()
            .await
            .map_err(|e| AppError::Metadata(format!("ffprobe spawn error: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Metadata(
                "ffprobe could not parse the container".to_string(),
            ));
        }

        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::Metadata(format!("ffprobe json parse: {}", e)))?;

        let mut width = 0u32;
        let mut height = 0u32;
        let mut fps = 0.0f32;
        let mut bitrate_kbps = 0u32;

        if let Some(streams) = json.get("streams").and_then(|v| v.as_array()) {
            for stream in streams {
                let codec_type = stream
                    .get("codec_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if codec_type == "video" {
                    width = stream.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                    height = stream.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                    if let Some(rate) = stream.get("avg_frame_rate").and_then(|v| v.as_str()) {
                        if let Some((n, d)) = rate.split_once('/') {
                            if let (Ok(n), Ok(d)) = (n.parse::<f32>(), d.parse::<f32>()) {
                                if d > 0.0 {
                                    fps = n / d;
                                }
                            }
                        }
                    }
                    bitrate_kbps = stream
                        .get("bit_rate")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse::<u32>().ok())
                        .unwrap_or(0)
                        / 1000;
                }
            }
        }

        let duration_seconds = json
            .get("format")
            .and_then(|f| f.get("duration"))
            .and_then(|d| d.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        if duration_seconds <= 0.0 {
            return Err(AppError::Metadata(
                "container reports no duration".to_string(),
            ));
        }

        if bitrate_kbps == 0 {
            bitrate_kbps = json
                .get("format")
                .and_then(|f| f.get("bit_rate"))
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(0)
                / 1000;
        }

        Ok(SourceMetadata {
            duration_seconds,
            width: width.max(1),
            height: height.max(1),
            bitrate_kbps,
            fps,
        })
    }

    async fn transcode_adaptive(
        &self,
        input: &Path,
        lesson_id: Uuid,
        preset: &QualityPreset,
        duration_seconds: f64,
        out_dir: &Path,
    ) -> Result<TranscodeOutput> {
        tokio::fs::create_dir_all(out_dir).await?;

        let segment_pattern = out_dir.join(format!("{}_%05d.ts", lesson_id));
        let scale = format!(
            "scale={}:{}:force_original_aspect_ratio=decrease",
            preset.width, preset.height
        );

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-c:v", "libx264", "-preset", "veryfast"])
            .args(["-crf", &preset.crf.to_string()])
            .args(["-maxrate", &format!("{}k", preset.max_bitrate_kbps)])
            .args(["-bufsize", &format!("{}k", preset.buf_size_kbps)])
            .args(["-vf", &scale])
            .args(["-c:a", "aac", "-b:a", "128k"])
            .args(["-f", "segment"])
            .args(["-segment_time", &SEGMENT_DURATION_SECS.to_string()])
            .args(["-segment_format", "mpegts"])
            .args(["-reset_timestamps", "1"])
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(&segment_pattern)
            // Only pipe progress output when someone is reading it; an
            // unread pipe would eventually stall the encoder
            .stdout(if self.progress.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::Transcode(format!("ffmpeg spawn error: {}", e)))?;

        self.spawn_progress_reader(&mut child, lesson_id, duration_seconds);

        if let Err(detail) = self.wait_with_timeout(child, "ffmpeg segmenter").await? {
            return Err(AppError::Transcode(detail));
        }

        // Collect what the encoder actually produced, ordered by index; the
        // manifest is derived from this listing so it can never reference a
        // segment that does not exist.
        let prefix = format!("{}_", lesson_id);
        let mut segments = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".ts") {
                segments.push(entry.path());
            }
        }
        segments.sort();

        if segments.is_empty() {
            return Err(AppError::Transcode(
                "encoder produced no segments".to_string(),
            ));
        }

        let segment_names: Vec<String> = segments
            .iter()
            .map(|p| p.file_name().unwrap_or_default().to_string_lossy().to_string())
            .collect();

        let manifest_path = manifest::write_media_playlist(
            out_dir,
            &segment_names,
            duration_seconds,
            SEGMENT_DURATION_SECS,
        )?;

        debug!(
            %lesson_id,
            segments = segments.len(),
            "adaptive transcode complete"
        );

        Ok(TranscodeOutput {
            manifest: manifest_path,
            segments,
        })
    }

    async fn thumbnail(
        &self,
        input: &Path,
        lesson_id: Uuid,
        at_secs: u32,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;
        let output_path = out_dir.join(format!("{}.jpg", lesson_id));

        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = THUMBNAIL_WIDTH,
            h = THUMBNAIL_HEIGHT
        );

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .args(["-ss", &seconds_to_timestamp(at_secs)])
            .arg("-i")
            .arg(input)
            .args(["-frames:v", "1"])
            .args(["-vf", &filter])
            .arg(&output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| AppError::Thumbnail(format!("ffmpeg spawn error: {}", e)))?;

        match self.wait_with_timeout(child, "ffmpeg thumbnail").await {
            Ok(Ok(_)) => {}
            Ok(Err(detail)) => return Err(AppError::Thumbnail(detail)),
            Err(AppError::Transcode(msg)) => return Err(AppError::Thumbnail(msg)),
            Err(other) => return Err(other),
        }

        // Seeking past the end exits zero but writes nothing
        let produced = tokio::fs::metadata(&output_path)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(AppError::Thumbnail(format!(
                "no frame at offset {}s",
                at_secs
            )));
        }

        Ok(output_path)
    }

    async fn watermark(
        &self,
        input: &Path,
        lesson_id: Uuid,
        text: &str,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;
        let output_path = out_dir.join(format!("{}-watermarked.mp4", lesson_id));

        // Fixed position and opacity: bottom-right, translucent box
        let filter = format!(
            "drawtext=text='{}':x=w-tw-24:y=h-th-24:fontsize=28:fontcolor=white@0.7:box=1:boxcolor=black@0.3:boxborderw=8",
            escape_drawtext(text)
        );

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-vf", &filter])
            .args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "20"])
            .args(["-c:a", "copy"])
            .arg(&output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| AppError::Watermark(format!("ffmpeg spawn error: {}", e)))?;

        match self.wait_with_timeout(child, "ffmpeg watermark").await {
            Ok(Ok(_)) => {}
            Ok(Err(detail)) => return Err(AppError::Watermark(detail)),
            Err(AppError::Transcode(msg)) => return Err(AppError::Watermark(msg)),
            Err(other) => return Err(other),
        }

        Ok(output_path)
    }
}

/// Deterministic stand-in for the encoder
///
/// Produces real files with fake contents so the pipeline's artifact
/// handling, manifest invariants, and cleanup behavior can be exercised in
/// tests and local development without the binary.
pub struct FakeTranscoder {
    duration_seconds: f64,
    fail_probe: bool,
    fail_transcode: bool,
    fail_thumbnail: bool,
}

impl FakeTranscoder {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            fail_probe: false,
            fail_transcode: false,
            fail_thumbnail: false,
        }
    }

    pub fn with_probe_failure(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub fn with_transcode_failure(mut self) -> Self {
        self.fail_transcode = true;
        self
    }

    pub fn with_thumbnail_failure(mut self) -> Self {
        self.fail_thumbnail = true;
        self
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn probe(&self, input: &Path) -> Result<SourceMetadata> {
        if self.fail_probe {
            return Err(AppError::Metadata(
                "container could not be parsed".to_string(),
            ));
        }
        if !input.exists() {
            return Err(AppError::Metadata(format!(
                "input file not found: {}",
                input.display()
            )));
        }
        Ok(SourceMetadata {
            duration_seconds: self.duration_seconds,
            width: 1280,
            height: 720,
            bitrate_kbps: 2500,
            fps: 30.0,
        })
    }

    async fn transcode_adaptive(
        &self,
        _input: &Path,
        lesson_id: Uuid,
        _preset: &QualityPreset,
        duration_seconds: f64,
        out_dir: &Path,
    ) -> Result<TranscodeOutput> {
        if self.fail_transcode {
            return Err(AppError::Transcode("encoder exited with 1".to_string()));
        }
        tokio::fs::create_dir_all(out_dir).await?;

        let count = manifest::segment_durations(duration_seconds, SEGMENT_DURATION_SECS).len();
        let mut segments = Vec::with_capacity(count);
        let mut segment_names = Vec::with_capacity(count);
        for index in 0..count {
            let name = format!("{}_{:05}.ts", lesson_id, index);
            let path = out_dir.join(&name);
            tokio::fs::write(&path, b"segment").await?;
            segments.push(path);
            segment_names.push(name);
        }

        let manifest_path = manifest::write_media_playlist(
            out_dir,
            &segment_names,
            duration_seconds,
            SEGMENT_DURATION_SECS,
        )?;

        Ok(TranscodeOutput {
            manifest: manifest_path,
            segments,
        })
    }

    async fn thumbnail(
        &self,
        _input: &Path,
        lesson_id: Uuid,
        at_secs: u32,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        if self.fail_thumbnail {
            return Err(AppError::Thumbnail("no frame at offset".to_string()));
        }
        if at_secs as f64 > self.duration_seconds {
            return Err(AppError::Thumbnail(format!(
                "no frame at offset {}s",
                at_secs
            )));
        }
        tokio::fs::create_dir_all(out_dir).await?;
        let path = out_dir.join(format!("{}.jpg", lesson_id));
        tokio::fs::write(&path, b"jpeg").await?;
        Ok(path)
    }

    async fn watermark(
        &self,
        input: &Path,
        lesson_id: Uuid,
        _text: &str,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;
        let path = out_dir.join(format!("{}-watermarked.mp4", lesson_id));
        tokio::fs::copy(input, &path).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_core::QualityLevel;

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(seconds_to_timestamp(5), "00:00:05");
        assert_eq!(seconds_to_timestamp(65), "00:01:05");
        assert_eq!(seconds_to_timestamp(3661), "01:01:01");
    }

    #[test]
    fn test_drawtext_escaping() {
        assert_eq!(escape_drawtext("Coursa: draft"), "Coursa\\: draft");
        assert_eq!(escape_drawtext("it's"), "it\\'s");
    }

    #[tokio::test]
    async fn test_fake_transcode_segments_match_manifest_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        tokio::fs::write(&input, b"src").await.unwrap();

        let transcoder = FakeTranscoder::new(25.0);
        let lesson_id = Uuid::new_v4();
        let preset = QualityPreset::for_level(QualityLevel::Medium);
        let output = transcoder
            .transcode_adaptive(&input, lesson_id, &preset, 25.0, dir.path())
            .await
            .unwrap();

        // 25s at 6s per segment: 4 full + 1 short
        assert_eq!(output.segments.len(), 5);
        let playlist = tokio::fs::read_to_string(&output.manifest).await.unwrap();
        for segment in &output.segments {
            let name = segment.file_name().unwrap().to_string_lossy().to_string();
            assert!(playlist.contains(&name));
        }
    }

    #[tokio::test]
    async fn test_fake_thumbnail_rejects_offset_past_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        tokio::fs::write(&input, b"src").await.unwrap();

        let transcoder = FakeTranscoder::new(4.0);
        let err = transcoder
            .thumbnail(&input, Uuid::new_v4(), 9, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Thumbnail(_)));
    }
}
