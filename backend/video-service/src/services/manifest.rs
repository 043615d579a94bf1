/// HLS media playlist construction
///
/// The encoder emits the segments; the playlist is built here, from the
/// probed clip duration and the final segment listing, and written only after
/// every segment exists on disk. That ordering is what guarantees a manifest
/// never references a segment that was not produced.
use std::path::Path;

use crate::error::{AppError, Result};

pub const MANIFEST_NAME: &str = "index.m3u8";

/// Per-segment durations for a clip: full-length segments followed by one
/// shorter tail, or a single short segment for clips under one segment length.
pub fn segment_durations(duration_seconds: f64, segment_seconds: u32) -> Vec<f64> {
    let seg = segment_seconds as f64;
    if duration_seconds <= 0.0 {
        return Vec::new();
    }

    let full = (duration_seconds / seg).floor() as usize;
    let tail = duration_seconds - full as f64 * seg;

    let mut durations = vec![seg; full];
    if tail > 0.01 {
        durations.push(tail);
    } else if durations.is_empty() {
        durations.push(duration_seconds);
    }
    durations
}

/// Render a VOD media playlist referencing `segment_names` in order
pub fn build_media_playlist(
    segment_names: &[String],
    duration_seconds: f64,
    segment_seconds: u32,
) -> String {
    let mut playlist = String::from("#EXTM3U\n");
    playlist.push_str("#EXT-X-VERSION:3\n");
    playlist.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", segment_seconds.max(1)));
    playlist.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
    playlist.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");

    let durations = segment_durations(duration_seconds, segment_seconds);
    for (index, name) in segment_names.iter().enumerate() {
        // Trailing segments beyond the computed schedule get a full-length
        // entry; encoders round segment boundaries to keyframes.
        let duration = durations
            .get(index)
            .copied()
            .unwrap_or(segment_seconds as f64);
        playlist.push_str(&format!("#EXTINF:{:.3},\n", duration));
        playlist.push_str(name);
        playlist.push('\n');
    }

    playlist.push_str("#EXT-X-ENDLIST\n");
    playlist
}

/// Write the playlist next to the segments; fails when the segment list is
/// empty since an empty manifest would publish an unplayable stream.
pub fn write_media_playlist(
    dir: &Path,
    segment_names: &[String],
    duration_seconds: f64,
    segment_seconds: u32,
) -> Result<std::path::PathBuf> {
    if segment_names.is_empty() {
        return Err(AppError::Transcode(
            "encoder produced no segments".to_string(),
        ));
    }

    let manifest_path = dir.join(MANIFEST_NAME);
    let playlist = build_media_playlist(segment_names, duration_seconds, segment_seconds);
    std::fs::write(&manifest_path, playlist)?;
    Ok(manifest_path)
}
