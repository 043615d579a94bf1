//! Core video data models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source file information extracted by the probe step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
    pub fps: f32,
}

impl SourceMetadata {
    /// Duration rounded up to whole seconds, at least one
    pub fn duration_rounded(&self) -> i32 {
        (self.duration_seconds.ceil() as i32).max(1)
    }
}

/// Progress notification emitted while the encoder runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeProgress {
    pub lesson_id: Uuid,
    /// Encoder output position in milliseconds
    pub out_time_ms: u64,
    /// Fraction of the clip processed, 0.0..=1.0, when the duration is known
    pub fraction: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_rounding() {
        let meta = SourceMetadata {
            duration_seconds: 12.2,
            width: 1280,
            height: 720,
            bitrate_kbps: 2500,
            fps: 30.0,
        };
        assert_eq!(meta.duration_rounded(), 13);
    }

    #[test]
    fn test_duration_floor_of_one() {
        let meta = SourceMetadata {
            duration_seconds: 0.0,
            width: 1,
            height: 1,
            bitrate_kbps: 0,
            fps: 0.0,
        };
        assert_eq!(meta.duration_rounded(), 1);
    }
}
