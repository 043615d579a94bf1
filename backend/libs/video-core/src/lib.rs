//! Video pipeline core models and types
//!
//! Shared data structures for video-service and related tooling: encoder
//! quality presets, probed source metadata, and pipeline-wide constants.

pub mod constants;
pub mod models;
pub mod presets;

pub use models::*;
pub use presets::{QualityLevel, QualityPreset};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup_by_level() {
        let preset = QualityPreset::for_level(QualityLevel::Medium);
        assert_eq!(preset.level, QualityLevel::Medium);
        assert_eq!(preset.width, 1280);
        assert_eq!(preset.height, 720);
    }

    #[test]
    fn test_level_round_trip() {
        for level in [QualityLevel::Low, QualityLevel::Medium, QualityLevel::High] {
            assert_eq!(level.as_str().parse::<QualityLevel>().unwrap(), level);
        }
    }
}
