//! Encoder quality presets
//!
//! A fixed three-tier ladder applied uniformly to every transcode job. The
//! table is a pure constant: presets are never persisted or mutated, and a
//! job references exactly one tier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityLevel::Low),
            "medium" => Ok(QualityLevel::Medium),
            "high" => Ok(QualityLevel::High),
            other => Err(format!("unknown quality level: {}", other)),
        }
    }
}

/// Encoder parameters for one quality tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityPreset {
    pub level: QualityLevel,
    /// x264 constant rate factor
    pub crf: u8,
    /// Bitrate ceiling in kbps
    pub max_bitrate_kbps: u32,
    /// VBV buffer size in kbps
    pub buf_size_kbps: u32,
    pub width: u32,
    pub height: u32,
}

impl QualityPreset {
    /// Resolve the fixed preset table for a tier
    pub fn for_level(level: QualityLevel) -> Self {
        match level {
            QualityLevel::Low => Self {
                level,
                crf: 28,
                max_bitrate_kbps: 800,
                buf_size_kbps: 1600,
                width: 640,
                height: 360,
            },
            QualityLevel::Medium => Self {
                level,
                crf: 23,
                max_bitrate_kbps: 2500,
                buf_size_kbps: 5000,
                width: 1280,
                height: 720,
            },
            QualityLevel::High => Self {
                level,
                crf: 20,
                max_bitrate_kbps: 5000,
                buf_size_kbps: 10000,
                width: 1920,
                height: 1080,
            },
        }
    }

    /// All tiers, lowest bitrate first
    pub fn all() -> [Self; 3] {
        [
            Self::for_level(QualityLevel::Low),
            Self::for_level(QualityLevel::Medium),
            Self::for_level(QualityLevel::High),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_fixed() {
        let ladder = QualityPreset::all();
        assert_eq!(ladder.len(), 3);
        assert!(ladder.windows(2).all(|w| w[0].max_bitrate_kbps < w[1].max_bitrate_kbps));
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!("ultra".parse::<QualityLevel>().is_err());
    }
}
