use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub max_features: usize,
    pub octaves: usize,
    pub scale_factor: f32,
    /// Corner response threshold relative to the strongest response of a level.
    pub response_threshold: f32,
    /// Keypoints closer than this to the level border are skipped.
    pub border: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_features: 3000,
            octaves: 4,
            scale_factor: 1.5,
            response_threshold: 0.01,
            border: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub ratio_threshold: f32,
    pub fundamental_threshold_px: f64,
    pub fundamental_confidence: f64,
    pub essential_threshold_px: f64,
    pub essential_confidence: f64,
    pub ransac_max_iterations: usize,
    pub ransac_seed: u64,
    pub min_inlier_matches: usize,
    /// Triangulated points must satisfy `0 < z < max_depth` in the camera-1 frame.
    pub max_depth: f64,
    pub field_of_view_deg: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.75,
            fundamental_threshold_px: 3.0,
            fundamental_confidence: 0.99,
            essential_threshold_px: 1.0,
            essential_confidence: 0.999,
            ransac_max_iterations: 2000,
            ransac_seed: 0,
            min_inlier_matches: 20,
            max_depth: 50.0,
            field_of_view_deg: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub default_ceiling_height: f64,
    /// Vertical spread must exceed this to be trusted as the ceiling height.
    pub min_vertical_extent: f64,
    /// Widths outside `[min, max]` are rescaled to `target_width`.
    pub plausible_width: (f64, f64),
    pub target_width: f64,
    /// Point counts strictly above which the first / second window hypothesis is emitted.
    pub window_point_thresholds: (usize, usize),
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            default_ceiling_height: 2.7,
            min_vertical_extent: 1.5,
            plausible_width: (2.0, 20.0),
            target_width: 5.0,
            window_point_thresholds: (100, 500),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub extractor: ExtractorConfig,
    pub reconstruction: ReconstructionConfig,
    pub room: RoomConfig,
}
