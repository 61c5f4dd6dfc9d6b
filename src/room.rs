//! Room dimensions and window placement from a pruned point cloud.
//!
//! Two-view reconstruction has no absolute scale, so the numbers produced
//! here rest on two crude rules: a room whose width falls outside a
//! plausible range is rescaled to a fixed target width, and windows are
//! placeholders emitted purely from the point count.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::RoomConfig;
use crate::error::{Result, RoomError};
use crate::types::Point3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wall {
    Left,
    Right,
    Top,
    Bottom,
}

/// A window hypothesis, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub wall: Wall,
    pub position_along_wall: f64,
    pub sill_height: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoomDimensions {
    pub width: f64,
    pub length: f64,
    pub height: f64,
    pub area: f64,
}

impl RoomDimensions {
    /// Room from user supplied measurements.
    pub fn manual(width: f64, length: f64, height: f64) -> RoomDimensions {
        RoomDimensions {
            width,
            length,
            height,
            area: width * length,
        }
    }

    /// Used when nothing better is available.
    pub fn fallback() -> RoomDimensions {
        RoomDimensions::manual(5.0, 4.0, 2.7)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default)]
pub struct RoomEstimator {
    pub config: RoomConfig,
}

impl RoomEstimator {
    pub fn new(config: RoomConfig) -> RoomEstimator {
        RoomEstimator { config }
    }

    /// Per-axis minimum and maximum corners of the cloud.
    pub fn bounds(&self, points: &[Point3]) -> Result<(Point3, Point3)> {
        let first = points.first().ok_or(RoomError::EmptyPointCloud)?;
        Ok(points.iter().fold((*first, *first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        }))
    }

    /// Bounding-box dimensions with `y` as the vertical axis.
    ///
    /// The larger horizontal extent becomes the width. A width outside
    /// `plausible_width` rescales all three extents to `target_width`.
    /// Every field is rounded to centimeters.
    pub fn estimate_dimensions(&self, points: &[Point3]) -> Result<RoomDimensions> {
        let (lo, hi) = self.bounds(points)?;
        let extent = hi - lo;
        debug!(
            "bounding box extent x {:.3} y {:.3} z {:.3}",
            extent.x, extent.y, extent.z
        );

        let mut width = extent.x.max(extent.z);
        let mut length = extent.x.min(extent.z);
        let mut height = if extent.y > self.config.min_vertical_extent {
            extent.y
        } else {
            self.config.default_ceiling_height
        };

        let (min_w, max_w) = self.config.plausible_width;
        if width < min_w || width > max_w {
            let scale = if width > 0.0 {
                self.config.target_width / width
            } else {
                1.0
            };
            warn!(
                "implausible room width {:.3}, rescaling by {:.3}",
                width, scale
            );
            width *= scale;
            length *= scale;
            height *= scale;
        }

        Ok(RoomDimensions {
            width: round2(width),
            length: round2(length),
            height: round2(height),
            area: round2(width * length),
        })
    }

    /// Placeholder windows: one on the right wall above the first point-count
    /// threshold, a second on the top wall above the second.
    pub fn detect_windows(&self, points: &[Point3]) -> Result<Vec<Window>> {
        let dims = self.estimate_dimensions(points)?;
        let (first, second) = self.config.window_point_thresholds;
        let mut windows = Vec::new();
        if points.len() > first {
            windows.push(Window {
                wall: Wall::Right,
                position_along_wall: dims.width * 0.3,
                sill_height: 1.0,
                width: 1.2,
                height: 1.5,
            });
            if points.len() > second {
                windows.push(Window {
                    wall: Wall::Top,
                    position_along_wall: dims.length * 0.4,
                    sill_height: 1.0,
                    width: 1.0,
                    height: 1.2,
                });
            }
        }
        Ok(windows)
    }
}
