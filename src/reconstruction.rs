//! Two-view reconstruction.
//!
//! Stages run strictly in order and stop at the first fatal condition:
//! extract, ratio-test match, fundamental filtering, inlier count check,
//! robust essential matrix, cheirality pose selection, triangulation of the
//! essential inliers and finally depth pruning.

use image::DynamicImage;
use log::{debug, info, trace, warn};
use nalgebra as na;
use serde::Serialize;

use crate::camera::{Camera, intrinsics_from_image_size};
use crate::config::ReconstructionConfig;
use crate::detected_points::ImageFeatures;
use crate::error::{Result, RoomError};
use crate::features::extractor::{FeatureExtractor, PyramidExtractor};
use crate::features::extract_all;
use crate::features::matcher::{DescriptorMatcher, matched_points};
use crate::geometry::epipolar::{essential_from_fundamental, find_essential};
use crate::geometry::pose::{PoseCandidate, estimate_pose_from_essential};
use crate::geometry::ransac::RansacOptions;
use crate::geometry::triangulation::triangulate_with_cameras;
use crate::types::{Match, Point2, Point3};

/// Counts collected along the pipeline, reported alongside the room.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconstructionStats {
    pub keypoints_per_image: Vec<usize>,
    pub raw_matches: usize,
    pub geometric_inliers: usize,
    pub essential_inliers: usize,
    pub positive_depth: usize,
    pub triangulated: usize,
    pub kept: usize,
}

#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Points in the camera-1 frame with `0 < z < max_depth`.
    pub points: Vec<Point3>,
    /// Camera 1 at the identity pose, camera 2 at the recovered relative pose.
    pub cameras: [Camera; 2],
    pub pose_candidate: PoseCandidate,
    /// Geometrically filtered matches between the first two images.
    pub matches: Vec<Match>,
    /// Features of every input image, empty when reconstructing from features or points.
    pub features: Vec<ImageFeatures>,
    pub stats: ReconstructionStats,
}

/// Keeps points strictly in front of camera 1 and strictly closer than `max_depth`.
///
/// Non-finite points are dropped as well.
pub fn prune_by_depth(points: &[Point3], max_depth: f64) -> Vec<Point3> {
    points
        .iter()
        .filter(|p| p.z > 0.0 && p.z < max_depth)
        .copied()
        .collect()
}

pub struct Reconstructor<E: FeatureExtractor = PyramidExtractor> {
    pub extractor: E,
    pub matcher: DescriptorMatcher,
    pub config: ReconstructionConfig,
    /// Overrides the intrinsics guessed from the first image.
    pub intrinsics: Option<na::Matrix3<f64>>,
}

impl Default for Reconstructor<PyramidExtractor> {
    fn default() -> Self {
        Reconstructor::new(PyramidExtractor::default(), ReconstructionConfig::default())
    }
}

impl<E: FeatureExtractor> Reconstructor<E> {
    pub fn new(extractor: E, config: ReconstructionConfig) -> Reconstructor<E> {
        Reconstructor {
            extractor,
            matcher: DescriptorMatcher::new(config.ratio_threshold),
            config,
            intrinsics: None,
        }
    }

    pub fn with_intrinsics(mut self, k: na::Matrix3<f64>) -> Reconstructor<E> {
        self.intrinsics = Some(k);
        self
    }

    /// Intrinsics used for a set of images: the override, or a pinhole guess
    /// from the first image's resolution.
    pub fn intrinsics_for(&self, first: &DynamicImage) -> na::Matrix3<f64> {
        self.intrinsics.unwrap_or_else(|| {
            intrinsics_from_image_size(
                first.width(),
                first.height(),
                self.config.field_of_view_deg,
            )
        })
    }

    fn fundamental_options(&self) -> RansacOptions {
        RansacOptions {
            max_iters: self.config.ransac_max_iterations,
            thresh: self.config.fundamental_threshold_px,
            min_inliers: 8,
            confidence: self.config.fundamental_confidence,
            seed: self.config.ransac_seed,
            refit_on_inliers: true,
        }
    }

    fn essential_options(&self) -> RansacOptions {
        RansacOptions {
            max_iters: self.config.ransac_max_iterations,
            thresh: self.config.essential_threshold_px,
            min_inliers: 8,
            confidence: self.config.essential_confidence,
            seed: self.config.ransac_seed,
            refit_on_inliers: true,
        }
    }

    /// Reconstructs from the first two of `images`; further images only
    /// contribute to the keypoint statistics.
    pub fn reconstruct(&self, images: &[DynamicImage]) -> Result<Reconstruction> {
        match images.len() {
            0 => return Err(RoomError::EmptyImageSet),
            1 => return Err(RoomError::NotEnoughImages { found: 1 }),
            n => info!("processing {} images", n),
        }
        let k = self.intrinsics_for(&images[0]);
        let features = extract_all(&self.extractor, images);
        for (i, f) in features.iter().enumerate() {
            trace!("image {}: {} keypoints", i, f.len());
        }
        let mut reconstruction = self.reconstruct_from_features(&k, &features[0], &features[1])?;
        reconstruction.stats.keypoints_per_image = features.iter().map(|f| f.len()).collect();
        reconstruction.features = features;
        Ok(reconstruction)
    }

    /// Matches two feature sets and reconstructs from the surviving correspondences.
    pub fn reconstruct_from_features(
        &self,
        k: &na::Matrix3<f64>,
        features1: &ImageFeatures,
        features2: &ImageFeatures,
    ) -> Result<Reconstruction> {
        let mut stats = ReconstructionStats {
            keypoints_per_image: vec![features1.len(), features2.len()],
            ..Default::default()
        };
        let matches = self
            .matcher
            .match_descriptors(&features1.descriptors, &features2.descriptors);
        stats.raw_matches = matches.len();
        info!("{} ratio-test matches", matches.len());

        let filtered = self.matcher.filter_by_geometry(
            features1,
            features2,
            &matches,
            &self.fundamental_options(),
        );
        stats.geometric_inliers = filtered.inliers.len();
        info!("{} matches after geometric filtering", filtered.inliers.len());

        let (pts1, pts2) = matched_points(features1, features2, &filtered.inliers);
        let mut reconstruction = self.solve(k, &pts1, &pts2, filtered.fundamental, stats)?;
        reconstruction.matches = filtered.inliers;
        Ok(reconstruction)
    }

    /// Reconstructs from already filtered pixel correspondences.
    pub fn reconstruct_from_correspondences(
        &self,
        k: &na::Matrix3<f64>,
        pts1: &[Point2],
        pts2: &[Point2],
    ) -> Result<Reconstruction> {
        let stats = ReconstructionStats {
            raw_matches: pts1.len(),
            geometric_inliers: pts1.len(),
            ..Default::default()
        };
        self.solve(k, pts1, pts2, None, stats)
    }

    fn solve(
        &self,
        k: &na::Matrix3<f64>,
        pts1: &[Point2],
        pts2: &[Point2],
        fundamental: Option<na::Matrix3<f64>>,
        mut stats: ReconstructionStats,
    ) -> Result<Reconstruction> {
        let required = self.config.min_inlier_matches;
        if pts1.len() < required {
            return Err(RoomError::InsufficientCorrespondences {
                found: pts1.len(),
                required,
            });
        }

        let (essential, inlier_mask) = match find_essential(pts1, pts2, k, &self.essential_options())
        {
            Some(est) => (est.essential, est.inlier_mask),
            None => {
                let essential = fundamental
                    .and_then(|f| essential_from_fundamental(&f, k))
                    .ok_or_else(|| {
                        RoomError::DegenerateGeometry(
                            "no essential matrix could be estimated".to_string(),
                        )
                    })?;
                warn!("robust essential estimation failed, using K^T F K");
                (essential, vec![true; pts1.len()])
            }
        };
        stats.essential_inliers = inlier_mask.iter().filter(|&&m| m).count();
        debug!("{} essential inliers", stats.essential_inliers);

        let pose = estimate_pose_from_essential(&essential, k, pts1, pts2);
        stats.positive_depth = pose.positive_depth_count;
        if pose.positive_depth_count == 0 {
            warn!("no pose candidate places points in front of both cameras");
        }
        debug!(
            "selected {:?}, rvec {:?}, t {:?}",
            pose.candidate,
            pose.pose.rvec().as_slice(),
            pose.pose.translation.as_slice()
        );

        let cam1 = Camera::new(*k);
        let cam2 = Camera::new(*k).with_pose(pose.pose.rotation, pose.pose.translation);

        let (in1, in2): (Vec<_>, Vec<_>) = pts1
            .iter()
            .zip(pts2.iter())
            .zip(inlier_mask.iter())
            .filter(|(_, m)| **m)
            .map(|((a, b), _)| (*a, *b))
            .unzip();
        let triangulated = triangulate_with_cameras(&cam1, &cam2, &in1, &in2);
        stats.triangulated = triangulated.len();

        let points = prune_by_depth(&triangulated, self.config.max_depth);
        stats.kept = points.len();
        info!(
            "reconstructed {} points ({} pruned by depth)",
            points.len(),
            triangulated.len() - points.len()
        );

        Ok(Reconstruction {
            points,
            cameras: [cam1, cam2],
            pose_candidate: pose.candidate,
            matches: Vec::new(),
            features: Vec::new(),
            stats,
        })
    }
}
