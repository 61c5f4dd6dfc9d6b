use log::debug;
use nalgebra as na;
use rayon::prelude::*;

use crate::detected_points::{Descriptor, ImageFeatures};
use crate::geometry::epipolar::find_fundamental;
use crate::geometry::ransac::RansacOptions;
use crate::types::{Match, Point2};

/// Minimum correspondences needed to attempt a fundamental matrix fit.
pub const MIN_FUNDAMENTAL_MATCHES: usize = 8;

/// Brute-force L2 matcher with Lowe's ratio test.
#[derive(Debug, Clone)]
pub struct DescriptorMatcher {
    pub ratio_threshold: f32,
}

impl Default for DescriptorMatcher {
    fn default() -> Self {
        Self {
            ratio_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeometricFilterResult {
    pub inliers: Vec<Match>,
    /// `None` when too few matches were supplied or no consensus was found.
    pub fundamental: Option<na::Matrix3<f64>>,
}

impl DescriptorMatcher {
    pub fn new(ratio_threshold: f32) -> DescriptorMatcher {
        DescriptorMatcher { ratio_threshold }
    }

    /// Two nearest train descriptors for every query descriptor, nearest first.
    ///
    /// Ties keep the lower train index first.
    pub fn knn2(query: &[Descriptor], train: &[Descriptor]) -> Vec<Vec<Match>> {
        query
            .par_iter()
            .enumerate()
            .map(|(query_idx, q)| {
                let mut best: Option<(usize, f32)> = None;
                let mut second: Option<(usize, f32)> = None;
                for (train_idx, t) in train.iter().enumerate() {
                    let d = q.squared_distance(t);
                    match best {
                        Some((_, bd)) if d >= bd => {
                            if second.is_none_or(|(_, sd)| d < sd) {
                                second = Some((train_idx, d));
                            }
                        }
                        _ => {
                            second = best;
                            best = Some((train_idx, d));
                        }
                    }
                }
                [best, second]
                    .into_iter()
                    .flatten()
                    .map(|(train_idx, d)| Match::new(query_idx, train_idx, d.sqrt()))
                    .collect()
            })
            .collect()
    }

    /// Ratio-test filtered matches from `query` (image 1) into `train` (image 2).
    ///
    /// Either side being empty yields no matches.
    pub fn match_descriptors(&self, query: &[Descriptor], train: &[Descriptor]) -> Vec<Match> {
        if query.is_empty() || train.is_empty() {
            return Vec::new();
        }
        Self::knn2(query, train)
            .into_iter()
            .filter_map(|pair| match pair.as_slice() {
                [best, second] if best.distance < self.ratio_threshold * second.distance => {
                    Some(*best)
                }
                _ => None,
            })
            .collect()
    }

    /// Drops matches inconsistent with a robustly fitted fundamental matrix.
    ///
    /// With fewer than [`MIN_FUNDAMENTAL_MATCHES`] matches, or when RANSAC
    /// finds no model, the input matches are returned untouched.
    pub fn filter_by_geometry(
        &self,
        features1: &ImageFeatures,
        features2: &ImageFeatures,
        matches: &[Match],
        opts: &RansacOptions,
    ) -> GeometricFilterResult {
        if matches.len() < MIN_FUNDAMENTAL_MATCHES {
            debug!(
                "only {} matches, skipping geometric filtering",
                matches.len()
            );
            return GeometricFilterResult {
                inliers: matches.to_vec(),
                fundamental: None,
            };
        }
        let (pts1, pts2) = matched_points(features1, features2, matches);
        let res = find_fundamental(&pts1, &pts2, opts);
        match res.model {
            Some(f) => GeometricFilterResult {
                inliers: res.inliers.iter().map(|&i| matches[i]).collect(),
                fundamental: Some(f),
            },
            None => GeometricFilterResult {
                inliers: matches.to_vec(),
                fundamental: None,
            },
        }
    }
}

/// Pixel coordinates of both ends of every match.
pub fn matched_points(
    features1: &ImageFeatures,
    features2: &ImageFeatures,
    matches: &[Match],
) -> (Vec<Point2>, Vec<Point2>) {
    matches
        .iter()
        .map(|m| {
            let a = features1.point(m.query_idx);
            let b = features2.point(m.train_idx);
            (
                Point2::new(a.x as f64, a.y as f64),
                Point2::new(b.x as f64, b.y as f64),
            )
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: &[f32]) -> Descriptor {
        Descriptor(v.to_vec())
    }

    #[test]
    fn knn_orders_by_distance() {
        let query = [d(&[0.0, 0.0])];
        let train = [d(&[3.0, 0.0]), d(&[1.0, 0.0]), d(&[2.0, 0.0])];
        let knn = DescriptorMatcher::knn2(&query, &train);
        assert_eq!(knn[0].len(), 2);
        assert_eq!(knn[0][0].train_idx, 1);
        assert_eq!(knn[0][1].train_idx, 2);
        assert!((knn[0][0].distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ratio_test_rejects_ambiguous() {
        let query = [d(&[0.0, 0.0]), d(&[10.0, 10.0])];
        let train = [d(&[1.0, 0.0]), d(&[0.0, 1.1]), d(&[10.0, 10.5]), d(&[20.0, 20.0])];
        let matches = DescriptorMatcher::new(0.75).match_descriptors(&query, &train);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].query_idx, 1);
        assert_eq!(matches[0].train_idx, 2);
    }

    #[test]
    fn single_train_descriptor_never_matches() {
        let matches = DescriptorMatcher::default().match_descriptors(&[d(&[0.0])], &[d(&[0.1])]);
        assert!(matches.is_empty());
    }

    #[test]
    fn empty_sets_give_no_matches() {
        let m = DescriptorMatcher::default();
        assert!(m.match_descriptors(&[], &[d(&[1.0])]).is_empty());
        assert!(m.match_descriptors(&[d(&[1.0])], &[]).is_empty());
    }

    #[test]
    fn few_matches_skip_geometry() {
        let features = ImageFeatures::default();
        let matches: Vec<_> = (0..7).map(|i| Match::new(i, i, 0.1)).collect();
        let res = DescriptorMatcher::default().filter_by_geometry(
            &features,
            &features,
            &matches,
            &RansacOptions::default(),
        );
        assert_eq!(res.inliers, matches);
        assert!(res.fundamental.is_none());
    }
}
