//! Relative pose from an essential matrix.
//!
//! `E = U diag(1, 1, 0) Vᵀ` decomposes into two rotations `U W Vᵀ`, `U Wᵀ Vᵀ`
//! and a translation direction `±u₃`. Only one of the four combinations puts
//! the scene in front of both cameras; it is selected by counting
//! triangulated points with positive depth in both views.

use log::debug;
use nalgebra as na;

use super::triangulation::triangulate;
use crate::types::{Point2, RelativePose};

/// The four `{R1, R2} x {t, -t}` hypotheses, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseCandidate {
    R1PlusT,
    R1MinusT,
    R2PlusT,
    R2MinusT,
}

impl PoseCandidate {
    pub const ALL: [PoseCandidate; 4] = [
        PoseCandidate::R1PlusT,
        PoseCandidate::R1MinusT,
        PoseCandidate::R2PlusT,
        PoseCandidate::R2MinusT,
    ];
}

#[derive(Debug, Clone, Copy)]
pub struct EssentialDecomposition {
    pub r1: na::Matrix3<f64>,
    pub r2: na::Matrix3<f64>,
    /// Unit translation direction.
    pub t: na::Vector3<f64>,
}

impl EssentialDecomposition {
    pub fn pose(&self, candidate: PoseCandidate) -> RelativePose {
        match candidate {
            PoseCandidate::R1PlusT => RelativePose::new(self.r1, self.t),
            PoseCandidate::R1MinusT => RelativePose::new(self.r1, -self.t),
            PoseCandidate::R2PlusT => RelativePose::new(self.r2, self.t),
            PoseCandidate::R2MinusT => RelativePose::new(self.r2, -self.t),
        }
    }
}

pub fn decompose_essential(e: &na::Matrix3<f64>) -> EssentialDecomposition {
    let svd = e.svd(true, true);
    let (Some(mut u), Some(mut v_t)) = (svd.u, svd.v_t) else {
        return EssentialDecomposition {
            r1: na::Matrix3::identity(),
            r2: na::Matrix3::identity(),
            t: na::Vector3::z(),
        };
    };
    // Move the null direction into the last column / row.
    let smallest = svd.singular_values.imin();
    if smallest != 2 {
        u.swap_columns(smallest, 2);
        v_t.swap_rows(smallest, 2);
    }
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }
    let w = na::Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    EssentialDecomposition {
        r1: u * w * v_t,
        r2: u * w.transpose() * v_t,
        t: u.column(2).normalize(),
    }
}

/// Number of correspondences whose triangulation lies in front of both cameras.
pub fn count_positive_depth(
    k: &na::Matrix3<f64>,
    pose: &RelativePose,
    pts1: &[Point2],
    pts2: &[Point2],
) -> usize {
    let p1 = k * na::Matrix3x4::identity();
    let mut rt = na::Matrix3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&pose.rotation);
    rt.set_column(3, &pose.translation);
    let p2 = k * rt;
    triangulate(&p1, &p2, pts1, pts2)
        .into_iter()
        .filter(|p| p.z > 0.0 && pose.transform_point(p).z > 0.0)
        .count()
}

#[derive(Debug, Clone, Copy)]
pub struct PoseEstimate {
    pub pose: RelativePose,
    pub candidate: PoseCandidate,
    /// Cheirality score of the selected candidate, zero for degenerate input.
    pub positive_depth_count: usize,
}

/// Picks the decomposition of `e` that places the most points in front of both cameras.
///
/// Candidates are scored in [`PoseCandidate::ALL`] order and a later one only
/// wins with a strictly higher count. With no positive-depth points at all the
/// first candidate is returned.
pub fn estimate_pose_from_essential(
    e: &na::Matrix3<f64>,
    k: &na::Matrix3<f64>,
    pts1: &[Point2],
    pts2: &[Point2],
) -> PoseEstimate {
    let decomposition = decompose_essential(e);
    let mut best = PoseEstimate {
        pose: decomposition.pose(PoseCandidate::R1PlusT),
        candidate: PoseCandidate::R1PlusT,
        positive_depth_count: 0,
    };
    for candidate in PoseCandidate::ALL {
        let pose = decomposition.pose(candidate);
        let count = count_positive_depth(k, &pose, pts1, pts2);
        debug!("pose candidate {:?}: {} points in front", candidate, count);
        if count > best.positive_depth_count {
            best = PoseEstimate {
                pose,
                candidate,
                positive_depth_count: count,
            };
        }
    }
    best
}
