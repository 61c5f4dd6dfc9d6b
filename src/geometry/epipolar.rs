//! Fundamental and essential matrix estimation.
//!
//! - `F` relates **pixel** coordinates: `x2ᵀ F x1 = 0`.
//! - `E` relates **normalized** coordinates (`K⁻¹ x`): `x2ᵀ E x1 = 0`.
//!
//! Both use the Hartley-normalized 8-point solver inside [`ransac`].

use log::debug;
use nalgebra as na;

use super::ransac::{Estimator, RansacOptions, RansacResult, ransac};
use crate::types::Point2;

/// Similarity transform moving the centroid to the origin with mean distance `sqrt(2)`.
fn normalize_points(points: &[Point2]) -> (Vec<Point2>, na::Matrix3<f64>) {
    let n = points.len().max(1) as f64;
    let centroid = points
        .iter()
        .fold(na::Vector2::zeros(), |acc, p| acc + p.coords)
        / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<f64>()
        / n;
    let scale = if mean_dist < f64::EPSILON {
        1.0
    } else {
        std::f64::consts::SQRT_2 / mean_dist
    };
    let transform = na::Matrix3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points
        .iter()
        .map(|p| Point2::from((p.coords - centroid) * scale))
        .collect();
    (normalized, transform)
}

fn project_singular_values(m: &na::Matrix3<f64>, essential: bool) -> Option<na::Matrix3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut s = svd.singular_values;
    let smallest = s.imin();
    for i in 0..3 {
        if i == smallest {
            s[i] = 0.0;
        } else if essential {
            s[i] = 1.0;
        }
    }
    Some(u * na::Matrix3::from_diagonal(&s) * v_t)
}

/// Normalized 8-point solver. Needs at least 8 correspondences; the result has rank 2.
pub fn eight_point(pts1: &[Point2], pts2: &[Point2]) -> Option<na::Matrix3<f64>> {
    if pts1.len() != pts2.len() || pts1.len() < 8 {
        return None;
    }
    let (n1, t1) = normalize_points(pts1);
    let (n2, t2) = normalize_points(pts2);

    // SVD of a wide matrix has no nullspace row, pad to square.
    let rows = n1.len().max(9);
    let mut a = na::DMatrix::<f64>::zeros(rows, 9);
    for (r, (p1, p2)) in n1.iter().zip(n2.iter()).enumerate() {
        let (x1, y1, x2, y2) = (p1.x, p1.y, p2.x, p2.y);
        a[(r, 0)] = x2 * x1;
        a[(r, 1)] = x2 * y1;
        a[(r, 2)] = x2;
        a[(r, 3)] = y2 * x1;
        a[(r, 4)] = y2 * y1;
        a[(r, 5)] = y2;
        a[(r, 6)] = x1;
        a[(r, 7)] = y1;
        a[(r, 8)] = 1.0;
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let f_vec = v_t.row(svd.singular_values.imin());
    let f = na::Matrix3::from_row_slice(f_vec.transpose().as_slice());
    let f = project_singular_values(&f, false)?;
    let f = t2.transpose() * f * t1;
    let norm = f.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    Some(f / norm)
}

/// 8-point solver on normalized coordinates with singular values forced to `(1, 1, 0)`.
pub fn essential_eight_point(x1: &[Point2], x2: &[Point2]) -> Option<na::Matrix3<f64>> {
    let e = eight_point(x1, x2)?;
    project_singular_values(&e, true)
}

/// `E = Kᵀ F K`, projected onto the essential manifold.
pub fn essential_from_fundamental(
    f: &na::Matrix3<f64>,
    k: &na::Matrix3<f64>,
) -> Option<na::Matrix3<f64>> {
    project_singular_values(&(k.transpose() * f * k), true)
}

/// Larger of the two point-to-epipolar-line distances, in the units of the points.
pub fn epipolar_line_distance(f: &na::Matrix3<f64>, x1: &Point2, x2: &Point2) -> f64 {
    let h1 = x1.to_homogeneous();
    let h2 = x2.to_homogeneous();
    let l2 = f * h1;
    let l1 = f.transpose() * h2;
    let algebraic = h2.dot(&l2).abs();
    let n2 = (l2.x * l2.x + l2.y * l2.y).sqrt();
    let n1 = (l1.x * l1.x + l1.y * l1.y).sqrt();
    if n1 < 1e-12 || n2 < 1e-12 {
        return f64::INFINITY;
    }
    (algebraic / n1).max(algebraic / n2)
}

/// First-order geometric (Sampson) distance.
pub fn sampson_distance(e: &na::Matrix3<f64>, x1: &Point2, x2: &Point2) -> f64 {
    let h1 = x1.to_homogeneous();
    let h2 = x2.to_homogeneous();
    let ex1 = e * h1;
    let etx2 = e.transpose() * h2;
    let denom = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;
    if denom < 1e-24 {
        return f64::INFINITY;
    }
    let num = h2.dot(&ex1);
    (num * num / denom).sqrt()
}

fn split_pairs(data: &[(Point2, Point2)], idxs: &[usize]) -> (Vec<Point2>, Vec<Point2>) {
    idxs.iter().map(|&i| data[i]).unzip()
}

pub struct FundamentalEstimator;

impl Estimator for FundamentalEstimator {
    type Datum = (Point2, Point2);
    type Model = na::Matrix3<f64>;

    const MIN_SAMPLES: usize = 8;

    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
        let (p1, p2) = split_pairs(data, sample);
        eight_point(&p1, &p2)
    }

    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64 {
        epipolar_line_distance(model, &datum.0, &datum.1)
    }

    fn refit(&self, data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        self.fit(data, inliers)
    }
}

pub struct EssentialEstimator;

impl Estimator for EssentialEstimator {
    type Datum = (Point2, Point2);
    type Model = na::Matrix3<f64>;

    const MIN_SAMPLES: usize = 8;

    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
        let (x1, x2) = split_pairs(data, sample);
        essential_eight_point(&x1, &x2)
    }

    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64 {
        sampson_distance(model, &datum.0, &datum.1)
    }

    fn refit(&self, data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        self.fit(data, inliers)
    }
}

/// Robust fundamental matrix over pixel correspondences.
pub fn find_fundamental(
    pts1: &[Point2],
    pts2: &[Point2],
    opts: &RansacOptions,
) -> RansacResult<na::Matrix3<f64>> {
    let data: Vec<_> = pts1.iter().copied().zip(pts2.iter().copied()).collect();
    let res = ransac(&FundamentalEstimator, &data, opts);
    debug!(
        "fundamental ransac: {}/{} inliers after {} iterations",
        res.inliers.len(),
        data.len(),
        res.iters
    );
    res
}

#[derive(Debug, Clone)]
pub struct EssentialEstimate {
    pub essential: na::Matrix3<f64>,
    /// One flag per supplied correspondence.
    pub inlier_mask: Vec<bool>,
    pub inlier_count: usize,
}

pub fn normalize_with_k(k_inv: &na::Matrix3<f64>, p: &Point2) -> Point2 {
    let n = k_inv * p.to_homogeneous();
    Point2::new(n.x / n.z, n.y / n.z)
}

/// Robust essential matrix from pixel correspondences.
///
/// `opts.thresh` is in pixels and is converted to normalized units with the
/// mean focal length of `k`.
pub fn find_essential(
    pts1: &[Point2],
    pts2: &[Point2],
    k: &na::Matrix3<f64>,
    opts: &RansacOptions,
) -> Option<EssentialEstimate> {
    let k_inv = k.try_inverse()?;
    let focal = 0.5 * (k[(0, 0)] + k[(1, 1)]);
    let data: Vec<_> = pts1
        .iter()
        .zip(pts2.iter())
        .map(|(a, b)| (normalize_with_k(&k_inv, a), normalize_with_k(&k_inv, b)))
        .collect();
    let opts = RansacOptions {
        thresh: opts.thresh / focal,
        ..opts.clone()
    };
    let res = ransac(&EssentialEstimator, &data, &opts);
    debug!(
        "essential ransac: {}/{} inliers after {} iterations",
        res.inliers.len(),
        data.len(),
        res.iters
    );
    let inlier_mask = res.inlier_mask(data.len());
    let inlier_count = res.inliers.len();
    res.model.map(|essential| EssentialEstimate {
        essential,
        inlier_mask,
        inlier_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point3;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn skew(v: &na::Vector3<f64>) -> na::Matrix3<f64> {
        na::Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
    }

    fn scene() -> (na::Matrix3<f64>, na::Vector3<f64>, Vec<Point2>, Vec<Point2>) {
        let r = na::Rotation3::from_euler_angles(0.02, -0.15, 0.03).into_inner();
        let t = na::Vector3::new(-0.8, 0.05, 0.1);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (x1, x2) = (0..60)
            .map(|_| {
                let p = Point3::new(
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-1.5..1.5),
                    rng.random_range(3.0..8.0),
                );
                let c2 = r * p.coords + t;
                (
                    Point2::new(p.x / p.z, p.y / p.z),
                    Point2::new(c2.x / c2.z, c2.y / c2.z),
                )
            })
            .unzip();
        (r, t, x1, x2)
    }

    #[test]
    fn eight_point_satisfies_constraint() {
        let (_, _, x1, x2) = scene();
        let e = essential_eight_point(&x1, &x2).unwrap();
        for (a, b) in x1.iter().zip(x2.iter()) {
            assert!(sampson_distance(&e, a, b) < 1e-8);
        }
        let s = e.svd(false, false).singular_values;
        let mut s: Vec<_> = s.iter().copied().collect();
        s.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert!((s[0] - s[1]).abs() < 1e-9);
        assert!(s[2].abs() < 1e-9);
    }

    #[test]
    fn eight_point_matches_ground_truth_up_to_scale() {
        let (r, t, x1, x2) = scene();
        let gt = skew(&t) * r;
        let gt = gt / gt.norm();
        let e = essential_eight_point(&x1, &x2).unwrap();
        let e = e / e.norm();
        let diff = (e - gt).norm().min((e + gt).norm());
        assert!(diff < 1e-6, "diff {}", diff);
    }

    #[test]
    fn fewer_than_eight_points_is_none() {
        let (_, _, x1, x2) = scene();
        assert!(eight_point(&x1[..7], &x2[..7]).is_none());
    }

    #[test]
    fn essential_ransac_rejects_outliers() {
        let (_, _, x1, mut x2) = scene();
        let k = na::Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
        let to_px = |p: &Point2| {
            let h = k * p.to_homogeneous();
            Point2::new(h.x, h.y)
        };
        for i in [3, 17, 41] {
            x2[i] += na::Vector2::new(0.08, -0.05);
        }
        let p1: Vec<_> = x1.iter().map(to_px).collect();
        let p2: Vec<_> = x2.iter().map(to_px).collect();
        let opts = RansacOptions {
            thresh: 1.0,
            confidence: 0.999,
            ..Default::default()
        };
        let est = find_essential(&p1, &p2, &k, &opts).unwrap();
        assert_eq!(est.inlier_count, 57);
        assert!(!est.inlier_mask[3] && !est.inlier_mask[17] && !est.inlier_mask[41]);
    }

    #[test]
    fn fundamental_line_distance_is_zero_on_exact_data() {
        let (r, t, x1, x2) = scene();
        let k = na::Matrix3::new(700.0, 0.0, 400.0, 0.0, 700.0, 300.0, 0.0, 0.0, 1.0);
        let k_inv = k.try_inverse().unwrap();
        let f = k_inv.transpose() * skew(&t) * r * k_inv;
        for (a, b) in x1.iter().zip(x2.iter()) {
            let pa = k * a.to_homogeneous();
            let pb = k * b.to_homogeneous();
            let d = epipolar_line_distance(&f, &Point2::new(pa.x, pa.y), &Point2::new(pb.x, pb.y));
            assert!(d < 1e-6);
        }
    }
}
