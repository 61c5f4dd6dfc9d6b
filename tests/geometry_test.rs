mod common;

use nalgebra as na;
use room_reconstruction::camera::{Camera, intrinsics_from_image_size};
use room_reconstruction::geometry::{
    PoseCandidate, decompose_essential, estimate_pose_from_essential, find_essential,
    triangulate_with_cameras,
};
use room_reconstruction::geometry::ransac::RansacOptions;
use room_reconstruction::types::Point3;

fn skew(v: &na::Vector3<f64>) -> na::Matrix3<f64> {
    na::Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

#[test]
fn test_projection_triangulation_round_trip() {
    let s = common::scene(50, 1);
    assert_eq!(s.pts1.len(), 50);
    assert_eq!(s.pts2.len(), 50);
    let recovered = triangulate_with_cameras(&s.cam1, &s.cam2, &s.pts1, &s.pts2);
    for (p, q) in s.points.iter().zip(recovered.iter()) {
        assert!((p - q).norm() < 1e-6, "{:?} vs {:?}", p, q);
    }
}

#[test]
fn test_projection_flags_points_behind() {
    let cam = Camera::new(common::intrinsics());
    let projected = cam.project(&[
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.0, 0.0, -3.0),
    ]);
    assert!(projected[0].is_some());
    assert!(projected[1].is_none());
    assert!(projected[2].is_none());
    let p = projected[0].unwrap();
    assert_eq!((p.x, p.y), (320.0, 240.0));
}

#[test]
fn test_intrinsics_from_resolution() {
    let k = intrinsics_from_image_size(640, 480, 60.0);
    let f = 640.0 / (2.0 * 30f64.to_radians().tan());
    assert!((k[(0, 0)] - f).abs() < 1e-9);
    assert!((k[(1, 1)] - f).abs() < 1e-9);
    assert_eq!(k[(0, 2)], 320.0);
    assert_eq!(k[(1, 2)], 240.0);
}

#[test]
fn test_cheirality_selects_ground_truth() {
    let s = common::scene(40, 2);
    let (r, t) = common::ground_truth_pose();
    let e = skew(&t) * r;
    let est = estimate_pose_from_essential(&e, &common::intrinsics(), &s.pts1, &s.pts2);
    assert_eq!(est.positive_depth_count, 40);
    assert!((est.pose.rotation - r).norm() < 1e-6);
    assert!(est.pose.translation.dot(&t.normalize()) > 1.0 - 1e-9);
}

#[test]
fn test_other_candidates_fail_cheirality() {
    let s = common::scene(40, 3);
    let (r, t) = common::ground_truth_pose();
    let k = common::intrinsics();
    let d = decompose_essential(&(skew(&t) * r));
    let counts: Vec<_> = PoseCandidate::ALL
        .iter()
        .map(|&c| room_reconstruction::geometry::count_positive_depth(&k, &d.pose(c), &s.pts1, &s.pts2))
        .collect();
    assert_eq!(counts.iter().filter(|&&c| c == 40).count(), 1);
    assert!(counts.iter().filter(|&&c| c < 20).count() == 3, "{:?}", counts);
}

#[test]
fn test_robust_essential_recovers_pose() {
    let s = common::scene(60, 4);
    let k = common::intrinsics();
    let opts = RansacOptions {
        confidence: 0.999,
        ..Default::default()
    };
    let est = find_essential(&s.pts1, &s.pts2, &k, &opts).unwrap();
    assert_eq!(est.inlier_count, 60);
    assert!(est.inlier_mask.iter().all(|&m| m));
    let pose = estimate_pose_from_essential(&est.essential, &k, &s.pts1, &s.pts2);
    let (r, t) = common::ground_truth_pose();
    assert!((pose.pose.rotation - r).norm() < 1e-6);
    assert!(pose.pose.translation.dot(&t.normalize()) > 1.0 - 1e-6);
}
