#![allow(dead_code)]

use nalgebra as na;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use room_reconstruction::camera::Camera;
use room_reconstruction::types::{Point2, Point3};

pub fn intrinsics() -> na::Matrix3<f64> {
    na::Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0)
}

pub fn ground_truth_pose() -> (na::Matrix3<f64>, na::Vector3<f64>) {
    let r = na::Rotation3::from_euler_angles(0.02, -0.1, 0.01).into_inner();
    let t = na::Vector3::new(-1.0, 0.05, 0.1);
    (r, t)
}

pub struct Scene {
    pub cam1: Camera,
    pub cam2: Camera,
    pub points: Vec<Point3>,
    pub pts1: Vec<Point2>,
    pub pts2: Vec<Point2>,
}

/// Points spread over a box 4 to 8 units in front of camera 1, seen by both cameras.
pub fn random_points(n: usize, seed: u64) -> Vec<Point3> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Point3::new(
                rng.random_range(-2.0..2.0),
                rng.random_range(-1.5..1.5),
                rng.random_range(4.0..8.0),
            )
        })
        .collect()
}

pub fn scene(n: usize, seed: u64) -> Scene {
    let k = intrinsics();
    let (r, t) = ground_truth_pose();
    let cam1 = Camera::new(k);
    let cam2 = Camera::new(k).with_pose(r, t);
    let points = random_points(n, seed);
    let pts1 = cam1.project(&points).into_iter().flatten().collect();
    let pts2 = cam2.project(&points).into_iter().flatten().collect();
    Scene {
        cam1,
        cam2,
        points,
        pts1,
        pts2,
    }
}
