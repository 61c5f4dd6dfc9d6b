use nalgebra as na;
use serde::Serialize;

pub type Point2 = na::Point2<f64>;
pub type Point3 = na::Point3<f64>;

/// Correspondence between a keypoint of image 1 (`query_idx`) and one of image 2 (`train_idx`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl Match {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Match {
        Match {
            query_idx,
            train_idx,
            distance,
        }
    }
}

/// Rigid transform taking camera-1 coordinates into camera-2 coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePose {
    pub rotation: na::Matrix3<f64>,
    pub translation: na::Vector3<f64>,
}

impl RelativePose {
    pub fn new(rotation: na::Matrix3<f64>, translation: na::Vector3<f64>) -> RelativePose {
        RelativePose {
            rotation,
            translation,
        }
    }

    pub fn identity() -> RelativePose {
        RelativePose {
            rotation: na::Matrix3::identity(),
            translation: na::Vector3::zeros(),
        }
    }

    /// Axis-angle form of the rotation.
    pub fn rvec(&self) -> na::Vector3<f64> {
        na::Rotation3::from_matrix_unchecked(self.rotation).scaled_axis()
    }

    pub fn transform_point(&self, p: &Point3) -> na::Vector3<f64> {
        self.rotation * p.coords + self.translation
    }
}
