use nalgebra as na;

use crate::types::{Point2, Point3};

/// Pinhole camera with fixed intrinsics and a world-to-camera pose.
///
/// A world point maps into the camera frame as `p_cam = R * p_world + t`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub k: na::Matrix3<f64>,
    pub r: na::Matrix3<f64>,
    pub t: na::Vector3<f64>,
}

impl Camera {
    /// A camera at the world origin looking down +Z.
    pub fn new(k: na::Matrix3<f64>) -> Camera {
        Camera {
            k,
            r: na::Matrix3::identity(),
            t: na::Vector3::zeros(),
        }
    }

    /// Replaces the extrinsics. Orthonormality of `r` is the caller's concern.
    pub fn set_pose(&mut self, r: na::Matrix3<f64>, t: na::Vector3<f64>) {
        self.r = r;
        self.t = t;
    }

    pub fn with_pose(mut self, r: na::Matrix3<f64>, t: na::Vector3<f64>) -> Camera {
        self.set_pose(r, t);
        self
    }

    pub fn to_camera_frame(&self, p: &Point3) -> na::Vector3<f64> {
        self.r * p.coords + self.t
    }

    /// Projects a point, or `None` when it does not lie strictly in front of the camera.
    pub fn project_one(&self, p: &Point3) -> Option<Point2> {
        let p_cam = self.to_camera_frame(p);
        if p_cam.z <= 0.0 {
            return None;
        }
        let uvw = self.k * p_cam;
        Some(Point2::new(uvw.x / uvw.z, uvw.y / uvw.z))
    }

    pub fn project(&self, p3ds: &[Point3]) -> Vec<Option<Point2>> {
        p3ds.iter().map(|p| self.project_one(p)).collect()
    }

    /// `P = K [R | t]`
    pub fn projection_matrix(&self) -> na::Matrix3x4<f64> {
        let mut rt = na::Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.r);
        rt.set_column(3, &self.t);
        self.k * rt
    }

    /// Camera center in world coordinates.
    pub fn center(&self) -> Point3 {
        Point3::from(-(self.r.transpose() * self.t))
    }

    pub fn focal(&self) -> f64 {
        0.5 * (self.k[(0, 0)] + self.k[(1, 1)])
    }
}

/// Pinhole intrinsics guessed from the image resolution and a horizontal field of view.
///
/// `f = max(w, h) / (2 tan(fov / 2))`, principal point at the image center.
pub fn intrinsics_from_image_size(width: u32, height: u32, fov_deg: f64) -> na::Matrix3<f64> {
    let w = width as f64;
    let h = height as f64;
    let focal = w.max(h) / (2.0 * (fov_deg.to_radians() / 2.0).tan());
    na::Matrix3::new(focal, 0.0, w / 2.0, 0.0, focal, h / 2.0, 0.0, 0.0, 1.0)
}
