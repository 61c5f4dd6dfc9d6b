use nalgebra as na;

use crate::camera::Camera;
use crate::types::{Point2, Point3};

fn fill_row(
    a: &mut na::Matrix4<f64>,
    row: usize,
    projection: &na::Matrix3x4<f64>,
    value: f64,
    axis: usize,
) {
    let third = projection.row(2);
    let axis_row = projection.row(axis);
    for col in 0..4 {
        a[(row, col)] = value * third[col] - axis_row[col];
    }
}

/// Linear (DLT) triangulation of one correspondence.
///
/// The homogeneous solution is divided by its last coordinate as is; rays that
/// are parallel produce non-finite coordinates which callers must filter.
pub fn triangulate_point(
    p1: &na::Matrix3x4<f64>,
    p2: &na::Matrix3x4<f64>,
    x1: &Point2,
    x2: &Point2,
) -> Point3 {
    let mut a = na::Matrix4::zeros();
    fill_row(&mut a, 0, p1, x1.x, 0);
    fill_row(&mut a, 1, p1, x1.y, 1);
    fill_row(&mut a, 2, p2, x2.x, 0);
    fill_row(&mut a, 3, p2, x2.y, 1);

    let svd = a.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return Point3::new(f64::NAN, f64::NAN, f64::NAN);
    };
    let xh = v_t.row(svd.singular_values.imin());
    Point3::new(xh[0] / xh[3], xh[1] / xh[3], xh[2] / xh[3])
}

pub fn triangulate(
    p1: &na::Matrix3x4<f64>,
    p2: &na::Matrix3x4<f64>,
    pts1: &[Point2],
    pts2: &[Point2],
) -> Vec<Point3> {
    pts1.iter()
        .zip(pts2.iter())
        .map(|(x1, x2)| triangulate_point(p1, p2, x1, x2))
        .collect()
}

pub fn triangulate_with_cameras(
    cam1: &Camera,
    cam2: &Camera,
    pts1: &[Point2],
    pts2: &[Point2],
) -> Vec<Point3> {
    triangulate(
        &cam1.projection_matrix(),
        &cam2.projection_matrix(),
        pts1,
        pts2,
    )
}
