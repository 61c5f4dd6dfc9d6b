use std::fmt::Display;
use std::io::Cursor;

use image::DynamicImage;
use nalgebra as na;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rerun::RecordingStream;

use crate::camera::Camera;
use crate::detected_points::ImageFeatures;
use crate::types::{Match, Point3};

fn warn_on_err<E: Display>(result: Result<(), E>, what: &str) {
    if let Err(e) = result {
        log::warn!("failed to log {}: {}", what, e);
    }
}

pub fn log_image(recording: &RecordingStream, topic: &str, img: &DynamicImage) {
    let mut bytes: Vec<u8> = Vec::new();
    if let Err(e) = img
        .to_rgb8()
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
    {
        log::warn!("failed to encode {}: {}", topic, e);
        return;
    }
    let image = rerun::Image::from_file_contents(bytes, None);
    warn_on_err(recording.log(format!("{}/image", topic), &image), topic);
}

pub fn id_to_color(id: usize) -> (u8, u8, u8, u8) {
    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
    let color_num = rng.random_range(0..2u32.pow(24));
    (
        ((color_num >> 16) % 256) as u8,
        ((color_num >> 8) % 256) as u8,
        (color_num % 256) as u8,
        255,
    )
}

/// rerun use top left corner as (0, 0)
pub fn rerun_shift(p2ds: &[(f32, f32)]) -> Vec<(f32, f32)> {
    p2ds.iter().map(|(x, y)| (*x + 0.5, *y + 0.5)).collect()
}

pub fn log_keypoints(recording: &RecordingStream, topic: &str, features: &ImageFeatures) {
    let pts: Vec<_> = features
        .keypoints
        .iter()
        .map(|kp| (kp.p2d.x, kp.p2d.y))
        .collect();
    let pts = rerun_shift(&pts);
    warn_on_err(
        recording.log(
            format!("{}/keypoints", topic),
            &rerun::Points2D::new(pts)
                .with_colors([(200u8, 200u8, 200u8, 128u8)])
                .with_radii([rerun::Radius::new_ui_points(2.0)]),
        ),
        topic,
    );
}

/// Logs both ends of every match with a shared color per match.
pub fn log_matches(
    recording: &RecordingStream,
    topics: (&str, &str),
    features1: &ImageFeatures,
    features2: &ImageFeatures,
    matches: &[Match],
) {
    let colors: Vec<_> = (0..matches.len()).map(id_to_color).collect();
    let query: Vec<_> = matches.iter().map(|m| m.query_idx).collect();
    let train: Vec<_> = matches.iter().map(|m| m.train_idx).collect();
    for (topic, features, indices) in [(topics.0, features1, query), (topics.1, features2, train)] {
        let pts: Vec<_> = indices
            .iter()
            .map(|&i| {
                let p = features.point(i);
                (p.x, p.y)
            })
            .collect();
        let pts = rerun_shift(&pts);
        warn_on_err(
            recording.log(
                format!("{}/matches", topic),
                &rerun::Points2D::new(pts)
                    .with_colors(colors.clone())
                    .with_radii([rerun::Radius::new_ui_points(5.0)]),
            ),
            topic,
        );
    }
}

/// Logs a camera as a camera-to-world transform plus a pinhole under `topic`.
pub fn log_camera(recording: &RecordingStream, topic: &str, camera: &Camera, img_w_h: (u32, u32)) {
    let rot = na::Rotation3::from_matrix(&camera.r.transpose());
    let q = na::UnitQuaternion::from_rotation_matrix(&rot);
    let c = camera.center();
    warn_on_err(
        recording.log(
            topic,
            &rerun::Transform3D::from_translation_rotation(
                [c.x as f32, c.y as f32, c.z as f32],
                rerun::Quaternion::from_xyzw([q.i as f32, q.j as f32, q.k as f32, q.w as f32]),
            ),
        ),
        topic,
    );
    let k = camera.k;
    warn_on_err(
        recording.log(
            topic,
            &rerun::Pinhole::from_focal_length_and_resolution(
                [k[(0, 0)] as f32, k[(1, 1)] as f32],
                [img_w_h.0 as f32, img_w_h.1 as f32],
            )
            .with_principal_point([k[(0, 2)] as f32, k[(1, 2)] as f32]),
        ),
        topic,
    );
}

/// Logs the cloud colored by depth along the camera-1 optical axis.
pub fn log_point_cloud(recording: &RecordingStream, topic: &str, points: &[Point3], max_depth: f64) {
    let (positions, colors): (Vec<_>, Vec<_>) = points
        .iter()
        .map(|p| {
            let t = (p.z / max_depth).clamp(0.0, 1.0);
            let c = colorous::TURBO.eval_continuous(t);
            (
                [p.x as f32, p.y as f32, p.z as f32],
                rerun::Color::from_rgb(c.r, c.g, c.b),
            )
        })
        .unzip();
    warn_on_err(
        recording.log(
            topic,
            &rerun::Points3D::new(positions)
                .with_colors(colors)
                .with_radii([rerun::Radius::new_ui_points(3.0)]),
        ),
        topic,
    );
}
