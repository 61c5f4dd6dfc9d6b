use std::f32::consts::PI;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma};
use log::trace;
use rayon::prelude::*;

use crate::config::ExtractorConfig;
use crate::detected_points::{Descriptor, ImageFeatures, Keypoint};

type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

const PATCH_RADIUS: i32 = 15;
const DESCRIPTOR_GRID: usize = 4;
const DESCRIPTOR_BINS: usize = 8;
const DESCRIPTOR_SAMPLES: usize = 16;
pub const DESCRIPTOR_LEN: usize = DESCRIPTOR_GRID * DESCRIPTOR_GRID * DESCRIPTOR_BINS;

/// Per-image keypoint detection and description.
///
/// Implementations must be deterministic and must return an empty set, not
/// fail, for images without usable texture.
pub trait FeatureExtractor: Sync {
    fn extract(&self, img: &DynamicImage) -> ImageFeatures;
}

/// Multi-scale Shi-Tomasi corners with oriented gradient-histogram descriptors.
#[derive(Debug, Clone, Default)]
pub struct PyramidExtractor {
    pub config: ExtractorConfig,
}

struct Level {
    img: GrayF32,
    /// Level-to-full-resolution pixel scale per axis.
    scale: (f32, f32),
}

impl Level {
    #[inline]
    fn at(&self, x: i32, y: i32) -> f32 {
        let w = self.img.width() as i32;
        self.img.as_raw()[(y * w + x) as usize]
    }

    fn bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let (fx, fy) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i32, y0 as i32);
        let w = self.img.width() as i32 - 1;
        let h = self.img.height() as i32 - 1;
        let (x0, y0) = (x0.clamp(0, w), y0.clamp(0, h));
        let (x1, y1) = ((x0 + 1).min(w), (y0 + 1).min(h));
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
        let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    level: usize,
    x: i32,
    y: i32,
    response: f32,
}

impl PyramidExtractor {
    pub fn new(config: ExtractorConfig) -> PyramidExtractor {
        PyramidExtractor { config }
    }

    fn build_pyramid(&self, gray: &GrayF32) -> Vec<Level> {
        let (w0, h0) = gray.dimensions();
        let min_side = 2 * self.config.border + 8;
        let mut levels = Vec::with_capacity(self.config.octaves);
        let mut current = imageops::blur(gray, 1.0);
        for octave in 0..self.config.octaves.max(1) {
            let (w, h) = current.dimensions();
            if w < min_side || h < min_side {
                break;
            }
            levels.push(Level {
                img: current.clone(),
                scale: (w0 as f32 / w as f32, h0 as f32 / h as f32),
            });
            if octave + 1 == self.config.octaves {
                break;
            }
            let nw = (w as f32 / self.config.scale_factor).round() as u32;
            let nh = (h as f32 / self.config.scale_factor).round() as u32;
            if nw == 0 || nh == 0 {
                break;
            }
            let smoothed = imageops::blur(&current, 0.5 * self.config.scale_factor);
            current = imageops::resize(&smoothed, nw, nh, FilterType::Triangle);
        }
        levels
    }

    /// Minimum eigenvalue of the 5x5 structure tensor at every pixel.
    fn corner_response(level: &Level) -> Vec<f32> {
        let (w, h) = (level.img.width() as i32, level.img.height() as i32);
        let mut gxx = vec![0.0f32; (w * h) as usize];
        let mut gyy = vec![0.0f32; (w * h) as usize];
        let mut gxy = vec![0.0f32; (w * h) as usize];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let gx = (level.at(x + 1, y - 1) + 2.0 * level.at(x + 1, y) + level.at(x + 1, y + 1)
                    - level.at(x - 1, y - 1)
                    - 2.0 * level.at(x - 1, y)
                    - level.at(x - 1, y + 1))
                    / 8.0;
                let gy = (level.at(x - 1, y + 1) + 2.0 * level.at(x, y + 1) + level.at(x + 1, y + 1)
                    - level.at(x - 1, y - 1)
                    - 2.0 * level.at(x, y - 1)
                    - level.at(x + 1, y - 1))
                    / 8.0;
                let idx = (y * w + x) as usize;
                gxx[idx] = gx * gx;
                gyy[idx] = gy * gy;
                gxy[idx] = gx * gy;
            }
        }
        let mut response = vec![0.0f32; (w * h) as usize];
        for y in 3..h - 3 {
            for x in 3..w - 3 {
                let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
                for dy in -2..=2 {
                    for dx in -2..=2 {
                        let idx = ((y + dy) * w + x + dx) as usize;
                        a += gxx[idx];
                        b += gxy[idx];
                        c += gyy[idx];
                    }
                }
                let half_trace = 0.5 * (a + c);
                let det_term = (0.25 * (a - c) * (a - c) + b * b).sqrt();
                response[(y * w + x) as usize] = half_trace - det_term;
            }
        }
        response
    }

    fn detect_level(&self, level_idx: usize, level: &Level) -> Vec<Candidate> {
        let (w, h) = (level.img.width() as i32, level.img.height() as i32);
        let response = Self::corner_response(level);
        let max_response = response.iter().copied().fold(0.0f32, f32::max);
        if max_response <= 1e-8 {
            return Vec::new();
        }
        let threshold = self.config.response_threshold * max_response;
        let border = (self.config.border as i32).max(PATCH_RADIUS + 1);
        let mut out = Vec::new();
        for y in border..h - border {
            for x in border..w - border {
                let r = response[(y * w + x) as usize];
                if r <= threshold {
                    continue;
                }
                // plateaus keep their first pixel in raster order
                let is_max = (-1..=1).all(|dy: i32| {
                    (-1..=1).all(|dx: i32| {
                        let n = response[((y + dy) * w + x + dx) as usize];
                        match (dy, dx) {
                            (0, 0) => true,
                            (dy, dx) if dy < 0 || (dy == 0 && dx < 0) => n < r,
                            _ => n <= r,
                        }
                    })
                });
                if is_max {
                    out.push(Candidate {
                        level: level_idx,
                        x,
                        y,
                        response: r,
                    });
                }
            }
        }
        out
    }

    /// Intensity-centroid orientation over a disc of radius [`PATCH_RADIUS`].
    fn orientation(level: &Level, x: i32, y: i32) -> f32 {
        let (mut m01, mut m10) = (0.0f32, 0.0f32);
        for dy in -PATCH_RADIUS..=PATCH_RADIUS {
            for dx in -PATCH_RADIUS..=PATCH_RADIUS {
                if dx * dx + dy * dy > PATCH_RADIUS * PATCH_RADIUS {
                    continue;
                }
                let v = level.at(x + dx, y + dy);
                m10 += dx as f32 * v;
                m01 += dy as f32 * v;
            }
        }
        m01.atan2(m10)
    }

    fn describe(level: &Level, x: i32, y: i32, angle: f32) -> Descriptor {
        let (sin, cos) = angle.sin_cos();
        let (kx, ky) = (x as f32, y as f32);
        let half = (DESCRIPTOR_SAMPLES as f32 - 1.0) / 2.0;
        let sigma = DESCRIPTOR_SAMPLES as f32 / 2.0;
        let cell = DESCRIPTOR_SAMPLES / DESCRIPTOR_GRID;
        let mut hist = vec![0.0f32; DESCRIPTOR_LEN];
        for i in 0..DESCRIPTOR_SAMPLES {
            for j in 0..DESCRIPTOR_SAMPLES {
                let u = j as f32 - half;
                let v = i as f32 - half;
                let px = kx + cos * u - sin * v;
                let py = ky + sin * u + cos * v;
                // derivatives along the keypoint's own axes
                let gu = level.bilinear(px + cos, py + sin) - level.bilinear(px - cos, py - sin);
                let gv = level.bilinear(px - sin, py + cos) - level.bilinear(px + sin, py - cos);
                let magnitude = (gu * gu + gv * gv).sqrt();
                if magnitude <= 0.0 {
                    continue;
                }
                let weight = (-(u * u + v * v) / (2.0 * sigma * sigma)).exp();
                let ori = gv.atan2(gu).rem_euclid(2.0 * PI);
                let bin = ((ori / (2.0 * PI) * DESCRIPTOR_BINS as f32) as usize) % DESCRIPTOR_BINS;
                let cell_idx = (i / cell) * DESCRIPTOR_GRID + j / cell;
                hist[cell_idx * DESCRIPTOR_BINS + bin] += weight * magnitude;
            }
        }
        normalize_clip(&mut hist, 0.2);
        Descriptor(hist)
    }
}

fn normalize_clip(v: &mut [f32], clip: f32) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return;
    }
    v.iter_mut().for_each(|x| *x = (*x / norm).min(clip));
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

impl FeatureExtractor for PyramidExtractor {
    fn extract(&self, img: &DynamicImage) -> ImageFeatures {
        let gray = img.to_luma32f();
        let levels = self.build_pyramid(&gray);
        let mut candidates: Vec<Candidate> = levels
            .par_iter()
            .enumerate()
            .map(|(i, level)| self.detect_level(i, level))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();
        candidates.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.level.cmp(&b.level))
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        candidates.truncate(self.config.max_features);

        let (keypoints, descriptors): (Vec<_>, Vec<_>) = candidates
            .par_iter()
            .map(|c| {
                let level = &levels[c.level];
                let angle = Self::orientation(level, c.x, c.y);
                let descriptor = Self::describe(level, c.x, c.y, angle);
                let (sx, sy) = level.scale;
                let keypoint = Keypoint {
                    p2d: glam::Vec2::new(
                        (c.x as f32 + 0.5) * sx - 0.5,
                        (c.y as f32 + 0.5) * sy - 0.5,
                    ),
                    size: (2 * PATCH_RADIUS + 1) as f32 * sx,
                    angle,
                    response: c.response,
                    octave: c.level,
                };
                (keypoint, descriptor)
            })
            .unzip();
        trace!(
            "extracted {} keypoints over {} pyramid levels",
            keypoints.len(),
            levels.len()
        );
        ImageFeatures {
            img_w_h: (img.width(), img.height()),
            keypoints,
            descriptors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn checkerboard(w: u32, h: u32, square: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
            if ((x / square) + (y / square)) % 2 == 0 {
                Luma([230])
            } else {
                Luma([20])
            }
        }))
    }

    #[test]
    fn flat_image_has_no_features() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 150, Luma([128])));
        let features = PyramidExtractor::default().extract(&img);
        assert!(features.is_empty());
        assert!(features.descriptors.is_empty());
    }

    #[test]
    fn textured_image_is_deterministic_and_capped() {
        let img = checkerboard(240, 180, 20);
        let extractor = PyramidExtractor::new(ExtractorConfig {
            max_features: 25,
            ..Default::default()
        });
        let a = extractor.extract(&img);
        let b = extractor.extract(&img);
        assert!(!a.is_empty());
        assert!(a.len() <= 25);
        assert_eq!(a.keypoints, b.keypoints);
        assert_eq!(a.descriptors, b.descriptors);
        assert!(a.descriptors.iter().all(|d| d.len() == DESCRIPTOR_LEN));
        assert_eq!(a.img_w_h, (240, 180));
    }

    #[test]
    fn descriptors_are_unit_length_or_zero() {
        let features = PyramidExtractor::default().extract(&checkerboard(160, 160, 16));
        for d in &features.descriptors {
            let norm = d.0.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!(norm < 1e-6 || (norm - 1.0).abs() < 1e-4);
        }
    }
}
