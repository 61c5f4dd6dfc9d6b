/// A detected interest point in level-0 pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub p2d: glam::Vec2,
    /// Diameter of the support region in pixels.
    pub size: f32,
    /// Orientation in radians.
    pub angle: f32,
    pub response: f32,
    pub octave: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor(pub Vec<f32>);

impl Descriptor {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn squared_distance(&self, other: &Descriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

/// Keypoints and their descriptors for one image, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct ImageFeatures {
    pub img_w_h: (u32, u32),
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl ImageFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn point(&self, idx: usize) -> glam::Vec2 {
        self.keypoints[idx].p2d
    }
}
