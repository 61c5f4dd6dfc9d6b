pub mod extractor;
pub mod matcher;

pub use extractor::{FeatureExtractor, PyramidExtractor};
pub use matcher::{DescriptorMatcher, GeometricFilterResult};

use image::DynamicImage;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

use crate::detected_points::ImageFeatures;

/// Runs `extractor` over every image in parallel, preserving input order.
pub fn extract_all<E: FeatureExtractor + ?Sized>(
    extractor: &E,
    images: &[DynamicImage],
) -> Vec<ImageFeatures> {
    images
        .par_iter()
        .progress_count(images.len() as u64)
        .map(|img| extractor.extract(img))
        .collect()
}
