use std::path::{Path, PathBuf};

use glob::glob;
use image::{DynamicImage, ImageReader};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

use crate::error::{Result, RoomError};
use crate::visualization::log_image;

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    if let Ok(p) = rp {
        let lower = p.as_os_str().to_string_lossy().to_lowercase();
        for ext in &[".png", ".jpg", ".jpeg"] {
            if lower.ends_with(ext) {
                return Some(p);
            }
        }
    }
    None
}

/// Sorted image paths directly inside `folder`.
pub fn list_images(folder: &Path) -> Vec<PathBuf> {
    let pattern = folder.join("*");
    let Ok(paths) = glob(&pattern.to_string_lossy()) else {
        return Vec::new();
    };
    let mut sorted_path: Vec<PathBuf> = paths.into_iter().filter_map(img_filter).collect();
    sorted_path.sort();
    sorted_path
}

pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let image_error = |source| RoomError::ImageLoad {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(|e| image_error(image::ImageError::IoError(e)))?
        .decode()
        .map_err(image_error)
}

/// Decodes every path in parallel, keeping input order.
///
/// Unreadable files are skipped with a warning; fewer than two decoded
/// images is an error. Decoded images are logged under `img{idx}` when a
/// recording is given, `idx` being the position in `paths`.
pub fn load_images<P: AsRef<Path> + Sync>(
    paths: &[P],
    recording_option: Option<&rerun::RecordingStream>,
) -> Result<Vec<DynamicImage>> {
    if paths.is_empty() {
        return Err(RoomError::EmptyImageSet);
    }
    let decoded: Vec<Option<DynamicImage>> = paths
        .par_iter()
        .enumerate()
        .progress_count(paths.len() as u64)
        .map(|(idx, path)| {
            let path = path.as_ref();
            log::trace!("loading {:?}", path);
            match load_image(path) {
                Ok(img) => {
                    if let Some(recording) = recording_option {
                        log_image(recording, &format!("img{}", idx), &img);
                    }
                    Some(img)
                }
                Err(e) => {
                    log::warn!("skipping image: {}", e);
                    None
                }
            }
        })
        .collect();
    let images: Vec<_> = decoded.into_iter().flatten().collect();
    if images.len() < 2 {
        return Err(RoomError::NotEnoughImages {
            found: images.len(),
        });
    }
    Ok(images)
}
