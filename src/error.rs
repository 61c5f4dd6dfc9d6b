use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of [`RoomError`] used by callers deciding on a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    InsufficientCorrespondence,
    DegenerateGeometry,
    Io,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("no images were supplied")]
    EmptyImageSet,
    #[error("need at least 2 images, got {found}")]
    NotEnoughImages { found: usize },
    #[error("point cloud is empty")]
    EmptyPointCloud,
    #[error("insufficient correspondences: {found} inlier matches, need at least {required}")]
    InsufficientCorrespondences { found: usize, required: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("failed to load image {path:?}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::EmptyImageSet
            | RoomError::NotEnoughImages { .. }
            | RoomError::EmptyPointCloud => ErrorKind::Input,
            RoomError::InsufficientCorrespondences { .. } => ErrorKind::InsufficientCorrespondence,
            RoomError::DegenerateGeometry(_) => ErrorKind::DegenerateGeometry,
            RoomError::ImageLoad { .. } | RoomError::Io(_) | RoomError::Json(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, RoomError>;
