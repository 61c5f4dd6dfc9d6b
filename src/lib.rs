pub mod camera;
pub mod config;
pub mod data_loader;
pub mod detected_points;
pub mod error;
pub mod features;
pub mod geometry;
pub mod io;
pub mod reconstruction;
pub mod room;
pub mod types;
pub mod visualization;

pub use error::{ErrorKind, Result, RoomError};
