pub mod epipolar;
pub mod pose;
pub mod ransac;
pub mod triangulation;

pub use epipolar::*;
pub use pose::*;
pub use triangulation::*;
