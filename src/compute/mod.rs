//! Compute module - Track synthesis, vehicle physics and episode evaluation.

mod camera;
mod episode;
mod geometry;
mod raster;
mod sensor;
mod spline;
mod track;
mod vehicle;

pub mod evolution;

pub use camera::*;
pub use episode::*;
pub use geometry::*;
pub use raster::*;
pub use sensor::*;
pub use spline::*;
pub use track::*;
pub use vehicle::*;

#[cfg(test)]
pub(crate) use track::tests::small_config;
