//! Utility modules for the trajectory tracker

pub mod logger;
pub mod visualization;

pub use visualization::{colors, PathStyle, PointStyle, Visualizer};
