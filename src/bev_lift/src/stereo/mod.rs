//! Temporal stereo: bilinear warping and the group-wise cost volume.

pub mod cost_volume;
pub mod sample;

pub use cost_volume::{CostVolumeBuilder, StereoConfig, StereoFrames};
pub use sample::grid_sample_bilinear;
