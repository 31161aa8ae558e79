//! Camera geometry: calibration tensors, frustum unprojection to the ego
//! frame and projection of the frustum into a previous frame's image.

pub mod camera;
pub mod projection;
pub mod unproject;

pub use camera::{CameraBatch, CameraParams, CAMERA_FEATURE_DIM};
pub use projection::{sweep_sampling_grid, SamplingGrid, SweepCalibration};
pub use unproject::{unproject, WorldPoints};
