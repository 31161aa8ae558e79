//! BEV grid layout and camera frustum templates.
//!
//! Both are derived once from configuration and never change afterwards:
//! - [`GridInfo`]: voxel lower bound, cell size and voxel counts along (x, y, z)
//! - [`Frustum`]: `(pixel_x, pixel_y, depth)` samples for one camera's
//!   downsampled feature map, with linear or SID depth spacing

pub mod frustum;
pub mod types;

pub use frustum::Frustum;
pub use types::{AxisRange, DepthSpacing, GridConfig, GridInfo};
