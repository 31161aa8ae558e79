//! Camera-to-BEV view transformation.
//!
//! Lifts per-camera image features into a bird's-eye-view voxel grid by
//! weighting every feature with a per-pixel depth distribution and summing
//! all frustum samples that fall into the same voxel.
//!
//! # Architecture
//!
//! The forward pass is split into stages:
//! - Unprojection: frustum samples `(u, v, d)` to ego-frame points
//! - Planning: voxel ranks, stable sort and interval detection
//! - Depth weights: softmax over depth logits or a discretized Gaussian
//! - Pooling: per-voxel weighted sums via [`bev_pool_ops::pool_reduce`]
//!
//! The uncertainty variants add a smooth-L1 negative log-likelihood depth
//! loss, and the stereo variant a group-wise temporal cost volume.
//!
//! # Usage
//!
//! ```ignore
//! use bev_lift::{TransformerVariant, ViewTransformer, ViewTransformerConfig};
//!
//! let config = ViewTransformerConfig::from_json_file("bev.json")?;
//! let mut transformer = ViewTransformer::with_config(config)?;
//!
//! let out = transformer.forward(&cameras, head.view())?;
//! println!("BEV shape: {:?}", out.bev.shape());
//! ```

pub mod depth;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod pooling;
pub mod stereo;
pub mod timing;
pub mod transformer;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{LiftError, Result};
pub use geometry::{unproject, CameraBatch, SweepCalibration, WorldPoints, CAMERA_FEATURE_DIM};
pub use grid::{AxisRange, DepthSpacing, Frustum, GridConfig, GridInfo};
pub use pooling::{prepare_plan, voxel_pooling, BevFeature, PlanCache, PlanOutcome, PoolingPlan};

// Depth model
pub use depth::{
    depth_distribution_from_gaussian, expected_depth, normalized_gt_depth, one_hot_gt_depth,
    uncertainty_depth_loss, DepthBins, DepthUncertainty, DepthWeightProducer, DepthWeights,
};

pub use stereo::{CostVolumeBuilder, StereoConfig, StereoFrames};
pub use timing::ForwardTiming;

// High-level API (recommended for most users)
pub use transformer::{
    TransformerVariant, ViewOutput, ViewTransformer, ViewTransformerBuilder, ViewTransformerConfig,
};
