//! Depth modeling: bin parameterization, ground-truth targets, the
//! discretized Gaussian distribution, the uncertainty loss, expected-depth
//! recovery and the producers that turn a depth head into pooling weights.

pub mod bins;
pub mod gaussian;
pub mod gt;
pub mod loss;
pub mod producer;
pub mod recovery;

pub use bins::DepthBins;
pub use gaussian::{depth_distribution_from_gaussian, GAUSSIAN_EPS, LOGVAR_FLOOR};
pub use gt::{downsample_min_depth, normalized_gt_depth, one_hot_gt_depth};
pub use loss::{smooth_l1, uncertainty_depth_loss, DEFAULT_LOSS_DEPTH_WEIGHT};
pub use producer::{DepthUncertainty, DepthWeightProducer, DepthWeights, GaussianDepth, SoftmaxDepth};
pub use recovery::expected_depth;
