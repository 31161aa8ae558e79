//! High-level view transformer API.
//!
//! Ties the grid, the depth model, voxel pooling and the optional stereo
//! cost volume into one object configured once and called per frame.
//!
//! # Example
//!
//! ```ignore
//! use bev_lift::{TransformerVariant, ViewTransformer};
//!
//! let mut transformer = ViewTransformer::builder()
//!     .input_size([256, 704])
//!     .downsample(16)
//!     .out_channels(64)
//!     .variant(TransformerVariant::DepthUncertainty { loss_depth_weight: 3.0 })
//!     .accelerate(true)
//!     .build()?;
//!
//! // head: (B*N, 2 + 64, 16, 44) from the external depth network
//! let out = transformer.forward(&cameras, head.view())?;
//! let loss = transformer.depth_loss(gt_depth.view(), out.weights.uncertainty.as_ref().unwrap())?;
//! ```

use std::path::Path;

use anyhow::Context;
use ndarray::{Array2, Array3, Array4, ArrayView4};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::depth::{
    expected_depth, normalized_gt_depth, one_hot_gt_depth, uncertainty_depth_loss, DepthBins,
    DepthUncertainty, DepthWeightProducer, DepthWeights, GaussianDepth, SoftmaxDepth,
    DEFAULT_LOSS_DEPTH_WEIGHT,
};
use crate::error::{ensure_shape, LiftError, Result};
use crate::geometry::{unproject, CameraBatch};
use crate::grid::{DepthSpacing, Frustum, GridConfig, GridInfo};
use crate::pooling::{prepare_plan, voxel_pooling, BevFeature, PlanCache};
use crate::stereo::{CostVolumeBuilder, StereoConfig, StereoFrames};
use crate::time_phase;
use crate::timing::{ForwardTiming, Timer, TimingCollector};

fn default_loss_depth_weight() -> f32 {
    DEFAULT_LOSS_DEPTH_WEIGHT
}

/// Depth model and stereo usage of a transformer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformerVariant {
    /// Softmax over per-bin depth logits.
    Lss,
    /// Discretized Gaussian from a predicted mean and log-variance.
    DepthUncertainty {
        #[serde(default = "default_loss_depth_weight")]
        loss_depth_weight: f32,
    },
    /// [`Self::DepthUncertainty`] plus a temporal stereo cost volume.
    StereoUncertainty {
        #[serde(default = "default_loss_depth_weight")]
        loss_depth_weight: f32,
        #[serde(default)]
        stereo: StereoConfig,
    },
}

impl TransformerVariant {
    fn loss_depth_weight(&self) -> Option<f32> {
        match *self {
            Self::Lss => None,
            Self::DepthUncertainty { loss_depth_weight }
            | Self::StereoUncertainty {
                loss_depth_weight, ..
            } => Some(loss_depth_weight),
        }
    }

    fn stereo(&self) -> Option<StereoConfig> {
        match *self {
            Self::StereoUncertainty { stereo, .. } => Some(stereo),
            _ => None,
        }
    }
}

/// Configuration for [`ViewTransformer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewTransformerConfig {
    pub grid: GridConfig,

    /// Input image size `(H_in, W_in)`.
    pub input_size: [usize; 2],

    /// Ratio between input image and depth-head feature map.
    pub downsample: usize,

    /// Channels of the image features fed to the external depth network.
    pub in_channels: usize,

    /// Context channels `C` pooled into the BEV grid.
    pub out_channels: usize,

    /// Cache the pooling plan after the first forward pass.
    ///
    /// Only valid while calibration and augmentation stay constant.
    pub accelerate: bool,

    /// Spacing-increasing depth discretization instead of linear bins.
    pub sid: bool,

    /// Fold the Z axis into channels: `(B, Z*C, Y, X)` instead of `(B, C, Z, Y, X)`.
    pub collapse_z: bool,

    pub variant: TransformerVariant,
}

impl Default for ViewTransformerConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            input_size: [256, 704],
            downsample: 16,
            in_channels: 512,
            out_channels: 64,
            accelerate: false,
            sid: false,
            collapse_z: true,
            variant: TransformerVariant::Lss,
        }
    }
}

impl ViewTransformerConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid view transformer config")
    }

    /// Load a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn depth_spacing(&self) -> DepthSpacing {
        DepthSpacing::from_sid_flag(self.sid)
    }
}

/// Builder for [`ViewTransformer`].
#[derive(Debug, Clone, Default)]
pub struct ViewTransformerBuilder {
    config: ViewTransformerConfig,
}

impl ViewTransformerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(mut self, grid: GridConfig) -> Self {
        self.config.grid = grid;
        self
    }

    pub fn input_size(mut self, input_size: [usize; 2]) -> Self {
        self.config.input_size = input_size;
        self
    }

    pub fn downsample(mut self, downsample: usize) -> Self {
        self.config.downsample = downsample;
        self
    }

    pub fn in_channels(mut self, in_channels: usize) -> Self {
        self.config.in_channels = in_channels;
        self
    }

    pub fn out_channels(mut self, out_channels: usize) -> Self {
        self.config.out_channels = out_channels;
        self
    }

    /// Enable or disable the pooling plan cache.
    pub fn accelerate(mut self, accelerate: bool) -> Self {
        self.config.accelerate = accelerate;
        self
    }

    pub fn sid(mut self, sid: bool) -> Self {
        self.config.sid = sid;
        self
    }

    pub fn collapse_z(mut self, collapse_z: bool) -> Self {
        self.config.collapse_z = collapse_z;
        self
    }

    pub fn variant(mut self, variant: TransformerVariant) -> Self {
        self.config.variant = variant;
        self
    }

    pub fn build(self) -> Result<ViewTransformer> {
        ViewTransformer::with_config(self.config)
    }
}

/// Result of one [`ViewTransformer::forward`] call.
#[derive(Debug, Clone)]
pub struct ViewOutput {
    pub bev: BevFeature,
    /// Depth weights and context in `(B*N, ., H, W)` layout.
    pub weights: DepthWeights,
    pub timing: ForwardTiming,
}

/// Camera-to-BEV view transformer.
#[derive(Debug)]
pub struct ViewTransformer {
    config: ViewTransformerConfig,
    grid_info: GridInfo,
    bins: DepthBins,
    frustum: Frustum,
    producer: Box<dyn DepthWeightProducer>,
    stereo: Option<CostVolumeBuilder>,
    cache: PlanCache,
    /// Cost volume time not yet reported by a forward pass.
    pending_cost_volume_ms: f64,
}

impl ViewTransformer {
    pub fn builder() -> ViewTransformerBuilder {
        ViewTransformerBuilder::new()
    }

    /// Validate `config` and derive the grid, frustum and depth model.
    pub fn with_config(config: ViewTransformerConfig) -> Result<Self> {
        let grid_info = config.grid.grid_info()?;
        let spacing = config.depth_spacing();
        let bins = DepthBins::from_grid(&config.grid, spacing)?;
        let frustum = Frustum::new(&config.grid.depth, spacing, config.input_size, config.downsample)?;
        if config.out_channels == 0 {
            return Err(LiftError::InvalidConfig("out_channels must be positive".into()));
        }

        let num_bins = bins.num_bins();
        let producer: Box<dyn DepthWeightProducer> = match config.variant {
            TransformerVariant::Lss => Box::new(SoftmaxDepth {
                num_bins,
                context_channels: config.out_channels,
            }),
            _ => Box::new(GaussianDepth {
                num_bins,
                context_channels: config.out_channels,
            }),
        };
        let stereo = config
            .variant
            .stereo()
            .map(|sc| CostVolumeBuilder::new(&config.grid.depth, spacing, config.input_size, sc))
            .transpose()?;

        debug!(
            grid = ?grid_info.size,
            depth_bins = num_bins,
            feat_size = ?frustum.feat_size(),
            variant = ?config.variant,
            "view transformer created"
        );

        Ok(Self {
            config,
            grid_info,
            bins,
            frustum,
            producer,
            stereo,
            cache: PlanCache::new(),
            pending_cost_volume_ms: 0.0,
        })
    }

    pub fn config(&self) -> &ViewTransformerConfig {
        &self.config
    }

    pub fn grid_info(&self) -> &GridInfo {
        &self.grid_info
    }

    pub fn depth_bins(&self) -> &DepthBins {
        &self.bins
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Channels the depth head must emit per camera image.
    pub fn head_channels(&self) -> usize {
        self.producer.head_channels()
    }

    /// Whether a pooling plan is cached.
    pub fn is_cache_ready(&self) -> bool {
        self.cache.is_ready()
    }

    /// Compute and cache the pooling plan for `cameras` ahead of the first forward pass.
    pub fn precompute(&mut self, cameras: &CameraBatch) -> Result<()> {
        self.cache
            .precompute(&self.frustum, cameras, &self.grid_info)
            .map(|_| ())
    }

    /// Drop the cached pooling plan, e.g. at a sequence boundary.
    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Lift the depth head output of every camera into the BEV grid.
    ///
    /// `head` is `(B*N, head_channels, H_feat, W_feat)` in camera-major order.
    /// With `accelerate` set, `cameras` is only read when no plan is cached.
    pub fn forward(&mut self, cameras: &CameraBatch, head: ArrayView4<'_, f32>) -> Result<ViewOutput> {
        let mut timing = TimingCollector::new();
        timing.start_forward();

        let (b, n) = (cameras.batch_size(), cameras.num_cameras());
        let [h, w] = self.frustum.feat_size();
        ensure_shape(
            "depth head",
            head.shape(),
            &[b * n, self.producer.head_channels(), h, w],
        )?;

        let weights = time_phase!(timing, "depth", { self.producer.produce(head)? });

        let bev = {
            let d = self.bins.num_bins();
            let c = self.config.out_channels;
            let depth = weights.weights.as_standard_layout();
            let depth = depth.view().into_shape_with_order((b, n, d, h, w))?;
            let context = weights.context.as_standard_layout();
            let context = context.view().into_shape_with_order((b, n, c, h, w))?;

            let computed;
            let outcome = if self.config.accelerate {
                time_phase!(timing, "plan", {
                    self.cache
                        .get_or_compute(&self.frustum, cameras, &self.grid_info)?
                })
            } else {
                let points = time_phase!(timing, "unproject", { unproject(&self.frustum, cameras)? });
                computed = time_phase!(timing, "plan", { prepare_plan(&points, &self.grid_info)? });
                &computed
            };

            time_phase!(timing, "pool", {
                voxel_pooling(outcome, depth, context, &self.grid_info, self.config.collapse_z)?
            })
        };

        timing.record_phase("cost_volume", std::mem::take(&mut self.pending_cost_volume_ms));
        Ok(ViewOutput {
            bev,
            weights,
            timing: timing.finish(),
        })
    }

    /// Stereo cost volume `(B*N, D, H_cv, W_cv)` for the external depth network.
    ///
    /// Returns zeros on the first frame of a sequence (`frames.prev` is `None`).
    /// Fails with [`LiftError::Unsupported`] unless the variant is
    /// [`TransformerVariant::StereoUncertainty`].
    pub fn cost_volume(&mut self, frames: &StereoFrames<'_>) -> Result<Array4<f32>> {
        let builder = self
            .stereo
            .as_ref()
            .ok_or(LiftError::Unsupported("stereo cost volume"))?;
        let timer = Timer::new("cost_volume");
        let cost = builder.compute(frames, self.frustum.feat_size(), self.config.downsample)?;
        self.pending_cost_volume_ms += timer.elapsed_ms();
        Ok(cost)
    }

    /// Weighted uncertainty depth loss against a `(B, N, H_in, W_in)` LiDAR depth map.
    pub fn depth_loss(&self, gt: ArrayView4<'_, f32>, uncertainty: &DepthUncertainty) -> Result<f32> {
        let weight = self
            .config
            .variant
            .loss_depth_weight()
            .ok_or(LiftError::Unsupported("uncertainty depth loss"))?;
        uncertainty_depth_loss(
            uncertainty.mean.view(),
            uncertainty.logvar.view(),
            gt,
            self.config.downsample,
            &self.bins,
            weight,
        )
    }

    /// Normalized regression target `(B*N, H_feat, W_feat)` for a LiDAR depth map.
    pub fn gt_depth(&self, gt: ArrayView4<'_, f32>) -> Result<Array3<f32>> {
        normalized_gt_depth(gt, self.config.downsample, &self.bins)
    }

    /// One-hot classification target `(B*N*H_feat*W_feat, D)` for a LiDAR depth map.
    pub fn gt_depth_one_hot(&self, gt: ArrayView4<'_, f32>) -> Result<Array2<f32>> {
        one_hot_gt_depth(gt, self.config.downsample, &self.bins)
    }

    /// Metric depth `(B*N, H, W)` from depth weights `(B*N, D, H, W)`.
    pub fn expected_depth(&self, weights: &DepthWeights) -> Result<Array3<f32>> {
        expected_depth(weights.weights.view(), &self.bins)
    }
}
