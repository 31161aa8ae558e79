//! Temporal stereo cost volume.
//!
//! # Algorithm
//!
//! 1. Project the stereo frustum of each current camera into the previous
//!    frame's image ([`sweep_sampling_grid`])
//! 2. For each group of `group_size` channels, warp the previous features at
//!    every depth hypothesis and accumulate `Σ |curr - warped|`
//! 3. Add `bias` where the first channel of the last warped group is exactly
//!    zero (the sample fell outside the previous image or behind its camera;
//!    samples behind the camera are forced to zero after warping)
//! 4. Negate and softmax over depth

use ndarray::{s, Array4, ArrayView4, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sample::grid_sample_bilinear;
use crate::error::{ensure_shape, LiftError, Result};
use crate::geometry::{sweep_sampling_grid, SamplingGrid, SweepCalibration};
use crate::grid::{AxisRange, DepthSpacing, Frustum};

/// Cost volume parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    /// Channels compared per warp.
    pub group_size: usize,
    /// Added to the cost of samples that warped to zero.
    pub bias: f32,
    /// Downsample factor of the stereo feature maps.
    pub cv_downsample: usize,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            group_size: 4,
            bias: 0.0,
            cv_downsample: 4,
        }
    }
}

/// Inputs for one cost volume computation.
#[derive(Debug, Clone, Copy)]
pub struct StereoFrames<'a> {
    /// Previous frame features `(B*N, C, H_cv, W_cv)`, `None` on the first frame.
    pub prev: Option<ArrayView4<'a, f32>>,
    /// Current frame features `(B*N, C, H_cv, W_cv)`.
    pub curr: ArrayView4<'a, f32>,
    pub calibration: &'a SweepCalibration,
}

/// Builds cost volumes over a fixed stereo frustum.
#[derive(Debug, Clone)]
pub struct CostVolumeBuilder {
    frustum: Frustum,
    config: StereoConfig,
}

impl CostVolumeBuilder {
    pub fn new(
        depth: &AxisRange,
        spacing: DepthSpacing,
        input_size: [usize; 2],
        config: StereoConfig,
    ) -> Result<Self> {
        if config.group_size == 0 {
            return Err(LiftError::InvalidConfig("stereo group_size must be positive".into()));
        }
        let frustum = Frustum::new(depth, spacing, input_size, config.cv_downsample)?;
        Ok(Self { frustum, config })
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    /// Cost volume `(B*N, D, H_cv, W_cv)`, or zeros when there is no previous frame.
    ///
    /// The zero fallback has shape `(B*N, D, H·s, W·s)` for the depth-head
    /// feature size `(H, W)` at `downsample`, with `s = downsample / cv_downsample`.
    pub fn compute(
        &self,
        frames: &StereoFrames<'_>,
        feat_size: [usize; 2],
        downsample: usize,
    ) -> Result<Array4<f32>> {
        match frames.prev {
            Some(prev) => self.build(prev, frames.curr, frames.calibration),
            None => {
                debug!("no previous frame, using an empty cost volume");
                let bn = frames.curr.shape()[0];
                let scale = downsample as f32 / self.config.cv_downsample as f32;
                let [h, w] = feat_size;
                Ok(Array4::zeros((
                    bn,
                    self.frustum.depth_bins(),
                    (h as f32 * scale) as usize,
                    (w as f32 * scale) as usize,
                )))
            }
        }
    }

    /// Cost volume between `prev` and `curr`, both `(B*N, C, H_cv, W_cv)`.
    pub fn build(
        &self,
        prev: ArrayView4<'_, f32>,
        curr: ArrayView4<'_, f32>,
        calib: &SweepCalibration,
    ) -> Result<Array4<f32>> {
        let bn = calib.batch_size() * calib.num_cameras();
        let d = self.frustum.depth_bins();
        let [h, w] = self.frustum.feat_size();
        let c = curr.shape()[1];
        ensure_shape("current stereo features", curr.shape(), &[bn, c, h, w])?;
        ensure_shape("previous stereo features", prev.shape(), &[bn, c, h, w])?;
        let gs = self.config.group_size;
        if c < gs || c % gs != 0 {
            return Err(LiftError::InvalidConfig(format!(
                "{c} stereo channels cannot be split into groups of {gs}"
            )));
        }

        let cv = self.config.cv_downsample;
        let SamplingGrid { grid, valid } = sweep_sampling_grid(&self.frustum, calib, [h * cv, w * cv])?;
        let grid = grid.into_shape_with_order((bn, d * h, w, 2))?;

        let mut cost = Array4::<f32>::zeros((bn, d, h, w));
        let mut last_warped = None;
        for group in 0..c / gs {
            let range = group * gs..(group + 1) * gs;
            let prev_group = prev.slice(s![.., range.clone(), .., ..]);
            let mut warped = grid_sample_bilinear(prev_group, grid.view())?
                .into_shape_with_order((bn, gs, d, h, w))?;
            // behind the sweep camera: the sentinel coordinate can still touch border pixels
            for mut channel in warped.axis_iter_mut(Axis(1)) {
                Zip::from(&mut channel).and(&valid).for_each(|v, &ok| {
                    if !ok {
                        *v = 0.0;
                    }
                });
            }
            let curr_group = curr.slice(s![.., range, .., ..]);

            cost.axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(warped.axis_iter(Axis(0)).into_par_iter())
                .zip(curr_group.axis_iter(Axis(0)).into_par_iter())
                .for_each(|((mut dst, wp), cur)| {
                    for ((di, y, x), v) in dst.indexed_iter_mut() {
                        for ch in 0..gs {
                            *v += (cur[[ch, y, x]] - wp[[ch, di, y, x]]).abs();
                        }
                    }
                });
            last_warped = Some(warped);
        }

        if self.config.bias != 0.0 {
            if let Some(warped) = last_warped {
                let first = warped.index_axis(Axis(1), 0);
                Zip::from(&mut cost).and(&first).for_each(|v, &sample| {
                    if sample == 0.0 {
                        *v += self.config.bias;
                    }
                });
            }
        }

        // softmax of the negated cost over depth
        cost.axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut per_camera| {
                for mut lane in per_camera.lanes_mut(Axis(0)) {
                    let best = lane.fold(f32::INFINITY, |m, &v| m.min(v));
                    lane.mapv_inplace(|v| (best - v).exp());
                    let total = lane.sum();
                    lane.mapv_inplace(|v| v / total);
                }
            });
        Ok(cost)
    }
}
