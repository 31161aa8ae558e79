//! Heteroscedastic depth regression loss.

use ndarray::{ArrayView3, ArrayView4, Zip};
use tracing::debug;

use super::bins::DepthBins;
use super::gaussian::LOGVAR_FLOOR;
use super::gt::normalized_gt_depth;
use crate::error::{ensure_shape, Result};

/// Transition point of the robust base loss.
pub const SMOOTH_L1_BETA: f32 = 1.0;

/// Default multiplier of the depth loss.
pub const DEFAULT_LOSS_DEPTH_WEIGHT: f32 = 3.0;

/// Huber-style loss: quadratic below `beta`, linear above.
#[inline]
pub fn smooth_l1(pred: f32, target: f32, beta: f32) -> f32 {
    let diff = (pred - target).abs();
    if diff < beta {
        0.5 * diff * diff / beta
    } else {
        diff - 0.5 * beta
    }
}

/// Uncertainty-weighted depth loss over foreground cells.
///
/// `pred_mean` (normalized to `[0, 1]`) and `pred_logvar` are `(B*N, h, w)`;
/// `gt` is the full-resolution `(B, N, H, W)` depth map. Prediction and
/// target are compared in bin units. Per cell:
///
/// ```text
/// smooth_l1(mean * D, gt * D) * exp(-v) / 2 + v / 2,   v = max(logvar, -10)
/// ```
///
/// The result is the mean over cells with a valid target, times
/// `loss_weight`. Without any foreground cell the loss is `0.0`.
pub fn uncertainty_depth_loss(
    pred_mean: ArrayView3<'_, f32>,
    pred_logvar: ArrayView3<'_, f32>,
    gt: ArrayView4<'_, f32>,
    downsample: usize,
    bins: &DepthBins,
    loss_weight: f32,
) -> Result<f32> {
    let target = normalized_gt_depth(gt, downsample, bins)?;
    ensure_shape("depth mean", pred_mean.shape(), target.shape())?;
    ensure_shape("depth logvar", pred_logvar.shape(), target.shape())?;
    let d = bins.num_bins() as f32;

    let (sum, count) = Zip::from(&target)
        .and(&pred_mean)
        .and(&pred_logvar)
        .fold((0.0f64, 0usize), |(sum, count), &t, &m, &lv| {
            if t > 0.0 {
                let v = lv.max(LOGVAR_FLOOR);
                let base = smooth_l1(m * d, t * d, SMOOTH_L1_BETA);
                let nll = base * (-v).exp() / 2.0 + v / 2.0;
                (sum + nll as f64, count + 1)
            } else {
                (sum, count)
            }
        });

    if count == 0 {
        debug!("no foreground depth cells, depth loss is zero");
        return Ok(0.0);
    }
    Ok(loss_weight * (sum / count as f64) as f32)
}
