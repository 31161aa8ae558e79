//! Ground-truth depth targets at feature resolution.
//!
//! A LiDAR depth map `(B, N, H, W)` with 0 for "no return" is reduced to
//! `(B*N, H/s, W/s)` by taking the nearest valid return in each `s x s`
//! window, then mapped to a bin coordinate.

use ndarray::{Array2, Array3, ArrayView4, Axis};
use rayon::prelude::*;

use super::bins::DepthBins;
use crate::error::{LiftError, Result};

/// Stand-in for missing returns before the window minimum.
pub const NO_RETURN_DEPTH: f32 = 1e5;

/// Nearest non-zero depth per `downsample x downsample` window, shape `(B*N, h, w)`.
///
/// Windows without any return hold [`NO_RETURN_DEPTH`].
pub fn downsample_min_depth(gt: ArrayView4<'_, f32>, downsample: usize) -> Result<Array3<f32>> {
    let s = gt.shape();
    let (b, n, h, w) = (s[0], s[1], s[2], s[3]);
    if downsample == 0 || h % downsample != 0 || w % downsample != 0 {
        return Err(LiftError::InvalidConfig(format!(
            "depth map {h}x{w} is not divisible by downsample {downsample}"
        )));
    }
    let (hd, wd) = (h / downsample, w / downsample);
    let gt = gt.as_standard_layout();
    let maps = gt.view().into_shape_with_order((b * n, h, w))?;

    let mut out = Array3::from_elem((b * n, hd, wd), NO_RETURN_DEPTH);
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(maps.axis_iter(Axis(0)).into_par_iter())
        .for_each(|(mut dst, src)| {
            for ((y, x), &d) in src.indexed_iter() {
                let cell = &mut dst[[y / downsample, x / downsample]];
                if d != 0.0 && d < *cell {
                    *cell = d;
                }
            }
        });
    Ok(out)
}

/// Bin coordinate per cell, 0 for background or out-of-range depths.
fn bin_coordinates(gt: ArrayView4<'_, f32>, downsample: usize, bins: &DepthBins) -> Result<Array3<f32>> {
    let d = bins.num_bins() as f32;
    Ok(downsample_min_depth(gt, downsample)?.mapv_into(|depth| {
        let c = bins.coordinate(depth);
        if (0.0..d).contains(&c) {
            c
        } else {
            0.0
        }
    }))
}

/// Regression target in `[0, 1)`: the bin coordinate divided by `D`.
///
/// Background cells (no return, or depth outside the bin range) are 0.
pub fn normalized_gt_depth(
    gt: ArrayView4<'_, f32>,
    downsample: usize,
    bins: &DepthBins,
) -> Result<Array3<f32>> {
    let d = bins.num_bins() as f32;
    Ok(bin_coordinates(gt, downsample, bins)?.mapv_into(|c| c / d))
}

/// Classification target of shape `(B*N*h*w, D)`.
///
/// Each cell is one-hot over `D + 1` classes at `floor(coordinate)`; the
/// background class 0 is dropped, leaving all-zero rows for background.
pub fn one_hot_gt_depth(
    gt: ArrayView4<'_, f32>,
    downsample: usize,
    bins: &DepthBins,
) -> Result<Array2<f32>> {
    let coords = bin_coordinates(gt, downsample, bins)?;
    let d = bins.num_bins();
    let mut out = Array2::zeros((coords.len(), d));
    for (mut row, &c) in out.axis_iter_mut(Axis(0)).zip(coords.iter()) {
        let class = c.floor() as usize;
        if class >= 1 {
            row[class - 1] = 1.0;
        }
    }
    Ok(out)
}
