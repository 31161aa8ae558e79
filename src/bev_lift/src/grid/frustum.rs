//! Per-camera frustum sampling template.

use ndarray::Array4;

use super::types::{AxisRange, DepthSpacing};
use crate::error::{LiftError, Result};

/// Fixed `(D, H_feat, W_feat, 3)` grid of `(pixel_x, pixel_y, depth)` samples.
///
/// Pixel coordinates are expressed in the un-downsampled input image:
/// column `w` sits at `linspace(0, W_in - 1, W_feat)[w]`.
#[derive(Debug, Clone)]
pub struct Frustum {
    points: Array4<f32>,
    depth_values: Vec<f32>,
    spacing: DepthSpacing,
    input_size: [usize; 2],
}

impl Frustum {
    /// Build the frustum for images of `input_size = (H_in, W_in)` downsampled by `downsample`.
    pub fn new(
        depth: &AxisRange,
        spacing: DepthSpacing,
        input_size: [usize; 2],
        downsample: usize,
    ) -> Result<Self> {
        if downsample == 0 {
            return Err(LiftError::InvalidConfig("downsample must be positive".into()));
        }
        let [h_in, w_in] = input_size;
        let (h_feat, w_feat) = (h_in / downsample, w_in / downsample);
        if h_feat == 0 || w_feat == 0 {
            return Err(LiftError::InvalidConfig(format!(
                "input size {input_size:?} is smaller than downsample {downsample}"
            )));
        }
        let num_bins = depth.num_samples();
        if num_bins == 0 {
            return Err(LiftError::InvalidGrid {
                axis: "depth",
                reason: "no depth bins".into(),
            });
        }

        let depth_values = spacing.depth_values(depth, num_bins);
        let xs = linspace(0.0, (w_in - 1) as f32, w_feat);
        let ys = linspace(0.0, (h_in - 1) as f32, h_feat);

        let points = Array4::from_shape_fn((num_bins, h_feat, w_feat, 3), |(d, h, w, c)| match c {
            0 => xs[w],
            1 => ys[h],
            _ => depth_values[d],
        });

        Ok(Self {
            points,
            depth_values,
            spacing,
            input_size,
        })
    }

    /// Sample array of shape `(D, H_feat, W_feat, 3)`.
    pub fn points(&self) -> &Array4<f32> {
        &self.points
    }

    /// Number of depth bins `D`.
    pub fn depth_bins(&self) -> usize {
        self.depth_values.len()
    }

    /// Downsampled feature size `(H_feat, W_feat)`.
    pub fn feat_size(&self) -> [usize; 2] {
        let s = self.points.shape();
        [s[1], s[2]]
    }

    /// Metric depth of each bin.
    pub fn depth_values(&self) -> &[f32] {
        &self.depth_values
    }

    pub fn spacing(&self) -> DepthSpacing {
        self.spacing
    }

    /// Input image size `(H_in, W_in)`.
    pub fn input_size(&self) -> [usize; 2] {
        self.input_size
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
fn linspace(start: f32, end: f32, n: usize) -> Vec<f32> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f32;
            (0..n).map(|i| start + step * i as f32).collect()
        }
    }
}
