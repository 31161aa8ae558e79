//! Type definitions for the BEV grid and depth discretization.

use serde::{Deserialize, Serialize};

use crate::error::{LiftError, Result};

/// Range of one grid axis: `[lower, upper)` sampled every `interval`.
///
/// Deserializes from a JSON array `[lower, upper, interval]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct AxisRange {
    pub lower: f32,
    pub upper: f32,
    pub interval: f32,
}

impl AxisRange {
    pub const fn new(lower: f32, upper: f32, interval: f32) -> Self {
        Self {
            lower,
            upper,
            interval,
        }
    }

    fn span(&self) -> f64 {
        (self.upper as f64 - self.lower as f64) / self.interval as f64
    }

    /// Number of whole cells in the range, truncated toward zero.
    pub fn num_cells(&self) -> usize {
        // 102.4 / 0.8 in f32 lands just below 128
        (self.span() + 1e-6).floor().max(0.0) as usize
    }

    /// Number of samples produced by `arange(lower, upper, interval)`.
    pub fn num_samples(&self) -> usize {
        // 79 / 7.9 must give 10 samples, not 11
        (self.span() - 1e-6).ceil().max(0.0) as usize
    }

    /// [`Self::num_samples`] of a validated, non-empty range.
    pub(crate) fn checked_samples(&self, axis: &'static str) -> Result<usize> {
        self.validate(axis)?;
        match self.num_samples() {
            0 => Err(LiftError::InvalidGrid {
                axis,
                reason: "no samples in range".to_string(),
            }),
            n => Ok(n),
        }
    }

    fn validate(&self, axis: &'static str) -> Result<()> {
        if !(self.interval > 0.0) || !self.interval.is_finite() {
            return Err(LiftError::InvalidGrid {
                axis,
                reason: format!("interval must be positive, got {}", self.interval),
            });
        }
        if !(self.upper > self.lower) {
            return Err(LiftError::InvalidGrid {
                axis,
                reason: format!("upper {} must exceed lower {}", self.upper, self.lower),
            });
        }
        Ok(())
    }
}

impl From<[f32; 3]> for AxisRange {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<AxisRange> for [f32; 3] {
    fn from(r: AxisRange) -> Self {
        [r.lower, r.upper, r.interval]
    }
}

/// Grid configuration along x, y, z and the camera depth axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub x: AxisRange,
    pub y: AxisRange,
    pub z: AxisRange,
    pub depth: AxisRange,
}

impl Default for GridConfig {
    /// nuScenes-style BEV grid: 128x128x1 cells of 0.8 m, depth 1..60 m.
    fn default() -> Self {
        Self {
            x: AxisRange::new(-51.2, 51.2, 0.8),
            y: AxisRange::new(-51.2, 51.2, 0.8),
            z: AxisRange::new(-5.0, 3.0, 8.0),
            depth: AxisRange::new(1.0, 60.0, 0.5),
        }
    }
}

impl GridConfig {
    /// Check every axis and derive the voxel grid layout.
    pub fn grid_info(&self) -> Result<GridInfo> {
        self.x.validate("x")?;
        self.y.validate("y")?;
        self.z.validate("z")?;

        let size = [self.x.num_cells(), self.y.num_cells(), self.z.num_cells()];
        for (axis, &n) in ["x", "y", "z"].iter().zip(&size) {
            if n == 0 {
                return Err(LiftError::InvalidGrid {
                    axis,
                    reason: "range is narrower than one interval".to_string(),
                });
            }
        }

        Ok(GridInfo {
            lower_bound: [self.x.lower, self.y.lower, self.z.lower],
            interval: [self.x.interval, self.y.interval, self.z.interval],
            size,
        })
    }

    /// Number of depth bins `D`.
    pub fn depth_bins(&self) -> Result<usize> {
        self.depth.checked_samples("depth")
    }
}

/// Derived voxel grid layout, axis order (x, y, z).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridInfo {
    pub lower_bound: [f32; 3],
    pub interval: [f32; 3],
    /// Voxel counts per axis.
    pub size: [usize; 3],
}

impl GridInfo {
    /// Voxels per batch element `X * Y * Z`.
    pub fn voxels_per_batch(&self) -> usize {
        self.size[0] * self.size[1] * self.size[2]
    }

    /// Voxel index of a point, or `None` if it lies outside `[0, size)` on any axis.
    #[inline]
    pub fn voxel_of(&self, p: [f32; 3]) -> Option<[usize; 3]> {
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let v = ((p[axis] - self.lower_bound[axis]) / self.interval[axis]).floor();
            // NaN fails both comparisons and is dropped here as well
            if !(v >= 0.0 && v < self.size[axis] as f32) {
                return None;
            }
            idx[axis] = v as usize;
        }
        Some(idx)
    }

    /// Row-major composite key `batch*Z*Y*X + z*Y*X + y*X + x`.
    #[inline]
    pub fn rank(&self, batch: usize, voxel: [usize; 3]) -> usize {
        let [sx, sy, sz] = self.size;
        ((batch * sz + voxel[2]) * sy + voxel[1]) * sx + voxel[0]
    }
}

/// Spacing of the depth bins along each camera ray.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepthSpacing {
    /// `d_k = lower + k * interval`.
    #[default]
    Linear,
    /// Spacing-increasing discretization:
    /// `d_k = exp(ln(lower) + k / (D-1) * ln((upper-1) / lower))`.
    Sid,
}

impl DepthSpacing {
    pub fn from_sid_flag(sid: bool) -> Self {
        if sid {
            Self::Sid
        } else {
            Self::Linear
        }
    }

    /// Metric depth of every bin.
    pub fn depth_values(&self, depth: &AxisRange, num_bins: usize) -> Vec<f32> {
        match self {
            Self::Linear => (0..num_bins)
                .map(|k| depth.lower + k as f32 * depth.interval)
                .collect(),
            Self::Sid => {
                let log_lower = (depth.lower as f64).ln();
                let log_ratio = ((depth.upper as f64 - 1.0) / depth.lower as f64).ln();
                let denom = (num_bins.max(2) - 1) as f64;
                (0..num_bins)
                    .map(|k| (log_lower + k as f64 / denom * log_ratio).exp() as f32)
                    .collect()
            }
        }
    }

    /// Continuous bin coordinate of a metric depth.
    ///
    /// Linear depths map to `(d - (lower - interval)) / interval`, so the
    /// first bin sits at 1; SID depths use the inverse of the log spacing,
    /// also offset by one. Index 0 is reserved for background.
    pub fn bin_coordinate(&self, d: f32, depth: &AxisRange, num_bins: usize) -> f32 {
        match self {
            Self::Linear => (d - (depth.lower - depth.interval)) / depth.interval,
            Self::Sid => {
                let log_ratio = ((depth.upper - 1.0) / depth.lower).ln();
                (d.ln() - depth.lower.ln()) * (num_bins as f32 - 1.0) / log_ratio + 1.0
            }
        }
    }

    /// Metric depth at a continuous bin coordinate; inverse of [`Self::bin_coordinate`].
    pub fn depth_at(&self, coord: f32, depth: &AxisRange, num_bins: usize) -> f32 {
        match self {
            Self::Linear => coord * depth.interval + (depth.lower - depth.interval),
            Self::Sid => {
                let log_ratio = ((depth.upper - 1.0) / depth.lower).ln();
                ((coord - 1.0) * log_ratio / (num_bins as f32 - 1.0)).exp() * depth.lower
            }
        }
    }
}
