//! Depth bin parameterization shared by targets, losses and recovery.

use crate::error::{LiftError, Result};
use crate::grid::{AxisRange, DepthSpacing, GridConfig};

/// Depth range, spacing and bin count `D`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBins {
    range: AxisRange,
    spacing: DepthSpacing,
    num_bins: usize,
}

impl DepthBins {
    pub fn new(range: AxisRange, spacing: DepthSpacing) -> Result<Self> {
        let num_bins = range.checked_samples("depth")?;
        if spacing == DepthSpacing::Sid && (range.lower <= 0.0 || range.upper - 1.0 <= range.lower) {
            return Err(LiftError::InvalidGrid {
                axis: "depth",
                reason: format!(
                    "SID spacing needs 0 < lower < upper - 1, got [{}, {})",
                    range.lower, range.upper
                ),
            });
        }
        Ok(Self {
            range,
            spacing,
            num_bins,
        })
    }

    pub fn from_grid(grid: &GridConfig, spacing: DepthSpacing) -> Result<Self> {
        Self::new(grid.depth, spacing)
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn range(&self) -> &AxisRange {
        &self.range
    }

    pub fn spacing(&self) -> DepthSpacing {
        self.spacing
    }

    /// Continuous bin coordinate of a metric depth, background at 0.
    #[inline]
    pub fn coordinate(&self, depth: f32) -> f32 {
        self.spacing.bin_coordinate(depth, &self.range, self.num_bins)
    }

    /// Metric depth at a continuous bin coordinate.
    #[inline]
    pub fn depth_at(&self, coord: f32) -> f32 {
        self.spacing.depth_at(coord, &self.range, self.num_bins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_coordinates() {
        let bins = DepthBins::new(AxisRange::new(1.0, 60.0, 0.5), DepthSpacing::Linear).unwrap();
        assert_eq!(bins.num_bins(), 118);
        // lower bound sits at coordinate 1, bin 0 is background
        assert_relative_eq!(bins.coordinate(1.0), 1.0);
        assert_relative_eq!(bins.coordinate(0.5), 0.0);
        assert_relative_eq!(bins.depth_at(3.0), 2.0);
    }

    #[test]
    fn test_sid_requires_positive_lower() {
        assert!(DepthBins::new(AxisRange::new(0.0, 60.0, 0.5), DepthSpacing::Sid).is_err());
        assert!(DepthBins::new(AxisRange::new(0.0, 60.0, 0.5), DepthSpacing::Linear).is_ok());
    }
}
