//! Voxel assignment and pooling plan construction.
//!
//! # Algorithm
//!
//! 1. Index every world point `i` in `(B, N, D, H, W)` order; `i` is its depth rank
//! 2. Its feature rank drops the depth axis: `((b * N + n) * H + h) * W + w`
//! 3. Voxelize with `floor((p - lower) / interval)`, dropping points outside the grid
//! 4. Compose the BEV rank `b*Z*Y*X + z*Y*X + y*X + x` and stable-sort by it
//! 5. Detect contiguous runs of equal BEV rank

use bev_pool_ops::PoolIndices;
use rayon::prelude::*;
use tracing::debug;

use super::segments::detect_intervals;
use crate::error::{LiftError, Result};
use crate::geometry::WorldPoints;
use crate::grid::GridInfo;

/// Sorted rank arrays and interval descriptors for one set of world points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolingPlan {
    ranks_bev: Vec<u32>,
    ranks_depth: Vec<u32>,
    ranks_feat: Vec<u32>,
    interval_starts: Vec<u32>,
    interval_lengths: Vec<u32>,
    /// `(B, N, D, H, W)` of the points the plan was built from.
    dims: [usize; 5],
}

/// Result of planning: either a plan or no point inside the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// No world point landed inside the grid; the pooled grid is all zeros.
    Empty,
    Ready(PoolingPlan),
}

impl PlanOutcome {
    pub fn plan(&self) -> Option<&PoolingPlan> {
        match self {
            Self::Empty => None,
            Self::Ready(plan) => Some(plan),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl PoolingPlan {
    pub fn ranks_bev(&self) -> &[u32] {
        &self.ranks_bev
    }

    pub fn ranks_depth(&self) -> &[u32] {
        &self.ranks_depth
    }

    pub fn ranks_feat(&self) -> &[u32] {
        &self.ranks_feat
    }

    pub fn interval_starts(&self) -> &[u32] {
        &self.interval_starts
    }

    pub fn interval_lengths(&self) -> &[u32] {
        &self.interval_lengths
    }

    /// Number of samples that survived the range filter.
    pub fn num_kept(&self) -> usize {
        self.ranks_bev.len()
    }

    /// Number of occupied voxels.
    pub fn num_intervals(&self) -> usize {
        self.interval_starts.len()
    }

    /// `(B, N, D, H, W)` of the source points.
    pub fn dims(&self) -> [usize; 5] {
        self.dims
    }

    /// Borrow the arrays in the layout the reduction primitive consumes.
    pub fn indices(&self) -> PoolIndices<'_> {
        PoolIndices {
            ranks_depth: &self.ranks_depth,
            ranks_feat: &self.ranks_feat,
            ranks_bev: &self.ranks_bev,
            interval_starts: &self.interval_starts,
            interval_lengths: &self.interval_lengths,
        }
    }
}

/// Assign world points to voxels and group them by voxel.
///
/// Points outside `[0, size)` on any axis are silently dropped. Returns
/// [`PlanOutcome::Empty`] when nothing survives. Fails with
/// [`LiftError::TooManyPoints`] when the point count or the BEV rank space
/// does not fit in `u32`.
pub fn prepare_plan(points: &WorldPoints, grid: &GridInfo) -> Result<PlanOutcome> {
    let dims = points.dims();
    let [b, n, d, h, w] = dims;
    let total = points.len();
    if total > u32::MAX as usize {
        return Err(LiftError::TooManyPoints(total));
    }
    let bev_space = b * grid.voxels_per_batch();
    if bev_space > u32::MAX as usize {
        return Err(LiftError::TooManyPoints(bev_space));
    }

    let per_camera = d * h * w;
    let per_batch = n * per_camera;
    let pixels = h * w;

    // (ranks_bev, ranks_depth, ranks_feat) in input point order
    let mut kept: Vec<(u32, u32, u32)> = points
        .as_flat()
        .par_chunks_exact(3)
        .enumerate()
        .filter_map(|(i, p)| {
            let voxel = grid.voxel_of([p[0], p[1], p[2]])?;
            let batch = i / per_batch;
            let camera = (i % per_batch) / per_camera;
            let pixel = i % pixels;
            let feat = (batch * n + camera) * pixels + pixel;
            Some((grid.rank(batch, voxel) as u32, i as u32, feat as u32))
        })
        .collect();

    if kept.is_empty() {
        debug!(total, "no frustum point inside the BEV grid");
        return Ok(PlanOutcome::Empty);
    }

    // stable: equal keys keep their (camera, depth, pixel) order
    kept.par_sort_by_key(|&(bev, _, _)| bev);

    let ranks_bev: Vec<u32> = kept.iter().map(|k| k.0).collect();
    let ranks_depth = kept.iter().map(|k| k.1).collect();
    let ranks_feat = kept.iter().map(|k| k.2).collect();
    let intervals = detect_intervals(&ranks_bev);

    debug!(
        total,
        kept = ranks_bev.len(),
        intervals = intervals.len(),
        "pooling plan prepared"
    );

    Ok(PlanOutcome::Ready(PoolingPlan {
        ranks_bev,
        ranks_depth,
        ranks_feat,
        interval_starts: intervals.starts,
        interval_lengths: intervals.lengths,
        dims,
    }))
}
