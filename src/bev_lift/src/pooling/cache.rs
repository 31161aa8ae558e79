//! Acceleration cache for static camera geometry.
//!
//! When intrinsics, extrinsics and augmentation are constant over a
//! sequence, the pooling plan only depends on the frustum and the grid. The
//! cache stores it after the first computation so later calls skip
//! unprojection and planning. Nothing checks that the geometry really stayed
//! constant; call [`PlanCache::invalidate`] when a new sequence starts.

use tracing::{debug, info};

use super::plan::{prepare_plan, PlanOutcome};
use crate::error::Result;
use crate::geometry::{unproject, CameraBatch};
use crate::grid::{Frustum, GridInfo};

#[derive(Debug, Clone, Default)]
pub struct PlanCache {
    plan: Option<PlanOutcome>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.plan.is_some()
    }

    /// Cached plan, if computed.
    pub fn get(&self) -> Option<&PlanOutcome> {
        self.plan.as_ref()
    }

    /// Compute and store the plan for `cameras`, replacing any cached one.
    pub fn precompute(
        &mut self,
        frustum: &Frustum,
        cameras: &CameraBatch,
        grid: &GridInfo,
    ) -> Result<&PlanOutcome> {
        let points = unproject(frustum, cameras)?;
        let outcome = prepare_plan(&points, grid)?;
        info!(
            intervals = outcome.plan().map_or(0, |p| p.num_intervals()),
            "pooling plan cached"
        );
        Ok(self.plan.insert(outcome))
    }

    /// Cached plan, computing it on the first call.
    pub fn get_or_compute(
        &mut self,
        frustum: &Frustum,
        cameras: &CameraBatch,
        grid: &GridInfo,
    ) -> Result<&PlanOutcome> {
        match self.plan {
            Some(ref outcome) => {
                debug!("pooling plan cache hit");
                Ok(outcome)
            }
            None => self.precompute(frustum, cameras, grid),
        }
    }

    /// Drop the cached plan so the next call recomputes it.
    pub fn invalidate(&mut self) {
        if self.plan.take().is_some() {
            info!("pooling plan cache invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{AxisRange, DepthSpacing, GridConfig};
    use crate::test_utils::identity_cameras;
    use ndarray::Array4;

    fn setup() -> (Frustum, GridInfo) {
        let frustum = Frustum::new(&AxisRange::new(1.0, 4.0, 1.0), DepthSpacing::Linear, [4, 8], 4).unwrap();
        let grid = GridConfig {
            x: AxisRange::new(-10.0, 30.0, 1.0),
            y: AxisRange::new(-10.0, 10.0, 1.0),
            z: AxisRange::new(0.0, 5.0, 1.0),
            depth: AxisRange::new(1.0, 4.0, 1.0),
        }
        .grid_info()
        .unwrap();
        (frustum, grid)
    }

    #[test]
    fn test_precompute_then_reuse() {
        let (frustum, grid) = setup();
        let mut cache = PlanCache::new();
        assert!(!cache.is_ready());

        let first = cache.get_or_compute(&frustum, &identity_cameras(1, 1), &grid).unwrap().clone();
        assert!(cache.is_ready());
        assert!(!first.is_empty());

        // different geometry is ignored while the cache is warm
        let mut shifted = identity_cameras(1, 1).sensor2ego().clone();
        shifted[[0, 0, 0, 3]] = 100.0;
        let cams = CameraBatch::new(
            shifted,
            Array4::zeros((1, 1, 4, 4)),
            identity_cameras(1, 1).intrinsics().clone(),
            identity_cameras(1, 1).post_rots().clone(),
            identity_cameras(1, 1).post_trans().clone(),
            identity_cameras(1, 1).bda().clone(),
        )
        .unwrap();
        let second = cache.get_or_compute(&frustum, &cams, &grid).unwrap();
        assert_eq!(*second, first);

        // after invalidation the new geometry pushes every point out of range
        cache.invalidate();
        assert!(!cache.is_ready());
        let third = cache.get_or_compute(&frustum, &cams, &grid).unwrap();
        assert!(third.is_empty());
    }

    #[test]
    fn test_precompute_replaces() {
        let (frustum, grid) = setup();
        let mut cache = PlanCache::new();
        cache.precompute(&frustum, &identity_cameras(1, 1), &grid).unwrap();
        let a = cache.get().cloned();
        cache.precompute(&frustum, &identity_cameras(2, 1), &grid).unwrap();
        assert_ne!(cache.get().cloned(), a);
        assert_eq!(cache.get().and_then(|o| o.plan()).map(|p| p.dims()[0]), Some(2));
    }
}
