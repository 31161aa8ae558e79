//! Pooling executor: layout adaptation around the reduction primitive.

use bev_pool_ops::{pool_reduce, BevPoolShape};
use ndarray::{Array4, Array5, ArrayView5, ArrayViewD};
use tracing::warn;

use super::plan::PlanOutcome;
use crate::error::{ensure_shape, LiftError, Result};
use crate::grid::GridInfo;

/// Dense BEV feature grid.
#[derive(Debug, Clone, PartialEq)]
pub enum BevFeature {
    /// `(B, C, Z, Y, X)`.
    Volume(Array5<f32>),
    /// `(B, Z * C, Y, X)`; channel `z * C + c` holds channel `c` of slice `z`.
    Collapsed(Array4<f32>),
}

impl BevFeature {
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Volume(a) => a.shape(),
            Self::Collapsed(a) => a.shape(),
        }
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        match self {
            Self::Volume(a) => a.view().into_dyn(),
            Self::Collapsed(a) => a.view().into_dyn(),
        }
    }

    pub fn as_volume(&self) -> Option<&Array5<f32>> {
        match self {
            Self::Volume(a) => Some(a),
            Self::Collapsed(_) => None,
        }
    }

    pub fn as_collapsed(&self) -> Option<&Array4<f32>> {
        match self {
            Self::Collapsed(a) => Some(a),
            Self::Volume(_) => None,
        }
    }
}

/// Pool `depth * feature` into the BEV grid following `outcome`.
///
/// - `depth`: `(B, N, D, H, W)` per-sample weights
/// - `feat`: `(B, N, C, H, W)` per-pixel context features
///
/// An empty plan produces an all-zero grid of the expected shape.
pub fn voxel_pooling(
    outcome: &PlanOutcome,
    depth: ArrayView5<'_, f32>,
    feat: ArrayView5<'_, f32>,
    grid: &GridInfo,
    collapse_z: bool,
) -> Result<BevFeature> {
    let ds = depth.shape();
    let (b, n, h, w) = (ds[0], ds[1], ds[3], ds[4]);
    let c = feat.shape()[2];
    ensure_shape("context features", feat.shape(), &[b, n, c, h, w])?;
    let [sx, sy, sz] = grid.size;

    let pooled = match outcome {
        PlanOutcome::Empty => {
            warn!("no frustum point inside the BEV grid, returning zeros");
            Array5::zeros((b, sz, sy, sx, c))
        }
        PlanOutcome::Ready(plan) => {
            if plan.dims() != [ds[0], ds[1], ds[2], ds[3], ds[4]] {
                return Err(LiftError::ShapeMismatch {
                    what: "depth weights",
                    expected: plan.dims().to_vec(),
                    found: ds.to_vec(),
                });
            }
            let depth = depth.as_standard_layout();
            // primitive expects channels last
            let feat = feat.permuted_axes([0, 1, 3, 4, 2]);
            let feat = feat.as_standard_layout();
            let shape = BevPoolShape {
                batch: b,
                z: sz,
                y: sy,
                x: sx,
                channels: c,
            };
            let out = pool_reduce(
                depth.as_slice().unwrap_or_default(),
                feat.as_slice().unwrap_or_default(),
                &plan.indices(),
                shape,
            )?;
            Array5::from_shape_vec((b, sz, sy, sx, c), out)?
        }
    };

    if collapse_z {
        let collapsed = pooled
            .permuted_axes([0, 1, 4, 2, 3])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((b, sz * c, sy, sx))?;
        Ok(BevFeature::Collapsed(collapsed))
    } else {
        Ok(BevFeature::Volume(
            pooled.permuted_axes([0, 4, 1, 2, 3]).as_standard_layout().into_owned(),
        ))
    }
}
