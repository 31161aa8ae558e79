//! Metric depth from a bin distribution.

use ndarray::{Array3, ArrayView4, Axis};

use super::bins::DepthBins;
use crate::error::{LiftError, Result};

/// Expected metric depth per pixel of a `(M, D, H, W)` bin distribution.
///
/// The expected bin index `Σ k · p_k` is mapped back through the linear or
/// SID parameterization, so a distribution centered on a ground-truth bin
/// coordinate recovers that ground-truth depth.
pub fn expected_depth(prob: ArrayView4<'_, f32>, bins: &DepthBins) -> Result<Array3<f32>> {
    let d = prob.shape()[1];
    if d != bins.num_bins() {
        return Err(LiftError::ShapeMismatch {
            what: "depth distribution bins",
            expected: vec![bins.num_bins()],
            found: vec![d],
        });
    }

    let mut index = Array3::zeros((prob.shape()[0], prob.shape()[2], prob.shape()[3]));
    for (k, plane) in prob.axis_iter(Axis(1)).enumerate() {
        index.scaled_add(k as f32, &plane);
    }
    Ok(index.mapv_into(|i| bins.depth_at(i)))
}
