//! Interval-based voxel pooling (BEVPool v2 semantics).
//!
//! Samples that fall into the same voxel are stored contiguously after the
//! planner's sort, so each interval `[start, start + length)` maps to exactly
//! one output voxel `ranks_bev[start]`. The reduction for voxel `v` is
//!
//! ```text
//! out[v, c] = Σ_{i ∈ interval(v)} depth[ranks_depth[i]] * feat[ranks_feat[i], c]
//! ```
//!
//! Voxels that own no interval stay zero.
//!
//! # Implementation
//!
//! The output buffer is split into per-voxel channel rows and processed in
//! parallel with rayon. Every row is written by at most one interval, and
//! samples inside an interval are accumulated in plan order, so the result
//! is bit-identical across runs and thread counts.

use rayon::prelude::*;
use thiserror::Error;

/// Marker for voxels that no interval writes to.
const NO_INTERVAL: u32 = u32::MAX;

/// Errors from the pooling primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolOpsError {
    #[error("rank arrays differ in length: depth={depth}, feat={feat}, bev={bev}")]
    RankLengthMismatch { depth: usize, feat: usize, bev: usize },

    #[error("interval arrays differ in length: starts={starts}, lengths={lengths}")]
    IntervalLengthMismatch { starts: usize, lengths: usize },

    #[error("interval {index} [{start}, {start}+{length}) exceeds {num_samples} samples")]
    IntervalOutOfBounds {
        index: usize,
        start: u32,
        length: u32,
        num_samples: usize,
    },

    #[error("{what} index {index} out of bounds (limit {limit})")]
    IndexOutOfBounds {
        what: &'static str,
        index: u32,
        limit: usize,
    },

    #[error("feature buffer of {len} values is not a multiple of {channels} channels")]
    FeatureLayout { len: usize, channels: usize },

    #[error("output shape has a zero dimension: {0:?}")]
    InvalidShape(BevPoolShape),
}

/// Output shape `(B, Z, Y, X, C)` of the pooled grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BevPoolShape {
    pub batch: usize,
    pub z: usize,
    pub y: usize,
    pub x: usize,
    pub channels: usize,
}

impl BevPoolShape {
    /// Number of voxels `B * Z * Y * X`.
    pub fn num_voxels(&self) -> usize {
        self.batch * self.z * self.y * self.x
    }

    /// Total number of output values.
    pub fn len(&self) -> usize {
        self.num_voxels() * self.channels
    }

    /// Whether any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Borrowed pooling plan in the layout the primitive consumes.
#[derive(Debug, Clone, Copy)]
pub struct PoolIndices<'a> {
    /// Index into the flattened depth-weight buffer, per sample.
    pub ranks_depth: &'a [u32],
    /// Row index into the flattened `(rows, C)` feature buffer, per sample.
    pub ranks_feat: &'a [u32],
    /// Flattened voxel index into the output grid, per sample.
    pub ranks_bev: &'a [u32],
    /// First sample of each interval.
    pub interval_starts: &'a [u32],
    /// Number of samples in each interval.
    pub interval_lengths: &'a [u32],
}

/// Weighted-sum pooling of features into a dense voxel grid.
///
/// # Arguments
/// * `depth` - Flattened depth weights, indexed by `ranks_depth`
/// * `feat` - Flattened features in `(rows, C)` row-major layout, indexed by `ranks_feat`
/// * `indices` - Sorted ranks and interval descriptors
/// * `shape` - Output shape
///
/// # Returns
/// Row-major buffer of shape `(B, Z, Y, X, C)`.
pub fn pool_reduce(
    depth: &[f32],
    feat: &[f32],
    indices: &PoolIndices<'_>,
    shape: BevPoolShape,
) -> Result<Vec<f32>, PoolOpsError> {
    validate(depth, feat, indices, shape)?;

    let channels = shape.channels;
    let mut owner = vec![NO_INTERVAL; shape.num_voxels()];
    for (i, &start) in indices.interval_starts.iter().enumerate() {
        owner[indices.ranks_bev[start as usize] as usize] = i as u32;
    }

    let mut out = vec![0.0f32; shape.len()];
    out.par_chunks_mut(channels)
        .zip(owner.par_iter())
        .filter(|(_, &interval)| interval != NO_INTERVAL)
        .for_each(|(cell, &interval)| {
            let start = indices.interval_starts[interval as usize] as usize;
            let end = start + indices.interval_lengths[interval as usize] as usize;
            for i in start..end {
                let weight = depth[indices.ranks_depth[i] as usize];
                let row = indices.ranks_feat[i] as usize * channels;
                for (acc, &f) in cell.iter_mut().zip(&feat[row..row + channels]) {
                    *acc += weight * f;
                }
            }
        });

    Ok(out)
}

fn validate(
    depth: &[f32],
    feat: &[f32],
    indices: &PoolIndices<'_>,
    shape: BevPoolShape,
) -> Result<(), PoolOpsError> {
    if shape.is_empty() {
        return Err(PoolOpsError::InvalidShape(shape));
    }

    let n = indices.ranks_bev.len();
    if indices.ranks_depth.len() != n || indices.ranks_feat.len() != n {
        return Err(PoolOpsError::RankLengthMismatch {
            depth: indices.ranks_depth.len(),
            feat: indices.ranks_feat.len(),
            bev: n,
        });
    }
    if indices.interval_starts.len() != indices.interval_lengths.len() {
        return Err(PoolOpsError::IntervalLengthMismatch {
            starts: indices.interval_starts.len(),
            lengths: indices.interval_lengths.len(),
        });
    }
    if feat.len() % shape.channels != 0 {
        return Err(PoolOpsError::FeatureLayout {
            len: feat.len(),
            channels: shape.channels,
        });
    }

    for (index, (&start, &length)) in indices
        .interval_starts
        .iter()
        .zip(indices.interval_lengths)
        .enumerate()
    {
        if length == 0 || start as usize + length as usize > n {
            return Err(PoolOpsError::IntervalOutOfBounds {
                index,
                start,
                length,
                num_samples: n,
            });
        }
    }

    let feat_rows = feat.len() / shape.channels;
    check_bounds("ranks_depth", indices.ranks_depth, depth.len())?;
    check_bounds("ranks_feat", indices.ranks_feat, feat_rows)?;
    check_bounds("ranks_bev", indices.ranks_bev, shape.num_voxels())?;

    Ok(())
}

fn check_bounds(what: &'static str, ranks: &[u32], limit: usize) -> Result<(), PoolOpsError> {
    match ranks.iter().find(|&&r| r as usize >= limit) {
        Some(&index) => Err(PoolOpsError::IndexOutOfBounds { what, index, limit }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn shape(batch: usize, z: usize, y: usize, x: usize, channels: usize) -> BevPoolShape {
        BevPoolShape {
            batch,
            z,
            y,
            x,
            channels,
        }
    }

    #[test]
    fn test_single_sample() {
        let indices = PoolIndices {
            ranks_depth: &[0],
            ranks_feat: &[0],
            ranks_bev: &[0],
            interval_starts: &[0],
            interval_lengths: &[1],
        };
        let out = pool_reduce(&[1.0], &[1.0], &indices, shape(1, 1, 2, 2, 1)).unwrap();
        assert_eq!(out, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_weighted_sum_per_interval() {
        // Voxel 1 gets samples 0,1 ; voxel 3 gets sample 2
        let depth = [0.5, 0.25, 2.0];
        let feat = [
            1.0, 10.0, // row 0
            2.0, 20.0, // row 1
        ];
        let indices = PoolIndices {
            ranks_depth: &[0, 1, 2],
            ranks_feat: &[0, 1, 1],
            ranks_bev: &[1, 1, 3],
            interval_starts: &[0, 2],
            interval_lengths: &[2, 1],
        };
        let out = pool_reduce(&depth, &feat, &indices, shape(1, 1, 2, 2, 2)).unwrap();

        assert_eq!(out.len(), 8);
        assert_eq!(&out[0..2], &[0.0, 0.0]);
        assert_relative_eq!(out[2], 0.5 * 1.0 + 0.25 * 2.0);
        assert_relative_eq!(out[3], 0.5 * 10.0 + 0.25 * 20.0);
        assert_eq!(&out[4..6], &[0.0, 0.0]);
        assert_relative_eq!(out[6], 4.0);
        assert_relative_eq!(out[7], 40.0);
    }

    #[test]
    fn test_empty_plan_gives_zeros() {
        let indices = PoolIndices {
            ranks_depth: &[],
            ranks_feat: &[],
            ranks_bev: &[],
            interval_starts: &[],
            interval_lengths: &[],
        };
        let out = pool_reduce(&[], &[], &indices, shape(2, 1, 3, 3, 4)).unwrap();
        assert_eq!(out.len(), 72);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rank_length_mismatch() {
        let indices = PoolIndices {
            ranks_depth: &[0, 1],
            ranks_feat: &[0],
            ranks_bev: &[0],
            interval_starts: &[0],
            interval_lengths: &[1],
        };
        let err = pool_reduce(&[1.0, 1.0], &[1.0], &indices, shape(1, 1, 1, 1, 1)).unwrap_err();
        assert!(matches!(err, PoolOpsError::RankLengthMismatch { .. }));
    }

    #[test]
    fn test_out_of_bounds_voxel() {
        let indices = PoolIndices {
            ranks_depth: &[0],
            ranks_feat: &[0],
            ranks_bev: &[4],
            interval_starts: &[0],
            interval_lengths: &[1],
        };
        let err = pool_reduce(&[1.0], &[1.0], &indices, shape(1, 1, 2, 2, 1)).unwrap_err();
        assert_eq!(
            err,
            PoolOpsError::IndexOutOfBounds {
                what: "ranks_bev",
                index: 4,
                limit: 4
            }
        );
    }

    #[test]
    fn test_interval_overrun() {
        let indices = PoolIndices {
            ranks_depth: &[0],
            ranks_feat: &[0],
            ranks_bev: &[0],
            interval_starts: &[0],
            interval_lengths: &[2],
        };
        let err = pool_reduce(&[1.0], &[1.0], &indices, shape(1, 1, 1, 1, 1)).unwrap_err();
        assert!(matches!(err, PoolOpsError::IntervalOutOfBounds { .. }));
    }

    #[test]
    fn test_zero_channels_rejected() {
        let indices = PoolIndices {
            ranks_depth: &[],
            ranks_feat: &[],
            ranks_bev: &[],
            interval_starts: &[],
            interval_lengths: &[],
        };
        let err = pool_reduce(&[], &[], &indices, shape(1, 1, 1, 1, 0)).unwrap_err();
        assert!(matches!(err, PoolOpsError::InvalidShape(_)));
    }

    #[test]
    fn test_matches_sequential_reference() {
        use rand::prelude::*;

        let mut rng = StdRng::seed_from_u64(7);
        let channels = 3;
        let num_voxels = 20;
        let num_samples = 200;
        let feat_rows = 30;

        let depth: Vec<f32> = (0..num_samples).map(|_| rng.gen::<f32>()).collect();
        let feat: Vec<f32> = (0..feat_rows * channels).map(|_| rng.gen::<f32>()).collect();
        let mut ranks_bev: Vec<u32> = (0..num_samples)
            .map(|_| rng.gen_range(0..num_voxels as u32))
            .collect();
        ranks_bev.sort_unstable();
        let ranks_depth: Vec<u32> = (0..num_samples as u32).collect();
        let ranks_feat: Vec<u32> = (0..num_samples)
            .map(|_| rng.gen_range(0..feat_rows as u32))
            .collect();

        let mut starts = vec![0u32];
        for i in 1..num_samples {
            if ranks_bev[i] != ranks_bev[i - 1] {
                starts.push(i as u32);
            }
        }
        let lengths: Vec<u32> = starts
            .iter()
            .enumerate()
            .map(|(i, &s)| starts.get(i + 1).copied().unwrap_or(num_samples as u32) - s)
            .collect();

        let indices = PoolIndices {
            ranks_depth: &ranks_depth,
            ranks_feat: &ranks_feat,
            ranks_bev: &ranks_bev,
            interval_starts: &starts,
            interval_lengths: &lengths,
        };
        let out = pool_reduce(&depth, &feat, &indices, shape(1, 1, 4, 5, channels)).unwrap();

        let mut expected = vec![0.0f32; num_voxels * channels];
        for i in 0..num_samples {
            let v = ranks_bev[i] as usize;
            let r = ranks_feat[i] as usize;
            for c in 0..channels {
                expected[v * channels + c] += depth[i] * feat[r * channels + c];
            }
        }

        for (a, b) in out.iter().zip(&expected) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }
}
