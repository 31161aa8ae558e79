//! Reduction primitives used by the BEV view transformer.
//!
//! This crate provides the interval-based voxel pooling reduction
//! ("BEVPool v2"): given per-sample depth weights, per-pixel features and
//! a pooling plan (sorted voxel ranks plus contiguous interval descriptors),
//! it accumulates `depth * feature` for every occupied voxel of a dense
//! `(B, Z, Y, X, C)` output buffer.
//!
//! # Example
//!
//! ```ignore
//! use bev_pool_ops::{pool_reduce, BevPoolShape, PoolIndices};
//!
//! let shape = BevPoolShape { batch: 1, z: 1, y: 2, x: 2, channels: 1 };
//! let indices = PoolIndices {
//!     ranks_depth: &[0],
//!     ranks_feat: &[0],
//!     ranks_bev: &[0],
//!     interval_starts: &[0],
//!     interval_lengths: &[1],
//! };
//! let grid = pool_reduce(&[1.0], &[1.0], &indices, shape)?;
//! assert_eq!(grid, vec![1.0, 0.0, 0.0, 0.0]);
//! ```

pub mod bev_pool;

pub use bev_pool::{pool_reduce, BevPoolShape, PoolIndices, PoolOpsError};
