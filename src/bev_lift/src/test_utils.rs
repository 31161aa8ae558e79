//! Synthetic rigs, grids and point sets with known ground truth.

use nalgebra::Matrix3;
use ndarray::{s, Array, Array3, Array4, Array6};

use crate::geometry::{CameraBatch, WorldPoints};
use crate::grid::{AxisRange, GridConfig};

/// `B x N` cameras with identity extrinsics, intrinsics and augmentation.
///
/// With this rig a frustum sample `(u, v, d)` lands at `(u * d, v * d, d)`.
pub fn identity_cameras(batch: usize, cameras: usize) -> CameraBatch {
    let eye4 = Array::from_shape_fn((batch, cameras, 4, 4), |(_, _, r, c)| {
        if r == c {
            1.0
        } else {
            0.0
        }
    });
    let eye3 = Array::from_shape_fn((batch, cameras, 3, 3), |(_, _, r, c)| {
        if r == c {
            1.0
        } else {
            0.0
        }
    });
    let bda = Array::from_shape_fn((batch, 3, 3), |(_, r, c)| if r == c { 1.0 } else { 0.0 });

    CameraBatch::new(
        eye4.clone(),
        eye4,
        eye3.clone(),
        eye3,
        Array3::zeros((batch, cameras, 3)),
        bda,
    )
    .expect("identity rig shapes are consistent")
}

/// Pinhole intrinsics matrix.
pub fn pinhole_intrinsics(fx: f32, fy: f32, cx: f32, cy: f32) -> Matrix3<f32> {
    Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
}

/// Replace the intrinsics of camera `camera` in every batch element.
pub fn with_intrinsics(cams: CameraBatch, camera: usize, k: &Matrix3<f32>) -> CameraBatch {
    let mut intrinsics: Array4<f32> = cams.intrinsics().clone();
    for b in 0..cams.batch_size() {
        let mut m = intrinsics.slice_mut(s![b, camera, .., ..]);
        for r in 0..3 {
            for c in 0..3 {
                m[[r, c]] = k[(r, c)];
            }
        }
    }
    CameraBatch::new(
        cams.sensor2ego().clone(),
        cams.ego2global().clone(),
        intrinsics,
        cams.post_rots().clone(),
        cams.post_trans().clone(),
        cams.bda().clone(),
    )
    .expect("intrinsics replacement keeps shapes")
}

/// Replace the sensor-to-ego translation of camera `camera` in every batch element.
pub fn with_translation(cams: CameraBatch, camera: usize, t: [f32; 3]) -> CameraBatch {
    let mut sensor2ego: Array4<f32> = cams.sensor2ego().clone();
    for b in 0..cams.batch_size() {
        for (r, v) in t.iter().enumerate() {
            sensor2ego[[b, camera, r, 3]] = *v;
        }
    }
    CameraBatch::new(
        sensor2ego,
        cams.ego2global().clone(),
        cams.intrinsics().clone(),
        cams.post_rots().clone(),
        cams.post_trans().clone(),
        cams.bda().clone(),
    )
    .expect("translation replacement keeps shapes")
}

/// Grid with unit cells covering `[0, nx) x [0, ny) x [0, nz)` and depth `[1, 1 + d)`.
pub fn unit_grid(nx: usize, ny: usize, nz: usize, depth_bins: usize) -> GridConfig {
    GridConfig {
        x: AxisRange::new(0.0, nx as f32, 1.0),
        y: AxisRange::new(0.0, ny as f32, 1.0),
        z: AxisRange::new(0.0, nz as f32, 1.0),
        depth: AxisRange::new(1.0, 1.0 + depth_bins as f32, 1.0),
    }
}

/// Wrap an explicit list of points as a `(1, 1, 1, 1, P, 3)` point set.
pub fn points_from_list(points: &[[f32; 3]]) -> WorldPoints {
    let arr = Array6::from_shape_fn((1, 1, 1, 1, points.len(), 3), |(_, _, _, _, i, c)| {
        points[i][c]
    });
    WorldPoints::from_array(arr).expect("last axis is 3")
}

/// Uniform pseudo-random points inside `[lower, upper)` of shape `(B, N, D, H, W, 3)`.
///
/// Uses a fixed LCG so results are reproducible for a given seed.
pub fn make_random_points(
    dims: [usize; 5],
    lower: [f32; 3],
    upper: [f32; 3],
    seed: u64,
) -> WorldPoints {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
    let mut next_random = || -> f32 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 40) as f32) / ((1u64 << 24) as f32)
    };
    let [b, n, d, h, w] = dims;
    let arr = Array6::from_shape_fn((b, n, d, h, w, 3), |(.., c)| {
        lower[c] + next_random() * (upper[c] - lower[c])
    });
    WorldPoints::from_array(arr).expect("last axis is 3")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_cameras() {
        let cams = identity_cameras(2, 3);
        assert_eq!(cams.batch_size(), 2);
        assert_eq!(cams.num_cameras(), 3);
        assert_eq!(cams.camera(1, 2).intrinsics, Matrix3::identity());
    }

    #[test]
    fn test_random_points_reproducible() {
        let a = make_random_points([1, 2, 3, 4, 5], [0.0; 3], [1.0; 3], 7);
        let b = make_random_points([1, 2, 3, 4, 5], [0.0; 3], [1.0; 3], 7);
        assert_eq!(a.view(), b.view());
        assert!(a.view().iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_unit_grid() {
        let info = unit_grid(4, 3, 2, 5).grid_info().unwrap();
        assert_eq!(info.size, [4, 3, 2]);
        assert_eq!(unit_grid(4, 3, 2, 5).depth_bins().unwrap(), 5);
    }
}
