//! Calibration tensors for a batch of camera rigs.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use ndarray::{s, Array3, Array4, ArrayView2};

use crate::error::{ensure_shape, LiftError, Result};

/// Length of the per-camera calibration vector from [`CameraBatch::camera_aware_features`].
pub const CAMERA_FEATURE_DIM: usize = 27;

/// Per batch element and camera calibration.
///
/// Shapes (B = batch, N = cameras):
/// - `sensor2ego`: `(B, N, 4, 4)` or `(B, N, 3, 4)`
/// - `ego2global`: `(B, N, 4, 4)` or `(B, N, 3, 4)`, not used for pooling
/// - `intrinsics`: `(B, N, 3, 3)`
/// - `post_rots`: `(B, N, 3, 3)` image-space augmentation rotation
/// - `post_trans`: `(B, N, 3)` image-space augmentation translation
/// - `bda`: `(B, 3, 3)` batch-level augmentation applied in ego space
#[derive(Debug, Clone)]
pub struct CameraBatch {
    sensor2ego: Array4<f32>,
    ego2global: Array4<f32>,
    intrinsics: Array4<f32>,
    post_rots: Array4<f32>,
    post_trans: Array3<f32>,
    bda: Array3<f32>,
}

/// One camera's calibration as fixed-size matrices.
#[derive(Debug, Clone, Copy)]
pub struct CameraParams {
    pub sensor_rot: Matrix3<f32>,
    pub sensor_trans: Vector3<f32>,
    pub intrinsics: Matrix3<f32>,
    pub post_rot: Matrix3<f32>,
    pub post_tran: Vector3<f32>,
    pub bda: Matrix3<f32>,
}

impl CameraBatch {
    /// Validate shapes and build a batch.
    ///
    /// Fails with [`LiftError::ShapeMismatch`] if any tensor disagrees with
    /// `sensor2ego` on the leading `(B, N)` dimensions or has the wrong
    /// trailing matrix shape.
    pub fn new(
        sensor2ego: Array4<f32>,
        ego2global: Array4<f32>,
        intrinsics: Array4<f32>,
        post_rots: Array4<f32>,
        post_trans: Array3<f32>,
        bda: Array3<f32>,
    ) -> Result<Self> {
        let s = sensor2ego.shape();
        let (b, n) = (s[0], s[1]);
        check_rigid("sensor2ego", s, b, n)?;
        check_rigid("ego2global", ego2global.shape(), b, n)?;
        ensure_shape("intrinsics", intrinsics.shape(), &[b, n, 3, 3])?;
        ensure_shape("post_rots", post_rots.shape(), &[b, n, 3, 3])?;
        ensure_shape("post_trans", post_trans.shape(), &[b, n, 3])?;
        ensure_shape("bda", bda.shape(), &[b, 3, 3])?;

        Ok(Self {
            sensor2ego,
            ego2global,
            intrinsics,
            post_rots,
            post_trans,
            bda,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.sensor2ego.shape()[0]
    }

    pub fn num_cameras(&self) -> usize {
        self.sensor2ego.shape()[1]
    }

    pub fn sensor2ego(&self) -> &Array4<f32> {
        &self.sensor2ego
    }

    pub fn ego2global(&self) -> &Array4<f32> {
        &self.ego2global
    }

    pub fn intrinsics(&self) -> &Array4<f32> {
        &self.intrinsics
    }

    pub fn post_rots(&self) -> &Array4<f32> {
        &self.post_rots
    }

    pub fn post_trans(&self) -> &Array3<f32> {
        &self.post_trans
    }

    pub fn bda(&self) -> &Array3<f32> {
        &self.bda
    }

    /// Calibration of camera `n` in batch element `b`.
    pub fn camera(&self, b: usize, n: usize) -> CameraParams {
        let s2e = self.sensor2ego.slice(s![b, n, .., ..]);
        CameraParams {
            sensor_rot: mat3(&s2e),
            sensor_trans: Vector3::new(s2e[[0, 3]], s2e[[1, 3]], s2e[[2, 3]]),
            intrinsics: mat3(&self.intrinsics.slice(s![b, n, .., ..])),
            post_rot: mat3(&self.post_rots.slice(s![b, n, .., ..])),
            post_tran: Vector3::new(
                self.post_trans[[b, n, 0]],
                self.post_trans[[b, n, 1]],
                self.post_trans[[b, n, 2]],
            ),
            bda: mat3(&self.bda.slice(s![b, .., ..])),
        }
    }

    /// Calibration vector per camera, shape `(B, N, 27)`.
    ///
    /// Layout: `fx, fy, cx, cy`, the 2x2 image augmentation with its
    /// translation (`r00, r01, t0, r10, r11, t1`), the BEV augmentation
    /// entries `b00, b01, b10, b11, b22`, then the top three rows of
    /// `sensor2ego` row-major.
    pub fn camera_aware_features(&self) -> Array3<f32> {
        let (b, n) = (self.batch_size(), self.num_cameras());
        let mut out = Array3::zeros((b, n, CAMERA_FEATURE_DIM));
        for bi in 0..b {
            for ni in 0..n {
                let k = &self.intrinsics;
                let r = &self.post_rots;
                let t = &self.post_trans;
                let a = &self.bda;
                let head = [
                    k[[bi, ni, 0, 0]],
                    k[[bi, ni, 1, 1]],
                    k[[bi, ni, 0, 2]],
                    k[[bi, ni, 1, 2]],
                    r[[bi, ni, 0, 0]],
                    r[[bi, ni, 0, 1]],
                    t[[bi, ni, 0]],
                    r[[bi, ni, 1, 0]],
                    r[[bi, ni, 1, 1]],
                    t[[bi, ni, 1]],
                    a[[bi, 0, 0]],
                    a[[bi, 0, 1]],
                    a[[bi, 1, 0]],
                    a[[bi, 1, 1]],
                    a[[bi, 2, 2]],
                ];
                let mut row = out.slice_mut(s![bi, ni, ..]);
                for (i, v) in head.iter().enumerate() {
                    row[i] = *v;
                }
                for i in 0..3 {
                    for j in 0..4 {
                        row[head.len() + i * 4 + j] = self.sensor2ego[[bi, ni, i, j]];
                    }
                }
            }
        }
        out
    }
}

impl CameraParams {
    /// Upper-left 2x2 block of the image augmentation.
    pub fn post_rot_2d(&self) -> Matrix2<f32> {
        self.post_rot.fixed_view::<2, 2>(0, 0).into_owned()
    }

    pub fn post_tran_2d(&self) -> Vector2<f32> {
        Vector2::new(self.post_tran.x, self.post_tran.y)
    }
}

/// Top-left 3x3 block of a 2D view.
pub(crate) fn mat3(a: &ArrayView2<'_, f32>) -> Matrix3<f32> {
    Matrix3::from_fn(|r, c| a[[r, c]])
}

/// Shape check for `(B, N, 4, 4)` or `(B, N, 3, 4)` rigid transforms.
pub(crate) fn check_rigid(what: &'static str, found: &[usize], b: usize, n: usize) -> Result<()> {
    match found {
        [fb, fn_, 3 | 4, 4] if *fb == b && *fn_ == n => Ok(()),
        _ => Err(LiftError::ShapeMismatch {
            what,
            expected: vec![b, n, 4, 4],
            found: found.to_vec(),
        }),
    }
}
