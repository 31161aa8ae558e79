//! Camera-to-camera projection of the frustum into another frame's image.
//!
//! Runs the image-to-camera lift shared with [`super::unproject`],
//! moves the points with the key-to-sweep sensor transform, then projects
//! them back through the intrinsics and image augmentation. The result is a
//! sampling grid normalized to `[-1, 1]` over the image extent.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use ndarray::{s, Array3, Array4, Array5};
use rayon::prelude::*;

use super::camera::{check_rigid, mat3, CameraParams};
use super::unproject::{frustum_samples, ImageLift};
use crate::error::{ensure_shape, LiftError, Result};
use crate::grid::Frustum;

/// Points closer than this to the sweep camera plane are treated as behind it.
pub const MIN_PROJECTION_DEPTH: f32 = 1e-3;

/// Normalized coordinate assigned to invalid samples; outside `[-1, 1]`
/// so zero-padded sampling returns zero.
pub const INVALID_COORD: f32 = -2.0;

/// Calibration relating the current (key) frame to a previous (sweep) frame.
///
/// Shapes: `key2sweep (B, N, 4, 4)` or `(B, N, 3, 4)`, `intrinsics` and
/// `post_rots` `(B, N, 3, 3)`, `post_trans (B, N, 3)`.
#[derive(Debug, Clone)]
pub struct SweepCalibration {
    key2sweep: Array4<f32>,
    intrinsics: Array4<f32>,
    post_rots: Array4<f32>,
    post_trans: Array3<f32>,
}

impl SweepCalibration {
    pub fn new(
        key2sweep: Array4<f32>,
        intrinsics: Array4<f32>,
        post_rots: Array4<f32>,
        post_trans: Array3<f32>,
    ) -> Result<Self> {
        let (b, n) = (key2sweep.shape()[0], key2sweep.shape()[1]);
        check_rigid("key2sweep", key2sweep.shape(), b, n)?;
        ensure_shape("intrinsics", intrinsics.shape(), &[b, n, 3, 3])?;
        ensure_shape("post_rots", post_rots.shape(), &[b, n, 3, 3])?;
        ensure_shape("post_trans", post_trans.shape(), &[b, n, 3])?;
        Ok(Self {
            key2sweep,
            intrinsics,
            post_rots,
            post_trans,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.key2sweep.shape()[0]
    }

    pub fn num_cameras(&self) -> usize {
        self.key2sweep.shape()[1]
    }

    /// Key camera `n` of batch element `b`, with the key-to-sweep transform
    /// standing in for the extrinsics.
    pub fn camera(&self, b: usize, n: usize) -> CameraParams {
        let rigid = self.key2sweep.slice(s![b, n, .., ..]);
        CameraParams {
            sensor_rot: mat3(&rigid),
            sensor_trans: Vector3::new(rigid[[0, 3]], rigid[[1, 3]], rigid[[2, 3]]),
            intrinsics: mat3(&self.intrinsics.slice(s![b, n, .., ..])),
            post_rot: mat3(&self.post_rots.slice(s![b, n, .., ..])),
            post_tran: Vector3::new(
                self.post_trans[[b, n, 0]],
                self.post_trans[[b, n, 1]],
                self.post_trans[[b, n, 2]],
            ),
            bda: Matrix3::identity(),
        }
    }

    fn transform(&self, b: usize, n: usize) -> Result<SweepTransform> {
        let cam = self.camera(b, n);
        Ok(SweepTransform {
            lift: ImageLift::new(&cam, b, n)?,
            intrinsics: cam.intrinsics,
            post_rot_2d: cam.post_rot_2d(),
            post_tran_2d: cam.post_tran_2d(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct SweepTransform {
    lift: ImageLift,
    intrinsics: Matrix3<f32>,
    post_rot_2d: Matrix2<f32>,
    post_tran_2d: Vector2<f32>,
}

impl SweepTransform {
    /// Pixel position in the sweep image, or `None` behind the camera.
    #[inline]
    fn project(&self, sample: Vector3<f32>) -> Option<Vector2<f32>> {
        let cam = self.lift.apply(sample);
        if cam.z < MIN_PROJECTION_DEPTH {
            return None;
        }
        let img = self.intrinsics * cam;
        let uv = Vector2::new(img.x / img.z, img.y / img.z);
        Some(self.post_rot_2d * uv + self.post_tran_2d)
    }
}

/// Normalized sampling positions per depth hypothesis.
#[derive(Debug, Clone)]
pub struct SamplingGrid {
    /// `(B*N, D, H, W, 2)` holding `(x, y)` in `[-1, 1]` for in-image samples.
    pub grid: Array5<f32>,
    /// `(B*N, D, H, W)`; false where the point lies behind the sweep camera.
    pub valid: Array4<bool>,
}

/// Project the frustum of every key camera into its sweep image.
///
/// `image_size = (H_img, W_img)` is the pixel extent the normalization maps
/// onto `[-1, 1]` (corner-aligned: pixel 0 → -1, pixel `W_img - 1` → 1).
pub fn sweep_sampling_grid(
    frustum: &Frustum,
    calib: &SweepCalibration,
    image_size: [usize; 2],
) -> Result<SamplingGrid> {
    let (b, n) = (calib.batch_size(), calib.num_cameras());
    let fshape = frustum.points().shape();
    let (d, h, w) = (fshape[0], fshape[1], fshape[2]);
    let [hi, wi] = image_size;
    if hi < 2 || wi < 2 {
        return Err(LiftError::InvalidConfig(format!(
            "sweep image size {image_size:?} too small to normalize"
        )));
    }
    let (sx, sy) = (2.0 / (wi as f32 - 1.0), 2.0 / (hi as f32 - 1.0));

    let transforms = (0..b * n)
        .map(|i| calib.transform(i / n, i % n))
        .collect::<Result<Vec<_>>>()?;

    let samples = frustum_samples(frustum);
    let per_camera = samples.len();
    let mut coords = vec![0.0f32; b * n * per_camera * 2];
    let mut valid = vec![false; b * n * per_camera];
    if per_camera > 0 {
        coords
            .par_chunks_mut(per_camera * 2)
            .zip(valid.par_chunks_mut(per_camera))
            .zip(transforms.par_iter())
            .for_each(|((xy, ok), tf)| {
                for ((dst, flag), sample) in xy.chunks_exact_mut(2).zip(ok.iter_mut()).zip(&samples) {
                    match tf.project(*sample) {
                        Some(px) => {
                            dst[0] = px.x * sx - 1.0;
                            dst[1] = px.y * sy - 1.0;
                            *flag = true;
                        }
                        None => {
                            dst[0] = INVALID_COORD;
                            dst[1] = INVALID_COORD;
                            *flag = false;
                        }
                    }
                }
            });
    }

    Ok(SamplingGrid {
        grid: Array5::from_shape_vec((b * n, d, h, w, 2), coords)?,
        valid: Array4::from_shape_vec((b * n, d, h, w), valid)?,
    })
}
