//! Frustum-to-ego unprojection.
//!
//! For every camera the frustum sample `(u, v, d)` goes through:
//! 1. Undo image augmentation: `q = post_rot⁻¹ · ((u, v, d) - post_tran)`
//! 2. Lift to a camera ray: `(q.x · q.z, q.y · q.z, q.z)`
//! 3. Camera to ego: `sensor_rot · K⁻¹ · ray + sensor_trans`
//! 4. BEV augmentation: `bda · p`

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array6, ArrayView6};
use rayon::prelude::*;

use super::camera::{CameraBatch, CameraParams};
use crate::error::{LiftError, Result};
use crate::grid::Frustum;

/// Frustum points in the ego frame, shape `(B, N, D, H, W, 3)`.
#[derive(Debug, Clone)]
pub struct WorldPoints {
    points: Array6<f32>,
}

impl WorldPoints {
    /// Wrap an existing `(B, N, D, H, W, 3)` array.
    pub fn from_array(points: Array6<f32>) -> Result<Self> {
        let shape = points.shape();
        if shape[5] != 3 {
            return Err(LiftError::ShapeMismatch {
                what: "world points",
                expected: vec![shape[0], shape[1], shape[2], shape[3], shape[4], 3],
                found: shape.to_vec(),
            });
        }
        let points = if points.is_standard_layout() {
            points
        } else {
            points.as_standard_layout().into_owned()
        };
        Ok(Self { points })
    }

    pub fn view(&self) -> ArrayView6<'_, f32> {
        self.points.view()
    }

    /// `(B, N, D, H, W)`.
    pub fn dims(&self) -> [usize; 5] {
        let s = self.points.shape();
        [s[0], s[1], s[2], s[3], s[4]]
    }

    /// Number of points `B * N * D * H * W`.
    pub fn len(&self) -> usize {
        self.dims().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates flattened in `(B, N, D, H, W, xyz)` order.
    pub fn as_flat(&self) -> &[f32] {
        // always standard layout: built by `unproject` or normalized in `from_array`
        self.points.as_slice().unwrap_or_default()
    }

    pub fn into_array(self) -> Array6<f32> {
        self.points
    }
}

/// Image-to-sensor-frame lift of one camera, steps 1 to 3 above.
///
/// Shared by the ego unprojection and the sweep projection; the "sensor
/// frame" is the ego frame for the former and the sweep camera for the latter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ImageLift {
    inv_post_rot: Matrix3<f32>,
    post_tran: Vector3<f32>,
    combine: Matrix3<f32>,
    trans: Vector3<f32>,
}

impl ImageLift {
    pub(crate) fn new(cam: &CameraParams, b: usize, n: usize) -> Result<Self> {
        let singular = |what| LiftError::SingularTransform {
            what,
            batch: b,
            camera: n,
        };
        let inv_post_rot = cam.post_rot.try_inverse().ok_or_else(|| singular("post_rot"))?;
        let inv_k = cam.intrinsics.try_inverse().ok_or_else(|| singular("intrinsics"))?;
        Ok(Self {
            inv_post_rot,
            post_tran: cam.post_tran,
            combine: cam.sensor_rot * inv_k,
            trans: cam.sensor_trans,
        })
    }

    #[inline]
    pub(crate) fn apply(&self, sample: Vector3<f32>) -> Vector3<f32> {
        let q = self.inv_post_rot * (sample - self.post_tran);
        let ray = Vector3::new(q.x * q.z, q.y * q.z, q.z);
        self.combine * ray + self.trans
    }
}

#[derive(Debug, Clone, Copy)]
struct EgoTransform {
    lift: ImageLift,
    bda: Matrix3<f32>,
}

impl EgoTransform {
    fn new(cam: &CameraParams, b: usize, n: usize) -> Result<Self> {
        Ok(Self {
            lift: ImageLift::new(cam, b, n)?,
            bda: cam.bda,
        })
    }

    #[inline]
    fn apply(&self, sample: Vector3<f32>) -> Vector3<f32> {
        self.bda * self.lift.apply(sample)
    }
}

/// Map every frustum sample of every camera into the ego frame.
///
/// Fails with [`LiftError::SingularTransform`] only when `post_rot` or the
/// intrinsics are exactly singular; near-singular matrices are inverted as is.
pub fn unproject(frustum: &Frustum, cameras: &CameraBatch) -> Result<WorldPoints> {
    let (b, n) = (cameras.batch_size(), cameras.num_cameras());
    let fshape = frustum.points().shape();
    let (d, h, w) = (fshape[0], fshape[1], fshape[2]);

    let transforms = (0..b * n)
        .map(|i| EgoTransform::new(&cameras.camera(i / n, i % n), i / n, i % n))
        .collect::<Result<Vec<_>>>()?;

    let samples = frustum_samples(frustum);
    let per_camera = samples.len() * 3;
    let mut buf = vec![0.0f32; b * n * per_camera];
    if per_camera > 0 {
        buf.par_chunks_mut(per_camera)
            .zip(transforms.par_iter())
            .for_each(|(out, tf)| {
                for (dst, sample) in out.chunks_exact_mut(3).zip(&samples) {
                    let p = tf.apply(*sample);
                    dst.copy_from_slice(p.as_slice());
                }
            });
    }

    let points = Array6::from_shape_vec((b, n, d, h, w, 3), buf)?;
    Ok(WorldPoints { points })
}

/// Frustum samples flattened in `(D, H, W)` order.
pub(crate) fn frustum_samples(frustum: &Frustum) -> Vec<Vector3<f32>> {
    frustum
        .points()
        .rows()
        .into_iter()
        .map(|p| Vector3::new(p[0], p[1], p[2]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{AxisRange, DepthSpacing};
    use crate::test_utils::{identity_cameras, pinhole_intrinsics, with_intrinsics};
    use approx::assert_relative_eq;
    use ndarray::{s, Array3, Array4};

    fn small_frustum() -> Frustum {
        Frustum::new(
            &AxisRange::new(1.0, 4.0, 1.0),
            DepthSpacing::Linear,
            [4, 8],
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_identity_geometry_scales_by_depth() {
        let frustum = small_frustum();
        let cams = identity_cameras(1, 1);
        let pts = unproject(&frustum, &cams).unwrap();

        assert_eq!(pts.dims(), [1, 1, 3, 1, 2]);
        let v = pts.view();
        let f = frustum.points();
        for d in 0..3 {
            for x in 0..2 {
                let (u, vv, z) = (f[[d, 0, x, 0]], f[[d, 0, x, 1]], f[[d, 0, x, 2]]);
                assert_relative_eq!(v[[0, 0, d, 0, x, 0]], u * z);
                assert_relative_eq!(v[[0, 0, d, 0, x, 1]], vv * z);
                assert_relative_eq!(v[[0, 0, d, 0, x, 2]], z);
            }
        }
    }

    #[test]
    fn test_pinhole_principal_ray() {
        // Principal point at pixel (7, 0): its ray maps to (0, -cy*d/fy, d)
        let frustum = small_frustum();
        let k = pinhole_intrinsics(10.0, 10.0, 7.0, 0.0);
        let cams = with_intrinsics(identity_cameras(1, 1), 0, &k);
        let pts = unproject(&frustum, &cams).unwrap();
        let v = pts.view();
        // column 1 is pixel x = 7
        for d in 0..3 {
            let depth = frustum.depth_values()[d];
            assert_relative_eq!(v[[0, 0, d, 0, 1, 0]], 0.0, epsilon = 1e-5);
            assert_relative_eq!(v[[0, 0, d, 0, 1, 1]], 0.0, epsilon = 1e-5);
            assert_relative_eq!(v[[0, 0, d, 0, 1, 2]], depth, epsilon = 1e-5);
            assert_relative_eq!(v[[0, 0, d, 0, 0, 0]], -0.7 * depth, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_translation_and_bda() {
        let frustum = small_frustum();
        let cams = identity_cameras(1, 1);
        let mut s2e = cams.sensor2ego().clone();
        s2e[[0, 0, 0, 3]] = 1.0;
        s2e[[0, 0, 1, 3]] = -2.0;
        s2e[[0, 0, 2, 3]] = 0.5;
        // flip x in ego space
        let mut bda = Array3::zeros((1, 3, 3));
        bda[[0, 0, 0]] = -1.0;
        bda[[0, 1, 1]] = 1.0;
        bda[[0, 2, 2]] = 1.0;
        let cams = CameraBatch::new(
            s2e,
            cams.ego2global().clone(),
            cams.intrinsics().clone(),
            cams.post_rots().clone(),
            cams.post_trans().clone(),
            bda,
        )
        .unwrap();

        let base = unproject(&frustum, &identity_cameras(1, 1)).unwrap();
        let moved = unproject(&frustum, &cams).unwrap();
        let (a, m) = (base.view(), moved.view());
        for d in 0..3 {
            for x in 0..2 {
                assert_relative_eq!(m[[0, 0, d, 0, x, 0]], -(a[[0, 0, d, 0, x, 0]] + 1.0));
                assert_relative_eq!(m[[0, 0, d, 0, x, 1]], a[[0, 0, d, 0, x, 1]] - 2.0);
                assert_relative_eq!(m[[0, 0, d, 0, x, 2]], a[[0, 0, d, 0, x, 2]] + 0.5);
            }
        }
    }

    #[test]
    fn test_post_augmentation_is_undone() {
        // Resize by 0.5 then shift by (3, 1): the unprojection must match
        // the un-augmented camera at the same source pixel.
        let frustum = small_frustum();
        let plain = identity_cameras(1, 1);
        let mut rots = Array4::zeros((1, 1, 3, 3));
        rots[[0, 0, 0, 0]] = 0.5;
        rots[[0, 0, 1, 1]] = 0.5;
        rots[[0, 0, 2, 2]] = 1.0;
        let mut trans = Array3::zeros((1, 1, 3));
        trans[[0, 0, 0]] = 3.0;
        trans[[0, 0, 1]] = 1.0;
        let aug = CameraBatch::new(
            plain.sensor2ego().clone(),
            plain.ego2global().clone(),
            plain.intrinsics().clone(),
            rots,
            trans,
            plain.bda().clone(),
        )
        .unwrap();

        let pts = unproject(&frustum, &aug).unwrap();
        let v = pts.view();
        let f = frustum.points();
        let (u, vv, z) = (f[[1, 0, 1, 0]], f[[1, 0, 1, 1]], f[[1, 0, 1, 2]]);
        assert_relative_eq!(v[[0, 0, 1, 0, 1, 0]], (u - 3.0) / 0.5 * z, epsilon = 1e-4);
        assert_relative_eq!(v[[0, 0, 1, 0, 1, 1]], (vv - 1.0) / 0.5 * z, epsilon = 1e-4);
    }

    #[test]
    fn test_singular_intrinsics() {
        let frustum = small_frustum();
        let cams = with_intrinsics(identity_cameras(1, 2), 1, &Matrix3::zeros());
        let err = unproject(&frustum, &cams).unwrap_err();
        assert!(matches!(
            err,
            LiftError::SingularTransform {
                what: "intrinsics",
                batch: 0,
                camera: 1
            }
        ));
    }

    #[test]
    fn test_multi_camera_layout() {
        let frustum = small_frustum();
        let cams = identity_cameras(2, 3);
        let pts = unproject(&frustum, &cams).unwrap();
        assert_eq!(pts.dims(), [2, 3, 3, 1, 2]);
        assert_eq!(pts.len(), 36);
        let v = pts.view();
        assert_eq!(v.slice(s![0, 0, .., .., .., ..]), v.slice(s![1, 2, .., .., .., ..]));
    }
}
