//! Discretized Gaussian depth distribution.
//!
//! # Algorithm
//!
//! For each pixel with normalized mean `m` and log-variance `v`, bin `k` gets
//!
//! ```text
//! log p_k = -0.5 * (ln(2π) + v) - 0.5 * (k - m * D)² / (exp(v) + ε)
//! ```
//!
//! The log-probabilities are shifted by their maximum before exponentiation
//! and then normalized with `ε` added to the denominator. The shift cancels
//! in the normalization but keeps the peak bin at `exp(0) = 1`, so narrow
//! distributions (`v = -10`) whose mean falls between bins still sum to one
//! instead of underflowing to all zeros.

use ndarray::{Array4, ArrayView3, Axis};
use rayon::prelude::*;

use crate::error::{ensure_shape, Result};

/// Added to the variance and to the normalizer.
pub const GAUSSIAN_EPS: f32 = 1e-6;

/// Lower clamp applied to predicted log-variances.
pub const LOGVAR_FLOOR: f32 = -10.0;

const LN_2PI: f32 = 1.837_877_1;

/// Probability over `num_bins` depth bins, shape `(M, D, H, W)`.
///
/// `mean` (in `[0, 1]`, scaled by `D` to bin units) and `logvar` are `(M, H, W)`.
pub fn depth_distribution_from_gaussian(
    mean: ArrayView3<'_, f32>,
    logvar: ArrayView3<'_, f32>,
    num_bins: usize,
) -> Result<Array4<f32>> {
    ensure_shape("logvar", logvar.shape(), mean.shape())?;
    let s = mean.shape();
    let (m, h, w) = (s[0], s[1], s[2]);
    let d = num_bins as f32;

    let mut out = Array4::zeros((m, num_bins, h, w));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(mean.axis_iter(Axis(0)).into_par_iter())
        .zip(logvar.axis_iter(Axis(0)).into_par_iter())
        .for_each(|((mut prob, mu), lv)| {
            let mut log_p = vec![0.0f32; num_bins];
            for y in 0..h {
                for x in 0..w {
                    let center = mu[[y, x]] * d;
                    let v = lv[[y, x]];
                    let norm = -0.5 * (LN_2PI + v);
                    let denom = v.exp() + GAUSSIAN_EPS;

                    let mut peak = f32::NEG_INFINITY;
                    for (k, lp) in log_p.iter_mut().enumerate() {
                        let diff = k as f32 - center;
                        *lp = norm - 0.5 * diff * diff / denom;
                        peak = peak.max(*lp);
                    }
                    let mut total = 0.0f32;
                    for lp in log_p.iter_mut() {
                        *lp = (*lp - peak).exp();
                        total += *lp;
                    }
                    let scale = 1.0 / (total + GAUSSIAN_EPS);
                    for (k, p) in log_p.iter().enumerate() {
                        prob[[k, y, x]] = p * scale;
                    }
                }
            }
        });
    Ok(out)
}
