//! Bilinear grid sampling with corner-aligned coordinates and zero padding.

use ndarray::{Array4, ArrayView4, Axis};
use rayon::prelude::*;

use crate::error::{LiftError, Result};

/// Sample `input (M, C, H_in, W_in)` at `grid (M, H_out, W_out, 2)`.
///
/// Grid entries are `(x, y)` in `[-1, 1]`, where -1 and 1 are the centers of
/// the first and last pixel. Taps falling outside the input contribute zero,
/// so coordinates at or beyond ±2 sample exactly zero.
pub fn grid_sample_bilinear(
    input: ArrayView4<'_, f32>,
    grid: ArrayView4<'_, f32>,
) -> Result<Array4<f32>> {
    let (is, gs) = (input.shape(), grid.shape());
    if gs[0] != is[0] || gs[3] != 2 {
        return Err(LiftError::ShapeMismatch {
            what: "sampling grid",
            expected: vec![is[0], gs[1], gs[2], 2],
            found: gs.to_vec(),
        });
    }
    let (m, c, hi, wi) = (is[0], is[1], is[2], is[3]);
    let (ho, wo) = (gs[1], gs[2]);
    let half_w = (wi as f32 - 1.0) / 2.0;
    let half_h = (hi as f32 - 1.0) / 2.0;

    let mut out = Array4::zeros((m, c, ho, wo));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(input.axis_iter(Axis(0)).into_par_iter())
        .zip(grid.axis_iter(Axis(0)).into_par_iter())
        .for_each(|((mut dst, src), g)| {
            for y in 0..ho {
                for x in 0..wo {
                    let px = (g[[y, x, 0]] + 1.0) * half_w;
                    let py = (g[[y, x, 1]] + 1.0) * half_h;
                    if !px.is_finite() || !py.is_finite() {
                        continue;
                    }
                    let (x0, y0) = (px.floor(), py.floor());
                    let (fx, fy) = (px - x0, py - y0);
                    let taps = [
                        (x0, y0, (1.0 - fx) * (1.0 - fy)),
                        (x0 + 1.0, y0, fx * (1.0 - fy)),
                        (x0, y0 + 1.0, (1.0 - fx) * fy),
                        (x0 + 1.0, y0 + 1.0, fx * fy),
                    ];
                    for (tx, ty, wgt) in taps {
                        if tx < 0.0 || ty < 0.0 || tx >= wi as f32 || ty >= hi as f32 || wgt == 0.0 {
                            continue;
                        }
                        let (tx, ty) = (tx as usize, ty as usize);
                        for ch in 0..c {
                            dst[[ch, y, x]] += wgt * src[[ch, ty, tx]];
                        }
                    }
                }
            }
        });
    Ok(out)
}
