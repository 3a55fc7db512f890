//! Hematoxylin / Eosin / DAB colour deconvolution.
//!
//! RGB intensities in [0, 1] are taken to an optical-density-like space,
//! `log(max(rgb, 1e-6)) / log(1e-6)`, which maps 1 (white, no stain) to 0
//! and the clamp floor to 1. Each pixel's OD vector is then multiplied by
//! the inverse stain matrix and negative stain amounts are clamped to 0.

use ndarray::{Array3, ArrayView3, Axis, Zip};

use crate::error::TileError;

/// 3x3 stain matrix, applied to row vectors as `od · M`.
pub type StainMatrix = [[f64; 3]; 3];

/// Inverse of the Ruifrok & Johnston H&E-DAB stain vectors.
pub const HED_FROM_RGB: StainMatrix = [
    [1.87798274, -1.00767869, -0.55611582],
    [-0.06590806, 1.13473037, -0.1355218],
    [-0.60190736, -0.48041419, 1.57358807],
];

/// Floor applied before the logarithm.
pub const MIN_INTENSITY: f64 = 1e-6;

/// Separate an `(x, y, c)` image with `c >= 3` into stain intensities.
///
/// Only the first three channels are read. The input view is never written;
/// the result is a fresh `(x, y, 3)` array with every value `>= 0`.
pub fn separate_stains(
    rgb: ArrayView3<'_, f64>,
    matrix: &StainMatrix,
) -> Result<Array3<f64>, TileError> {
    let (width, height, channels) = rgb.dim();
    if channels < 3 {
        return Err(TileError::ChannelCount {
            expected: 3,
            actual: channels,
        });
    }

    let log_floor = MIN_INTENSITY.ln();
    let mut stains = Array3::<f64>::zeros((width, height, 3));

    Zip::from(stains.lanes_mut(Axis(2)))
        .and(rgb.lanes(Axis(2)))
        .for_each(|mut out, px| {
            let od = [0, 1, 2].map(|c| px[c].max(MIN_INTENSITY).ln() / log_floor);
            for (j, value) in out.iter_mut().enumerate() {
                let mixed = od[0] * matrix[0][j] + od[1] * matrix[1][j] + od[2] * matrix[2][j];
                *value = mixed.max(0.0);
            }
        });

    Ok(stains)
}
