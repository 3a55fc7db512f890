//! Stain mask tiles.
//!
//! The mask is only computed at the finest level. Coarser levels get
//! all-zero tiles of the same shape rather than a downsampled mask.

use ndarray::{s, Array3, Zip};
use tracing::debug;

use crate::config::StainParams;
use crate::error::TileError;
use crate::stain::separate_stains;

/// Value written to channel 0 of positive pixels.
pub const MASK_POSITIVE: u8 = 255;

/// Mask for one `(x, y, c)` raw tile of `level`.
///
/// At `level == num_levels - 1`, channel 0 is [`MASK_POSITIVE`] wherever
/// the hematoxylin intensity exceeds `params.threshold`. Every other value,
/// and every value at coarser levels, is 0.
pub fn mask_tile(
    raw: &Array3<u8>,
    level: usize,
    num_levels: usize,
    params: &StainParams,
) -> Result<Array3<u8>, TileError> {
    let mut mask = Array3::<u8>::zeros(raw.raw_dim());
    if level + 1 != num_levels {
        return Ok(mask);
    }

    debug!(level, shape = ?raw.dim(), "Computing stain mask");
    let (_, _, channels) = raw.dim();
    if channels < 3 {
        return Err(TileError::ChannelCount {
            expected: 3,
            actual: channels,
        });
    }

    let normalized = raw.slice(s![.., .., ..3]).mapv(|v| f64::from(v) / 255.0);
    let stains = separate_stains(normalized.view(), &params.matrix)?;

    Zip::from(mask.slice_mut(s![.., .., 0]))
        .and(stains.slice(s![.., .., 0]))
        .for_each(|out, &h| {
            if h > params.threshold {
                *out = MASK_POSITIVE;
            }
        });

    Ok(mask)
}
