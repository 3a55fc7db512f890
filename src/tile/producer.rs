//! Raw tile production in `(x, y, channel)` layout.

use image::RgbImage;
use ndarray::Array3;
use tracing::debug;

use crate::error::TileError;
use crate::slide::SlideSource;

/// Fetch one tile and lay it out as a `(width, height, 3)` array.
///
/// Images are stored row-major, so the two spatial axes are swapped;
/// `tile[[x, y, c]]` is channel `c` of the pixel in column `x`, row `y`.
pub async fn fetch_tile(
    source: &dyn SlideSource,
    level: usize,
    col: u32,
    row: u32,
) -> Result<Array3<u8>, TileError> {
    debug!(level, col, row, "Fetching tile");
    let image = source.get_tile(level, col, row).await?;
    Ok(image_to_tile(&image))
}

pub fn image_to_tile(image: &RgbImage) -> Array3<u8> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((width as usize, height as usize, 3), |(x, y, c)| {
        image.get_pixel(x as u32, y as u32).0[c]
    })
}

/// Inverse of [`image_to_tile`].
pub fn tile_to_image(tile: &Array3<u8>) -> Result<RgbImage, TileError> {
    let (width, height, channels) = tile.dim();
    if channels < 3 {
        return Err(TileError::ChannelCount {
            expected: 3,
            actual: channels,
        });
    }
    Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        image::Rgb([tile[[x, y, 0]], tile[[x, y, 1]], tile[[x, y, 2]]])
    }))
}
