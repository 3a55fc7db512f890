//! The tile source consumed by the pyramid pipeline.

use async_trait::async_trait;
use image::RgbImage;

use crate::error::TileError;

/// A pyramidal image addressable by `(level, column, row)` tiles.
///
/// Level 0 is the lowest resolution. Implementations are read-only once
/// constructed and must tolerate concurrent `get_tile` calls.
#[async_trait]
pub trait SlideSource: Send + Sync {
    fn level_count(&self) -> usize;

    /// `(width, height)` in pixels of `level`.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// `(tiles_x, tiles_y)` of `level`.
    fn level_tiles(&self, level: usize) -> Option<(u32, u32)>;

    /// Nominal tile edge; edge tiles may be smaller.
    fn tile_size(&self) -> u32;

    /// One tile as a `height x width` row-major RGB image.
    async fn get_tile(&self, level: usize, col: u32, row: u32) -> Result<RgbImage, TileError>;
}
