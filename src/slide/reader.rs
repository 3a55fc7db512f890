//! Format-agnostic view of a parsed slide.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

/// Relative slack when comparing a requested downsample with a level's.
const DOWNSAMPLE_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Level Information
// =============================================================================

/// Snapshot of one level's geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Relative to level 0, which has 1.0
    pub downsample: f64,
}

/// Non-empty region of a slide in level-0 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Level metadata and tile access for one slide format.
///
/// The reader used for I/O is passed per call, so one parsed structure can
/// serve any byte source.
#[async_trait]
pub trait SlideReader: Send + Sync {
    fn level_count(&self) -> usize;

    /// `(width, height)` of `level`, `None` out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    fn level_downsample(&self, level: usize) -> Option<f64>;

    fn tile_size(&self, level: usize) -> Option<(u32, u32)>;

    /// `(tiles_x, tiles_y)` of `level`.
    fn tile_count(&self, level: usize) -> Option<(u32, u32)>;

    /// Level-0 dimensions.
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let (tile_width, tile_height) = self.tile_size(level)?;
        let (tiles_x, tiles_y) = self.tile_count(level)?;
        Some(LevelInfo {
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            downsample: self.level_downsample(level)?,
        })
    }

    /// Region holding tissue, when the format records one.
    fn bounds(&self) -> Option<Bounds> {
        None
    }

    /// Highest level whose downsample does not exceed `downsample`.
    ///
    /// Returns 0 when `downsample` is below every level's downsample, and
    /// `None` only for a slide without levels.
    fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        let count = self.level_count();
        if count == 0 {
            return None;
        }
        let limit = downsample * (1.0 + DOWNSAMPLE_TOLERANCE);
        let best = (0..count)
            .take_while(|&level| {
                self.level_downsample(level)
                    .map(|d| d <= limit)
                    .unwrap_or(false)
            })
            .last();
        Some(best.unwrap_or(0))
    }

    /// A complete, decodable JPEG stream for one tile.
    async fn read_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError>;
}
