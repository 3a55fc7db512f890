//! An opened whole-slide image.
//!
//! [`WholeSlide`] ties a byte source to its parsed structure and turns the
//! stored JPEG tiles into pixels. It answers region reads at any slide
//! level; [`super::DeepZoomGenerator`] builds its tile grid on top of that.

use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use tracing::{debug, info};

use crate::config::ReaderConfig;
use crate::error::{FormatError, TileError};
use crate::format::{detect_format, SvsReader};
use crate::io::{BlockCache, FileRangeReader, RangeReader};
use crate::tile::{JpegTileDecoder, TileCache, TileCacheKey};

use super::reader::SlideReader;

/// Colour of pixels outside the slide.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Byte source, parsed slide structure and decoded-tile cache.
pub struct WholeSlide<R, S = SvsReader> {
    reader: R,
    slide: S,
    tiles: TileCache,
    decoder: JpegTileDecoder,
}

impl WholeSlide<BlockCache<FileRangeReader>, SvsReader> {
    /// Open a local Aperio SVS file.
    pub async fn open(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let file = FileRangeReader::open(path).await?;
        let reader = BlockCache::with_capacity(file, config.block_size, config.cache_blocks);

        let format = detect_format(&reader).await?;
        let slide = SvsReader::open(&reader).await?;

        info!(
            path = %path.display(),
            format = format.name(),
            levels = slide.level_count(),
            dimensions = ?slide.dimensions(),
            "Opened slide"
        );

        Ok(Self::from_parts(reader, slide, config.tile_cache_bytes))
    }
}

impl<R: RangeReader, S: SlideReader> WholeSlide<R, S> {
    pub fn from_parts(reader: R, slide: S, tile_cache_bytes: usize) -> Self {
        Self {
            reader,
            slide,
            tiles: TileCache::with_capacity(tile_cache_bytes),
            decoder: JpegTileDecoder::new(),
        }
    }

    pub fn slide(&self) -> &S {
        &self.slide
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Decoded source tile, from the cache when possible.
    pub async fn read_source_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Arc<RgbImage>, TileError> {
        let key = TileCacheKey::new(level, tile_x, tile_y);
        if let Some(tile) = self.tiles.get(&key).await {
            return Ok(tile);
        }

        debug!(level, tile_x, tile_y, "Source tile cache miss");
        let jpeg = self
            .slide
            .read_tile(&self.reader, level, tile_x, tile_y)
            .await?;

        let decoder = self.decoder;
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&jpeg))
            .await
            .map_err(|e| TileError::TaskFailed {
                message: e.to_string(),
            })??;

        let tile = Arc::new(decoded);
        self.tiles.put(key, Arc::clone(&tile)).await;
        Ok(tile)
    }

    /// Read `width x height` pixels of `level` whose top-left corner is at
    /// `(l0_x, l0_y)` in level-0 coordinates.
    ///
    /// Pixels beyond the level's extent are [`BACKGROUND`].
    pub async fn read_region(
        &self,
        l0_x: u64,
        l0_y: u64,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<RgbImage, TileError> {
        let max_levels = self.slide.level_count();
        let invalid = || TileError::InvalidLevel { level, max_levels };
        let info = self.slide.level_info(level).ok_or_else(invalid)?;

        let origin_x = (l0_x as f64 / info.downsample).floor() as u64;
        let origin_y = (l0_y as f64 / info.downsample).floor() as u64;

        let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

        // Part of the region that lies inside the level, in level pixels
        let end_x = (origin_x + u64::from(width)).min(u64::from(info.width));
        let end_y = (origin_y + u64::from(height)).min(u64::from(info.height));
        if origin_x >= end_x || origin_y >= end_y {
            return Ok(canvas);
        }

        let tile_w = u64::from(info.tile_width.max(1));
        let tile_h = u64::from(info.tile_height.max(1));

        for tile_y in origin_y / tile_h..=(end_y - 1) / tile_h {
            for tile_x in origin_x / tile_w..=(end_x - 1) / tile_w {
                let tile = self
                    .read_source_tile(level, tile_x as u32, tile_y as u32)
                    .await?;

                let tile_x0 = tile_x * tile_w;
                let tile_y0 = tile_y * tile_h;
                let x0 = origin_x.max(tile_x0);
                let x1 = end_x.min(tile_x0 + u64::from(tile.width()));
                let y0 = origin_y.max(tile_y0);
                let y1 = end_y.min(tile_y0 + u64::from(tile.height()));
                if x0 >= x1 || y0 >= y1 {
                    continue;
                }

                copy_rows(
                    &tile,
                    (x0 - tile_x0, y0 - tile_y0),
                    &mut canvas,
                    (x0 - origin_x, y0 - origin_y),
                    ((x1 - x0) as usize, (y1 - y0) as usize),
                );
            }
        }

        Ok(canvas)
    }
}

/// Copy a `size` block of pixels from `src` at `from` into `dst` at `to`.
fn copy_rows(
    src: &RgbImage,
    from: (u64, u64),
    dst: &mut RgbImage,
    to: (u64, u64),
    size: (usize, usize),
) {
    const CHANNELS: usize = 3;
    let src_stride = src.width() as usize * CHANNELS;
    let dst_stride = dst.width() as usize * CHANNELS;
    let row_len = size.0 * CHANNELS;

    let src_buf = src.as_raw();
    let dst_buf: &mut [u8] = dst;

    for row in 0..size.1 {
        let s = (from.1 as usize + row) * src_stride + from.0 as usize * CHANNELS;
        let d = (to.1 as usize + row) * dst_stride + to.0 as usize * CHANNELS;
        dst_buf[d..d + row_len].copy_from_slice(&src_buf[s..s + row_len]);
    }
}
