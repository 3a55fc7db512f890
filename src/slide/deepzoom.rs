//! Deep Zoom tiling over a whole-slide image.
//!
//! Deep Zoom level 0 is a single pixel and every following level doubles
//! the resolution until the last level matches the slide's level 0. Each
//! Deep Zoom tile is read from the slide level closest in resolution
//! without being coarser, then resampled to its exact Deep Zoom size.

use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::debug;

use crate::error::TileError;
use crate::format::SvsReader;
use crate::io::RangeReader;

use super::reader::SlideReader;
use super::source::SlideSource;
use super::wsi::WholeSlide;

/// Where one Deep Zoom tile comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileInfo {
    /// Region origin in level-0 pixels
    pub l0_location: (u64, u64),
    pub slide_level: usize,
    /// Region size in pixels of `slide_level`
    pub l_size: (u32, u32),
    /// Final tile size in Deep Zoom pixels
    pub z_size: (u32, u32),
}

/// Deep Zoom view of a [`WholeSlide`].
pub struct DeepZoomGenerator<R, S = SvsReader> {
    slide: Arc<WholeSlide<R, S>>,
    tile_size: u32,
    overlap: u32,
    l0_offset: (f64, f64),
    /// Active dimensions of every slide level
    l_dimensions: Vec<(u32, u32)>,
    z_dimensions: Vec<(u32, u32)>,
    t_dimensions: Vec<(u32, u32)>,
    slide_from_dz_level: Vec<usize>,
    l0_l_downsamples: Vec<f64>,
    l_z_downsamples: Vec<f64>,
}

impl<R: RangeReader, S: SlideReader> DeepZoomGenerator<R, S> {
    /// Build the Deep Zoom geometry.
    ///
    /// With `limit_bounds`, only the slide's recorded non-empty region is
    /// tiled; slides that record none are tiled in full.
    pub fn new(
        slide: Arc<WholeSlide<R, S>>,
        tile_size: u32,
        overlap: u32,
        limit_bounds: bool,
    ) -> Result<Self, TileError> {
        let reader = slide.slide();
        let level_count = reader.level_count();
        let no_levels = || TileError::InvalidLevel {
            level: 0,
            max_levels: level_count,
        };
        let tile_size = tile_size.max(1);

        let full: Vec<(u32, u32)> = (0..level_count)
            .map(|level| reader.level_dimensions(level).ok_or_else(no_levels))
            .collect::<Result<_, _>>()?;
        let l0 = *full.first().ok_or_else(no_levels)?;

        let (l0_offset, l_dimensions) = match reader.bounds().filter(|_| limit_bounds) {
            Some(bounds) => {
                let scale_x = f64::from(bounds.width) / f64::from(l0.0.max(1));
                let scale_y = f64::from(bounds.height) / f64::from(l0.1.max(1));
                let scaled = full
                    .iter()
                    .map(|&(w, h)| {
                        (
                            (f64::from(w) * scale_x).ceil() as u32,
                            (f64::from(h) * scale_y).ceil() as u32,
                        )
                    })
                    .collect();
                ((f64::from(bounds.x), f64::from(bounds.y)), scaled)
            }
            None => ((0.0, 0.0), full),
        };

        // Halve until 1x1, then put the smallest level first
        let mut z_size = l_dimensions[0];
        let mut z_dimensions = vec![z_size];
        while z_size.0 > 1 || z_size.1 > 1 {
            z_size = (z_size.0.div_ceil(2).max(1), z_size.1.div_ceil(2).max(1));
            z_dimensions.push(z_size);
        }
        z_dimensions.reverse();

        let t_dimensions = z_dimensions
            .iter()
            .map(|&(w, h)| (w.div_ceil(tile_size), h.div_ceil(tile_size)))
            .collect();

        let dz_levels = z_dimensions.len();
        let l0_z_downsamples: Vec<f64> = (0..dz_levels)
            .map(|level| 2f64.powi((dz_levels - level - 1) as i32))
            .collect();

        let slide_from_dz_level: Vec<usize> = l0_z_downsamples
            .iter()
            .map(|&d| reader.best_level_for_downsample(d).ok_or_else(no_levels))
            .collect::<Result<_, _>>()?;

        let l0_l_downsamples: Vec<f64> = (0..level_count)
            .map(|level| reader.level_downsample(level).ok_or_else(no_levels))
            .collect::<Result<_, _>>()?;

        let l_z_downsamples = l0_z_downsamples
            .iter()
            .zip(&slide_from_dz_level)
            .map(|(d, &level)| d / l0_l_downsamples[level])
            .collect();

        Ok(Self {
            slide,
            tile_size,
            overlap,
            l0_offset,
            l_dimensions,
            z_dimensions,
            t_dimensions,
            slide_from_dz_level,
            l0_l_downsamples,
            l_z_downsamples,
        })
    }

    pub fn slide(&self) -> &Arc<WholeSlide<R, S>> {
        &self.slide
    }

    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    /// Total number of tiles over all levels.
    pub fn tile_count(&self) -> u64 {
        self.t_dimensions
            .iter()
            .map(|&(x, y)| u64::from(x) * u64::from(y))
            .sum()
    }

    /// Slide level serving Deep Zoom `level`.
    pub fn slide_level(&self, level: usize) -> Option<usize> {
        self.slide_from_dz_level.get(level).copied()
    }

    /// Source region and output size of one tile.
    pub fn tile_info(&self, level: usize, col: u32, row: u32) -> Result<TileInfo, TileError> {
        let (t_lim, z_lim) = match (self.t_dimensions.get(level), self.z_dimensions.get(level)) {
            (Some(&t), Some(&z)) => (t, z),
            _ => {
                return Err(TileError::InvalidLevel {
                    level,
                    max_levels: self.z_dimensions.len(),
                })
            }
        };
        if col >= t_lim.0 || row >= t_lim.1 {
            return Err(TileError::TileOutOfBounds {
                level,
                x: col,
                y: row,
                max_x: t_lim.0,
                max_y: t_lim.1,
            });
        }

        let slide_level = self.slide_from_dz_level[level];
        let l_lim = self.l_dimensions[slide_level];
        let l_z_ds = self.l_z_downsamples[level];
        let l0_l_ds = self.l0_l_downsamples[slide_level];
        let ts = self.tile_size;

        let axis = |t: u32, t_lim: u32, z_lim: u32, l_lim: u32, l0_off: f64| {
            let overlap_tl = if t != 0 { self.overlap } else { 0 };
            let overlap_br = if t != t_lim - 1 { self.overlap } else { 0 };
            let z_size = ts.min(z_lim - ts * t) + overlap_tl + overlap_br;

            let l_location = l_z_ds * f64::from(ts * t - overlap_tl);
            let l0_location = (l0_l_ds * l_location + l0_off) as u64;
            let available = f64::from(l_lim) - l_location.ceil();
            let l_size = (l_z_ds * f64::from(z_size)).ceil().min(available).max(1.0) as u32;
            (l0_location, l_size, z_size)
        };

        let (x0, lw, zw) = axis(col, t_lim.0, z_lim.0, l_lim.0, self.l0_offset.0);
        let (y0, lh, zh) = axis(row, t_lim.1, z_lim.1, l_lim.1, self.l0_offset.1);

        Ok(TileInfo {
            l0_location: (x0, y0),
            slide_level,
            l_size: (lw, lh),
            z_size: (zw, zh),
        })
    }
}

#[async_trait]
impl<R, S> SlideSource for DeepZoomGenerator<R, S>
where
    R: RangeReader + 'static,
    S: SlideReader + 'static,
{
    fn level_count(&self) -> usize {
        self.z_dimensions.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.z_dimensions.get(level).copied()
    }

    fn level_tiles(&self, level: usize) -> Option<(u32, u32)> {
        self.t_dimensions.get(level).copied()
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    async fn get_tile(&self, level: usize, col: u32, row: u32) -> Result<RgbImage, TileError> {
        let info = self.tile_info(level, col, row)?;
        debug!(level, col, row, slide_level = info.slide_level, "Reading Deep Zoom tile");

        let region = self
            .slide
            .read_region(
                info.l0_location.0,
                info.l0_location.1,
                info.slide_level,
                info.l_size.0,
                info.l_size.1,
            )
            .await?;

        if region.dimensions() == info.z_size {
            return Ok(region);
        }

        let (width, height) = info.z_size;
        tokio::task::spawn_blocking(move || {
            imageops::resize(&region, width, height, FilterType::Lanczos3)
        })
        .await
        .map_err(|e| TileError::TaskFailed {
            message: e.to_string(),
        })
    }
}
