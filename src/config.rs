//! Reader configuration and command-line arguments.
//!
//! [`ReaderConfig`] holds everything the library needs to turn a slide into
//! pyramids; [`Cli`] is the `wsi-hed` binary's argument parser, whose shared
//! [`SlideArgs`] convert into a `ReaderConfig`.
//!
//! # Environment Variables
//!
//! - `HED_TILE_SIZE` - Deep Zoom tile size (default: 512)
//! - `HED_THRESHOLD` - Hematoxylin threshold for the mask (default: 0.05)
//! - `HED_CONCURRENCY` - Concurrent tile operations (default: available cores)
//! - `HED_LEVEL_ORDER` - `finest-first` (default) or `coarsest-first`

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::graph::DEFAULT_RESULT_CACHE_CAPACITY;
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::stain::{StainMatrix, HED_FROM_RGB};
use crate::tile::DEFAULT_TILE_CACHE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Deep Zoom tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Deep Zoom tile overlap in pixels.
pub const DEFAULT_OVERLAP: u32 = 0;

/// Hematoxylin intensity above which a pixel is mask-positive.
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Concurrency used when the platform cannot report its parallelism.
const FALLBACK_CONCURRENCY: usize = 4;

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_CONCURRENCY)
}

// =============================================================================
// Library Configuration
// =============================================================================

/// Order of levels in the returned pyramids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LevelOrder {
    /// Full resolution first, the order levels are visited in
    #[default]
    FinestFirst,
    /// Lowest resolution first
    CoarsestFirst,
}

/// Stain separation parameters for the mask pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct StainParams {
    pub matrix: StainMatrix,
    /// Hematoxylin intensity strictly above which a pixel is positive
    pub threshold: f64,
}

impl Default for StainParams {
    fn default() -> Self {
        Self {
            matrix: HED_FROM_RGB,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Everything needed to open a slide and assemble its pyramids.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub tile_size: u32,
    pub overlap: u32,
    /// Restrict Deep Zoom levels to the slide's recorded tissue bounds
    pub limit_bounds: bool,
    pub level_order: LevelOrder,
    /// Maximum tile operations running at once
    pub concurrency: usize,
    /// Budget of the decoded source-tile cache, in bytes
    pub tile_cache_bytes: usize,
    /// Budget of computed raw and mask tiles kept by the executor, in bytes
    pub result_cache_bytes: usize,
    pub block_size: usize,
    pub cache_blocks: usize,
    pub stain: StainParams,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            overlap: DEFAULT_OVERLAP,
            limit_bounds: true,
            level_order: LevelOrder::default(),
            concurrency: default_concurrency(),
            tile_cache_bytes: DEFAULT_TILE_CACHE_CAPACITY,
            result_cache_bytes: DEFAULT_RESULT_CACHE_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_BLOCK_CACHE_CAPACITY,
            stain: StainParams::default(),
        }
    }
}

impl ReaderConfig {
    /// Check the configuration and describe the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.overlap * 2 >= self.tile_size {
            return Err(format!(
                "overlap ({}) must be less than half the tile size ({})",
                self.overlap, self.tile_size
            ));
        }
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if self.block_size == 0 {
            return Err("block_size must be greater than 0".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if !self.stain.threshold.is_finite() {
            return Err("threshold must be a finite number".to_string());
        }
        if self.stain.matrix.iter().flatten().any(|v| !v.is_finite()) {
            return Err("stain matrix must contain only finite numbers".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-hed - RGB and hematoxylin-mask pyramids from Aperio SVS slides.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-hed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the pyramid layout and layer options of a slide
    Inspect(SlideArgs),

    /// Compute part of one pyramid level and write raw.png and mask.png
    Render(RenderArgs),
}

impl Command {
    pub fn slide_args(&self) -> &SlideArgs {
        match self {
            Command::Inspect(args) => args,
            Command::Render(render) => &render.slide,
        }
    }
}

/// Arguments shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SlideArgs {
    /// Path to an Aperio .svs file
    pub path: PathBuf,

    /// Deep Zoom tile size in pixels
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "HED_TILE_SIZE")]
    pub tile_size: u32,

    /// Hematoxylin threshold for the mask
    #[arg(long, default_value_t = DEFAULT_THRESHOLD, env = "HED_THRESHOLD")]
    pub threshold: f64,

    /// Concurrent tile operations (defaults to the number of cores)
    #[arg(long, env = "HED_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Order of the output levels
    #[arg(long, value_enum, default_value_t = LevelOrder::FinestFirst, env = "HED_LEVEL_ORDER")]
    pub order: LevelOrder,

    /// Enable verbose logging (debug level)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SlideArgs {
    pub fn reader_config(&self) -> ReaderConfig {
        let defaults = ReaderConfig::default();
        ReaderConfig {
            tile_size: self.tile_size,
            level_order: self.order,
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            stain: StainParams {
                threshold: self.threshold,
                ..defaults.stain.clone()
            },
            ..defaults
        }
    }
}

/// Arguments of `wsi-hed render`.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub slide: SlideArgs,

    /// Directory receiving raw.png and mask.png
    #[arg(short, long)]
    pub output: PathBuf,

    /// Index into the output pyramids (default: the coarsest level)
    #[arg(long)]
    pub index: Option<usize>,

    /// Region to compute as X,Y,W,H in level pixels (default: whole level)
    #[arg(long, value_parser = parse_region)]
    pub region: Option<Region>,
}

impl RenderArgs {
    /// Output index to render among `count` levels: `--index` when given and
    /// in range, otherwise the coarsest level under the configured order.
    pub fn level_index(&self, count: usize) -> Option<usize> {
        match self.index {
            Some(index) => (index < count).then_some(index),
            None if count == 0 => None,
            None => Some(match self.slide.order {
                LevelOrder::FinestFirst => count - 1,
                LevelOrder::CoarsestFirst => 0,
            }),
        }
    }
}

/// Rectangle in pixels of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Parse `X,Y,W,H`.
pub fn parse_region(s: &str) -> Result<Region, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid region '{s}': {e}"))?;

    match parts.as_slice() {
        [x, y, width, height] if *width > 0 && *height > 0 => Ok(Region {
            x: *x,
            y: *y,
            width: *width,
            height: *height,
        }),
        [_, _, _, _] => Err(format!("region '{s}' must have a non-zero size")),
        _ => Err(format!("region '{s}' must be X,Y,W,H")),
    }
}

// =============================================================================
// Tests
// =============================================================================
