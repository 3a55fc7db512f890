//! Assembly of the raw and mask pyramids.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{LevelOrder, ReaderConfig, StainParams};
use crate::error::TileError;
use crate::graph::{Executor, LazyArray, TaskGraph};
use crate::slide::SlideSource;

/// The two pyramids of one slide.
#[derive(Debug, Clone)]
pub struct Pyramids {
    pub raw: Vec<LazyArray>,
    pub mask: Vec<LazyArray>,
    /// Source level behind each entry of `raw` and `mask`
    pub levels: Vec<usize>,
}

impl Pyramids {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Builds one raw and one mask [`LazyArray`] per usable level.
pub struct PyramidAssembler {
    source: Arc<dyn SlideSource>,
    params: Arc<StainParams>,
    order: LevelOrder,
}

impl PyramidAssembler {
    pub fn new(source: Arc<dyn SlideSource>, config: &ReaderConfig) -> Self {
        Self {
            source,
            params: Arc::new(config.stain.clone()),
            order: config.level_order,
        }
    }

    /// Build both pyramids.
    ///
    /// Levels one tile wide or tall are skipped. The last row and column
    /// of tiles are left out. Only the `(0, 0)` tile of each level is
    /// computed here; its shape is declared for every other tile.
    pub async fn assemble(&self, executor: &Executor) -> Result<Pyramids, TileError> {
        let num_levels = self.source.level_count();
        let mut graph = TaskGraph::new();
        let mut pyramids = Pyramids {
            raw: Vec::new(),
            mask: Vec::new(),
            levels: Vec::new(),
        };

        for level in (0..num_levels).rev() {
            let invalid = || TileError::InvalidLevel {
                level,
                max_levels: num_levels,
            };
            let (width, height) = self.source.level_dimensions(level).ok_or_else(invalid)?;
            let (tiles_x, tiles_y) = self.source.level_tiles(level).ok_or_else(invalid)?;

            if tiles_x <= 1 || tiles_y <= 1 {
                info!("Ignoring level {} with dimensions ({}, {})", level, width, height);
                continue;
            }
            info!("Reading level {} with dimensions ({}, {})", level, width, height);

            let sample = executor
                .compute(&graph.fetch(&self.source, level, 0, 0))
                .await?;
            let shape: [usize; 3] = sample.dim().into();

            let mut raw_strips = Vec::with_capacity(tiles_x as usize - 1);
            let mut mask_strips = Vec::with_capacity(tiles_x as usize - 1);
            for col in 0..tiles_x - 1 {
                let mut raw_tiles = Vec::with_capacity(tiles_y as usize - 1);
                let mut mask_tiles = Vec::with_capacity(tiles_y as usize - 1);
                for row in 0..tiles_y - 1 {
                    let raw = graph.fetch(&self.source, level, col, row);
                    let mask = graph.mask(&raw, num_levels, &self.params);
                    raw_tiles.push(LazyArray::from_delayed(raw, shape));
                    mask_tiles.push(LazyArray::from_delayed(mask, shape));
                }
                raw_strips.push(LazyArray::concatenate(&raw_tiles, 1)?);
                mask_strips.push(LazyArray::concatenate(&mask_tiles, 1)?);
            }

            pyramids.raw.push(LazyArray::concatenate(&raw_strips, 0)?);
            pyramids.mask.push(LazyArray::concatenate(&mask_strips, 0)?);
            pyramids.levels.push(level);
        }

        if pyramids.is_empty() {
            warn!(levels = num_levels, "No level is more than one tile wide and tall");
        }

        if self.order == LevelOrder::CoarsestFirst {
            pyramids.raw.reverse();
            pyramids.mask.reverse();
            pyramids.levels.reverse();
        }

        Ok(pyramids)
    }
}
