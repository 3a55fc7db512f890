//! Pyramid assembly over synthetic tile sources.

use std::sync::Arc;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use ndarray::s;

use wsi_hed::config::{LevelOrder, ReaderConfig};
use wsi_hed::error::TileError;
use wsi_hed::graph::Executor;
use wsi_hed::pyramid::{PyramidAssembler, Pyramids};
use wsi_hed::slide::SlideSource;
use wsi_hed::stain::{separate_stains, HED_FROM_RGB};

use super::test_utils::SyntheticSource;

async fn assemble(
    source: &Arc<SyntheticSource>,
    config: &ReaderConfig,
    executor: &Executor,
) -> Pyramids {
    let dyn_source: Arc<dyn SlideSource> = source.clone();
    PyramidAssembler::new(dyn_source, config)
        .assemble(executor)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_three_level_scenario() {
    let source = Arc::new(SyntheticSource::new(vec![(1, 1), (3, 1), (5, 5)], 512));
    let executor = Executor::new(4);
    let pyramids = assemble(&source, &ReaderConfig::default(), &executor).await;

    assert_eq!(pyramids.len(), 1);
    assert_eq!(pyramids.mask.len(), 1);
    assert_eq!(pyramids.levels, vec![2]);
    assert_eq!(pyramids.raw[0].shape(), [2048, 2048, 3]);
    assert_eq!(pyramids.mask[0].shape(), [2048, 2048, 3]);
    assert_eq!(pyramids.raw[0].num_blocks(), (4, 4));

    // Assembly only evaluates the sample tile
    assert_eq!(source.total_fetches(), 1);

    let mask = pyramids.mask[0].compute(&executor).await.unwrap();
    assert_eq!(mask.dim(), (2048, 2048, 3));
    assert!(mask.slice(s![.., .., 0]).iter().all(|&v| v == 0 || v == 255));
    assert!(mask.slice(s![.., .., 1..]).iter().all(|&v| v == 0));
    assert!(mask.slice(s![.., .., 0]).iter().any(|&v| v == 255));
}

#[tokio::test]
async fn test_skip_rule_and_tile_multiples() {
    let grids = vec![(2, 2), (1, 4), (3, 3), (4, 1), (2, 5), (1, 1)];
    let expected = grids.iter().filter(|(x, y)| *x > 1 && *y > 1).count();

    let source = Arc::new(SyntheticSource::new(grids, 16));
    let config = ReaderConfig {
        tile_size: 16,
        ..ReaderConfig::default()
    };
    let pyramids = assemble(&source, &config, &Executor::new(2)).await;

    assert_eq!(pyramids.len(), expected);
    assert_eq!(pyramids.levels, vec![4, 2, 0]);
    for (raw, mask) in pyramids.raw.iter().zip(&pyramids.mask) {
        assert_eq!(raw.shape(), mask.shape());
        assert_eq!(raw.shape()[0] % 16, 0);
        assert_eq!(raw.shape()[1] % 16, 0);
    }
    // (2, 5) keeps 1 x 4 tiles
    assert_eq!(pyramids.raw[0].shape(), [16, 64, 3]);
    assert_eq!(pyramids.raw[1].shape(), [32, 32, 3]);
    assert_eq!(pyramids.raw[2].shape(), [16, 16, 3]);
}

#[tokio::test]
async fn test_coarsest_first_order() {
    let source = Arc::new(SyntheticSource::new(vec![(2, 2), (3, 3), (5, 5)], 8));
    let config = ReaderConfig {
        tile_size: 8,
        level_order: LevelOrder::CoarsestFirst,
        ..ReaderConfig::default()
    };
    let pyramids = assemble(&source, &config, &Executor::new(2)).await;

    assert_eq!(pyramids.levels, vec![0, 1, 2]);
    assert_eq!(pyramids.raw[0].shape(), [8, 8, 3]);
    assert_eq!(pyramids.raw[2].shape(), [32, 32, 3]);
}

#[tokio::test]
async fn test_raw_pixels_use_x_y_layout() {
    let source = Arc::new(SyntheticSource::new(vec![(3, 4)], 32));
    let config = ReaderConfig {
        tile_size: 32,
        ..ReaderConfig::default()
    };
    let executor = Executor::new(4);
    let pyramids = assemble(&source, &config, &executor).await;

    let raw = pyramids.raw[0].compute(&executor).await.unwrap();
    assert_eq!(raw.dim(), (64, 96, 3));
    for (x, y) in [(0, 0), (5, 70), (63, 1), (40, 95), (33, 33)] {
        let expected = source.colour_at(x as u32, y as u32);
        assert_eq!(
            [raw[[x, y, 0]], raw[[x, y, 1]], raw[[x, y, 2]]],
            expected,
            "pixel ({x}, {y})"
        );
    }
}

#[tokio::test]
async fn test_mask_thresholds_finest_level_only() {
    let source = Arc::new(SyntheticSource::new(vec![(2, 2), (3, 3)], 32));
    let config = ReaderConfig {
        tile_size: 32,
        ..ReaderConfig::default()
    };
    let executor = Executor::new(4);
    let pyramids = assemble(&source, &config, &executor).await;
    assert_eq!(pyramids.levels, vec![1, 0]);

    let raw = pyramids.raw[0].compute(&executor).await.unwrap();
    let mask = pyramids.mask[0].compute(&executor).await.unwrap();
    let stains = separate_stains(raw.mapv(|v| f64::from(v) / 255.0).view(), &HED_FROM_RGB).unwrap();

    let mut positives = 0;
    for ((x, y), &h) in stains.slice(s![.., .., 0]).indexed_iter() {
        let expected = if h > 0.05 { 255 } else { 0 };
        assert_eq!(mask[[x, y, 0]], expected, "pixel ({x}, {y}) with H = {h}");
        assert_eq!(mask[[x, y, 1]], 0);
        assert_eq!(mask[[x, y, 2]], 0);
        positives += usize::from(expected == 255);
    }
    assert!(positives > 0 && positives < 64 * 64);

    // The coarse level has purple pixels but an empty mask
    let coarse_raw = pyramids.raw[1].compute(&executor).await.unwrap();
    let coarse_mask = pyramids.mask[1].compute(&executor).await.unwrap();
    assert!(coarse_raw.iter().any(|&v| v != 255));
    assert!(coarse_mask.iter().all(|&v| v == 0));
}

#[tokio::test]
async fn test_each_tile_is_fetched_once() {
    let source = Arc::new(SyntheticSource::new(vec![(2, 2), (3, 3)], 16));
    let config = ReaderConfig {
        tile_size: 16,
        ..ReaderConfig::default()
    };
    let executor = Executor::new(3);
    let pyramids = assemble(&source, &config, &executor).await;

    for (raw, mask) in pyramids.raw.iter().zip(&pyramids.mask) {
        mask.compute(&executor).await.unwrap();
        raw.compute(&executor).await.unwrap();
        mask.compute(&executor).await.unwrap();
    }

    // 2 x 2 tiles of level 1 and 1 tile of level 0
    assert_eq!(source.total_fetches(), 5);
    assert_eq!(source.max_fetches_per_tile(), 1);
    // One fetch and one mask operation per tile
    assert_eq!(executor.ops_run(), 10);
    assert!(executor.peak_in_flight() <= 3);
}

#[tokio::test]
async fn test_panning_keeps_cached_tiles_within_budget() {
    let source = Arc::new(SyntheticSource::new(vec![(2, 2), (9, 9)], 32));
    let config = ReaderConfig {
        tile_size: 32,
        ..ReaderConfig::default()
    };
    // Four raw and four mask tiles of 32 x 32 x 3
    let budget = 8 * 32 * 32 * 3;
    let executor = Executor::with_cache_capacity(4, budget);
    let pyramids = assemble(&source, &config, &executor).await;

    let finest = pyramids.levels.iter().position(|&l| l == 1).unwrap();
    assert_eq!(pyramids.raw[finest].shape(), [256, 256, 3]);

    for bx in 0..8 {
        for by in 0..8 {
            let x = bx * 32..(bx + 1) * 32;
            let y = by * 32..(by + 1) * 32;
            let mask = pyramids.mask[finest]
                .compute_region(x.clone(), y.clone(), &executor)
                .await
                .unwrap();
            let raw = pyramids.raw[finest]
                .compute_region(x, y, &executor)
                .await
                .unwrap();
            assert_eq!(mask.dim(), raw.dim());
            assert!(executor.cached_bytes() <= budget);
        }
    }

    assert!(executor.cached_bytes() <= budget);
    assert!(executor.cached_tiles() <= 8);
    assert_eq!(executor.pending_evaluations(), 0);
    // 64 finest tiles plus the coarse level's sample, each fetched once
    assert_eq!(source.total_fetches(), 65);
    assert_eq!(source.max_fetches_per_tile(), 1);
}

/// Tile (1, 0) of a 3 x 3 grid is narrower than the others.
struct IrregularSource;

#[async_trait]
impl SlideSource for IrregularSource {
    fn level_count(&self) -> usize {
        1
    }

    fn level_dimensions(&self, _level: usize) -> Option<(u32, u32)> {
        Some((24, 24))
    }

    fn level_tiles(&self, _level: usize) -> Option<(u32, u32)> {
        Some((3, 3))
    }

    fn tile_size(&self) -> u32 {
        8
    }

    async fn get_tile(&self, _level: usize, col: u32, _row: u32) -> Result<RgbImage, TileError> {
        let width = if col == 1 { 6 } else { 8 };
        Ok(RgbImage::from_pixel(width, 8, Rgb([255, 255, 255])))
    }
}

#[tokio::test]
async fn test_declared_shape_mismatch_is_reported() {
    let config = ReaderConfig {
        tile_size: 8,
        ..ReaderConfig::default()
    };
    let executor = Executor::new(2);
    let pyramids = PyramidAssembler::new(Arc::new(IrregularSource), &config)
        .assemble(&executor)
        .await
        .unwrap();

    // Declared from the (0, 0) sample
    assert_eq!(pyramids.raw[0].shape(), [16, 16, 3]);

    let first_column = pyramids.raw[0]
        .compute_region(0..8, 0..16, &executor)
        .await
        .unwrap();
    assert_eq!(first_column.dim(), (8, 16, 3));

    assert!(matches!(
        pyramids.raw[0].compute(&executor).await,
        Err(TileError::ShapeMismatch {
            expected: [8, 8, 3],
            actual: [6, 8, 3],
        })
    ));
}

#[tokio::test]
async fn test_source_errors_surface() {
    struct Failing;

    #[async_trait]
    impl SlideSource for Failing {
        fn level_count(&self) -> usize {
            1
        }

        fn level_dimensions(&self, _level: usize) -> Option<(u32, u32)> {
            Some((16, 16))
        }

        fn level_tiles(&self, _level: usize) -> Option<(u32, u32)> {
            Some((2, 2))
        }

        fn tile_size(&self) -> u32 {
            8
        }

        async fn get_tile(&self, _level: usize, _col: u32, _row: u32) -> Result<RgbImage, TileError> {
            Err(TileError::DecodeError {
                message: "corrupt tile".to_string(),
            })
        }
    }

    let result = PyramidAssembler::new(Arc::new(Failing), &ReaderConfig::default())
        .assemble(&Executor::new(1))
        .await;
    assert!(matches!(result, Err(TileError::DecodeError { .. })));
}
