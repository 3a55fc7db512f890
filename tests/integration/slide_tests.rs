//! Slide opening, region reads and Deep Zoom tiling.

use std::sync::Arc;

use wsi_hed::config::ReaderConfig;
use wsi_hed::error::{FormatError, IoError, TiffError};
use wsi_hed::format::jpeg::is_complete_stream;
use wsi_hed::format::{detect_format, SlideFormat, SvsReader};
use wsi_hed::io::BlockCache;
use wsi_hed::slide::{DeepZoomGenerator, SlideReader, SlideSource, WholeSlide};
use wsi_hed::tile::JpegTileDecoder;

use super::test_utils::{
    create_two_level_svs, split_tile, write_temp_file, MemoryReader, SvsBuilder, PURPLE, WHITE,
};

fn is_purple(px: [u8; 3]) -> bool {
    px[0].abs_diff(PURPLE[0]) < 25 && px[2].abs_diff(PURPLE[2]) < 25
}

fn is_white(px: [u8; 3]) -> bool {
    px.iter().all(|&v| v > 230)
}

async fn open_memory(data: Vec<u8>) -> WholeSlide<MemoryReader, SvsReader> {
    let reader = MemoryReader::new(data, "memory://slide.svs");
    assert_eq!(detect_format(&reader).await.unwrap(), SlideFormat::AperioSvs);
    let svs = SvsReader::open(&reader).await.unwrap();
    WholeSlide::from_parts(reader, svs, 16 * 1024 * 1024)
}

#[tokio::test]
async fn test_svs_levels_and_metadata() {
    let slide = open_memory(create_two_level_svs(false)).await;
    let svs = slide.slide();

    assert_eq!(svs.level_count(), 2);
    assert_eq!(svs.level_dimensions(0), Some((2048, 2048)));
    assert_eq!(svs.level_dimensions(1), Some((512, 512)));
    assert_eq!(svs.tile_count(0), Some((8, 8)));
    assert_eq!(svs.level_downsample(1), Some(4.0));
    assert_eq!(svs.best_level_for_downsample(2.0), Some(0));
    assert_eq!(svs.best_level_for_downsample(6.0), Some(1));
    assert!(svs.bounds().is_none());

    assert_eq!(svs.metadata().mpp, Some(0.499));
    assert_eq!(svs.metadata().magnification, Some(20.0));
}

#[tokio::test]
async fn test_jpeg_tables_are_merged() {
    let slide = open_memory(create_two_level_svs(true)).await;

    let raw = slide.slide().read_raw_tile(slide.reader(), 0, 3, 2).await.unwrap();
    assert!(!is_complete_stream(&raw));

    let jpeg = slide.slide().read_tile(slide.reader(), 0, 3, 2).await.unwrap();
    let tile = JpegTileDecoder::new().decode(&jpeg).unwrap();
    assert_eq!(tile.dimensions(), (256, 256));
    assert!(is_purple(tile.get_pixel(20, 40).0));
    assert!(is_white(tile.get_pixel(220, 40).0));
}

#[tokio::test]
async fn test_region_read_across_tiles() {
    let slide = open_memory(create_two_level_svs(false)).await;

    // x = 240..272 crosses from the white half of tile 0 into tile 1
    let region = slide.read_region(240, 100, 0, 32, 8).await.unwrap();
    assert_eq!(region.dimensions(), (32, 8));
    assert!(is_white(region.get_pixel(4, 4).0));
    assert!(is_purple(region.get_pixel(28, 4).0));

    // Level 1 origin is given in level-0 pixels
    let region = slide.read_region(1024 + 40, 0, 1, 4, 4).await.unwrap();
    assert!(is_purple(region.get_pixel(0, 0).0));
}

#[tokio::test]
async fn test_irregular_downsample_levels_are_kept() {
    let data = SvsBuilder::new()
        .level(2304, 2304, 256, split_tile(256, PURPLE, WHITE))
        .level(768, 768, 256, split_tile(256, PURPLE, WHITE))
        .level(256, 256, 256, split_tile(256, PURPLE, WHITE))
        .build();
    let slide = open_memory(data).await;
    let svs = slide.slide();

    assert_eq!(svs.level_count(), 3);
    assert_eq!(svs.level_downsample(1), Some(3.0));
    assert_eq!(svs.level_downsample(2), Some(9.0));
    assert_eq!(svs.best_level_for_downsample(4.0), Some(1));
    assert_eq!(svs.best_level_for_downsample(2.0), Some(0));

    let region = slide.read_region(0, 0, 1, 16, 16).await.unwrap();
    assert!(is_purple(region.get_pixel(8, 8).0));
}

#[tokio::test]
async fn test_non_aperio_tiff_is_rejected() {
    let data = SvsBuilder::new()
        .with_vendor("Generic pyramidal TIFF")
        .level(512, 512, 256, split_tile(256, WHITE, WHITE))
        .build();
    let reader = MemoryReader::new(data, "memory://plain.tif");

    assert!(matches!(
        detect_format(&reader).await,
        Err(FormatError::UnsupportedFormat { .. })
    ));

    let not_tiff = MemoryReader::new(b"%PDF-1.7 not a slide".to_vec(), "memory://x");
    assert!(matches!(
        detect_format(&not_tiff).await,
        Err(FormatError::UnsupportedFormat { .. })
    ));
}

#[tokio::test]
async fn test_non_jpeg_levels_are_rejected() {
    let data = SvsBuilder::new()
        .with_compression(5)
        .level(512, 512, 256, split_tile(256, WHITE, WHITE))
        .build();
    let reader = MemoryReader::new(data, "memory://lzw.svs");

    assert!(matches!(
        SvsReader::open(&reader).await,
        Err(TiffError::UnsupportedCompression(_))
    ));
}

#[tokio::test]
async fn test_block_cache_limits_requests() {
    let data = create_two_level_svs(false);
    let reader = BlockCache::with_capacity(MemoryReader::new(data, "memory://s"), 64 * 1024, 64);
    let svs = SvsReader::open(&reader).await.unwrap();
    let opened = reader.inner().request_count();

    let slide = WholeSlide::from_parts(reader, svs, 0);
    for x in 0..4 {
        slide.read_source_tile(0, x, 0).await.unwrap();
    }
    // Every tile shares one stored stream, already in a cached block
    assert!(slide.reader().inner().request_count() <= opened + 1);
}

#[tokio::test]
async fn test_deep_zoom_over_svs() {
    let slide = Arc::new(open_memory(create_two_level_svs(false)).await);
    let dz = DeepZoomGenerator::new(slide, 512, 0, true).unwrap();

    assert_eq!(dz.level_count(), 12);
    assert_eq!(dz.level_dimensions(11), Some((2048, 2048)));
    assert_eq!(dz.level_tiles(11), Some((4, 4)));
    assert_eq!(dz.level_tiles(10), Some((2, 2)));
    assert_eq!(dz.level_tiles(9), Some((1, 1)));
    assert_eq!(dz.slide_level(11), Some(0));
    assert_eq!(dz.slide_level(9), Some(1));

    let tile = dz.get_tile(11, 1, 1).await.unwrap();
    assert_eq!(tile.dimensions(), (512, 512));
    assert!(is_purple(tile.get_pixel(10, 10).0));
    assert!(is_white(tile.get_pixel(200, 10).0));
    assert!(is_purple(tile.get_pixel(266, 10).0));

    // Downsample 2 is resampled from level 0
    let tile = dz.get_tile(10, 0, 0).await.unwrap();
    assert_eq!(tile.dimensions(), (512, 512));
    assert!(is_purple(tile.get_pixel(20, 20).0));
    assert!(is_white(tile.get_pixel(100, 20).0));
}

#[tokio::test]
async fn test_open_from_file() {
    let path = write_temp_file("two-level.svs", &create_two_level_svs(true));
    let slide = WholeSlide::open(&path, &ReaderConfig::default()).await.unwrap();
    assert_eq!(slide.slide().dimensions(), Some((2048, 2048)));

    let missing = WholeSlide::open("/nonexistent/slide.svs", &ReaderConfig::default()).await;
    assert!(matches!(
        missing,
        Err(FormatError::Io(IoError::NotFound(_)))
    ));
}
