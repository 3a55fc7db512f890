//! End-to-end reads of SVS files into layers.

use ndarray::s;

use wsi_hed::config::{LevelOrder, ReaderConfig};
use wsi_hed::error::{FormatError, ReadError};
use wsi_hed::plugin::{get_reader, read_function, LayerOptions, LayerType, ReadTarget, SvsHedReader};
use wsi_hed::tile::MASK_POSITIVE;

use super::test_utils::{create_two_level_svs, split_tile, write_temp_file, SvsBuilder, WHITE};

#[tokio::test]
async fn test_reader_selection_by_path() {
    let path = write_temp_file("selected.svs", &create_two_level_svs(false));
    let target = ReadTarget::from(path.to_string_lossy().into_owned());
    assert!(get_reader(&target).is_some());

    let tif = write_temp_file("selected.tif", &create_two_level_svs(false));
    assert!(get_reader(&ReadTarget::from(tif.to_string_lossy().into_owned())).is_none());
}

#[tokio::test]
async fn test_read_produces_raw_and_mask_layers() {
    for jpeg_tables in [false, true] {
        let path = write_temp_file("slide.svs", &create_two_level_svs(jpeg_tables));
        let layers = read_function(&path).await.unwrap();

        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].options, LayerOptions::raw());
        assert_eq!(layers[1].options, LayerOptions::mask());
        assert_eq!(layers[1].options.name.as_deref(), Some("label"));
        assert!(layers.iter().all(|l| l.layer_type == LayerType::Image));

        let raw = &layers[0].data;
        let mask = &layers[1].data;
        assert_eq!(raw.len(), mask.len());
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].shape(), [1536, 1536, 3]);
        assert_eq!(raw[1].shape(), [512, 512, 3]);
        for (r, m) in raw.iter().zip(mask) {
            assert_eq!(r.shape(), m.shape());
            assert_eq!(r.shape()[0] % 512, 0);
            assert_eq!(r.shape()[1] % 512, 0);
        }
    }
}

#[tokio::test]
async fn test_finest_mask_marks_stained_pixels() {
    let path = write_temp_file("stained.svs", &create_two_level_svs(true));
    let reader = SvsHedReader::default();
    let layers = reader.read(&path).await.unwrap();
    let executor = reader.executor();

    let mask = layers[1].data[0]
        .compute_region(0..512, 0..64, executor)
        .await
        .unwrap();
    assert_eq!(mask.dim(), (512, 64, 3));
    assert!(mask.iter().all(|&v| v == 0 || v == MASK_POSITIVE));
    assert!(mask.slice(s![.., .., 1..]).iter().all(|&v| v == 0));

    // Each 256 px source tile is purple on its left half
    assert_eq!(mask[[10, 30, 0]], MASK_POSITIVE);
    assert_eq!(mask[[200, 30, 0]], 0);
    assert_eq!(mask[[266, 30, 0]], MASK_POSITIVE);
    assert_eq!(mask[[450, 30, 0]], 0);

    let raw = layers[0].data[0]
        .compute_region(0..512, 0..64, executor)
        .await
        .unwrap();
    assert!(raw[[200, 30, 0]] > 230);
    assert!(raw[[10, 30, 2]] > raw[[10, 30, 0]]);
}

#[tokio::test]
async fn test_coarse_mask_is_empty() {
    let path = write_temp_file("coarse.svs", &create_two_level_svs(false));
    let reader = SvsHedReader::default();
    let layers = reader.read(&path).await.unwrap();

    let coarse_raw = layers[0].data[1].compute(reader.executor()).await.unwrap();
    let coarse_mask = layers[1].data[1].compute(reader.executor()).await.unwrap();
    assert!(coarse_raw.iter().any(|&v| v < 200));
    assert!(coarse_mask.iter().all(|&v| v == 0));
}

#[tokio::test]
async fn test_coarsest_first_config() {
    let path = write_temp_file("ordered.svs", &create_two_level_svs(false));
    let reader = SvsHedReader::new(ReaderConfig {
        level_order: LevelOrder::CoarsestFirst,
        ..ReaderConfig::default()
    });
    let layers = reader.read(&path).await.unwrap();

    assert_eq!(layers[0].data[0].shape(), [512, 512, 3]);
    assert_eq!(layers[0].data[1].shape(), [1536, 1536, 3]);
}

#[tokio::test]
async fn test_non_aperio_file_is_rejected() {
    let data = SvsBuilder::new()
        .with_vendor("Generic pyramidal TIFF")
        .level(512, 512, 256, split_tile(256, WHITE, WHITE))
        .build();
    let path = write_temp_file("generic.svs", &data);

    assert!(matches!(
        read_function(&path).await,
        Err(ReadError::Format(FormatError::UnsupportedFormat { .. }))
    ));
}
