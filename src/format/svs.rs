//! Aperio SVS reader.
//!
//! SVS is a tiled TIFF with JPEG tiles stored as abbreviated streams, the
//! shared tables for each level living in its JPEGTables tag. Metadata is a
//! pipe-separated `key = value` list in the base level's ImageDescription:
//!
//! ```text
//! Aperio Image Library v10.0.51
//! 46920x33014 [0,100 46000x32914] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::slide::SlideReader;

use super::jpeg::prepare_tile_jpeg;
use super::tiff::{PyramidLevel, TiffHeader, TiffPyramid, TileData};

// =============================================================================
// SVS Metadata
// =============================================================================

/// Metadata parsed from the base level's ImageDescription.
#[derive(Debug, Clone, Default)]
pub struct SvsMetadata {
    /// Microns per pixel
    pub mpp: Option<f64>,
    /// Objective magnification
    pub magnification: Option<f64>,
    pub vendor: Option<String>,
    pub image_description: Option<String>,
    pub properties: HashMap<String, String>,
}

impl SvsMetadata {
    pub fn parse(description: &str) -> Self {
        let mut metadata = SvsMetadata {
            image_description: Some(description.to_string()),
            vendor: description.contains("Aperio").then(|| "Aperio".to_string()),
            ..Default::default()
        };

        for (key, value) in description
            .split('|')
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
        {
            match key {
                "MPP" => metadata.mpp = value.parse().ok(),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }
}

// =============================================================================
// SvsReader
// =============================================================================

/// One pyramid level with its tile locations loaded.
#[derive(Debug, Clone)]
pub struct SvsLevelData {
    pub level: PyramidLevel,
    pub tile_data: TileData,
}

impl SvsLevelData {
    pub fn get_tile_location(&self, tile_x: u32, tile_y: u32) -> Option<(u64, u64)> {
        self.tile_data
            .get_tile_location(self.level.tile_index(tile_x, tile_y)?)
    }
}

/// Parsed structure of an SVS file.
///
/// Holds no reader; every tile read takes the reader it should use.
/// Aperio files record no non-empty-region rectangle, so
/// [`SlideReader::bounds`] is always `None` and Deep Zoom tiles the full slide.
#[derive(Debug)]
pub struct SvsReader {
    header: TiffHeader,
    levels: Vec<SvsLevelData>,
    metadata: SvsMetadata,
}

impl SvsReader {
    /// Parse the pyramid and load tile offsets and JPEGTables for every level.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let pyramid = TiffPyramid::parse(reader).await?;
        if pyramid.levels.is_empty() {
            return Err(TiffError::MissingTag("TileWidth"));
        }

        let mut levels = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            let tile_data = TileData::load(reader, level, &pyramid.header).await?;
            debug!(
                level = level.level_index,
                width = level.width,
                height = level.height,
                tiles = tile_data.offsets.len(),
                "Loaded SVS level"
            );
            levels.push(SvsLevelData {
                level: level.clone(),
                tile_data,
            });
        }

        let metadata = pyramid.levels[0]
            .description
            .as_deref()
            .map(SvsMetadata::parse)
            .unwrap_or_default();

        Ok(SvsReader {
            header: pyramid.header,
            levels,
            metadata,
        })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    pub fn metadata(&self) -> &SvsMetadata {
        &self.metadata
    }

    fn level_data(&self, level: usize) -> Result<&SvsLevelData, TiffError> {
        self.levels.get(level).ok_or_else(|| TiffError::InvalidTagValue {
            tag: "level",
            message: format!("level {} out of range ({} levels)", level, self.levels.len()),
        })
    }

    /// Tile bytes exactly as stored (usually an abbreviated stream).
    pub async fn read_raw_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError> {
        let (offset, size) = self
            .level_data(level)?
            .get_tile_location(tile_x, tile_y)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "tile",
                message: format!("tile ({tile_x}, {tile_y}) out of range for level {level}"),
            })?;
        Ok(reader.read_exact_at(offset, size as usize).await?)
    }
}

#[async_trait]
impl SlideReader for SvsReader {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.level.width, l.level.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.level.downsample)
    }

    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.level.tile_width, l.level.tile_height))
    }

    fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        self.levels
            .get(level)
            .map(|l| (l.level.tiles_x, l.level.tiles_y))
    }

    async fn read_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Bytes, TiffError> {
        let raw = self.read_raw_tile(reader, level, tile_x, tile_y).await?;
        let tables = self.level_data(level)?.tile_data.jpeg_tables.as_deref();
        Ok(prepare_tile_jpeg(tables, &raw))
    }
}
