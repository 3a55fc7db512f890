//! Test utilities for integration tests.
//!
//! Provides an in-memory range reader, a builder for small Aperio SVS files
//! and a synthetic [`SlideSource`] with a configurable tile grid.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use wsi_hed::error::{IoError, TileError};
use wsi_hed::io::RangeReader;
use wsi_hed::slide::SlideSource;

/// A nucleus-like colour well above the default hematoxylin threshold.
pub const PURPLE: [u8; 3] = [60, 40, 140];
pub const WHITE: [u8; 3] = [255, 255, 255];

// =============================================================================
// Memory Range Reader
// =============================================================================

/// Range reader over a byte buffer, counting requests.
pub struct MemoryReader {
    data: Bytes,
    identifier: String,
    requests: AtomicUsize,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeReader for MemoryReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Test JPEG Creation
// =============================================================================

/// Tile whose left half is `left` and right half is `right`.
pub fn split_tile(side: u32, left: [u8; 3], right: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(side, side, |x, _| {
        if x < side / 2 {
            Rgb(left)
        } else {
            Rgb(right)
        }
    })
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .unwrap();
    buf
}

/// Split a complete JPEG stream into a JPEGTables blob (SOI, tables, EOI)
/// and an abbreviated tile stream (SOI, scan, EOI).
pub fn split_jpeg_stream(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut i = 2;
    while i + 4 <= jpeg.len() {
        assert_eq!(jpeg[i], 0xFF, "expected a marker at {i}");
        if jpeg[i + 1] == 0xDA {
            let mut tables = vec![0xFF, 0xD8];
            tables.extend_from_slice(&jpeg[2..i]);
            tables.extend_from_slice(&[0xFF, 0xD9]);

            let mut tile = vec![0xFF, 0xD8];
            tile.extend_from_slice(&jpeg[i..]);
            return (tables, tile);
        }
        let len = u16::from_be_bytes([jpeg[i + 2], jpeg[i + 3]]) as usize;
        i += 2 + len;
    }
    panic!("no SOS marker in JPEG stream");
}

// =============================================================================
// SVS File Builder
// =============================================================================

/// One pyramid level of a synthetic slide. Every tile shares one image.
pub struct SvsLevel {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub tile: RgbImage,
}

/// Builds little-endian classic TIFF files laid out like Aperio SVS.
pub struct SvsBuilder {
    levels: Vec<SvsLevel>,
    jpeg_tables: bool,
    compression: u16,
    vendor: &'static str,
}

impl SvsBuilder {
    pub fn new() -> Self {
        Self {
            levels: Vec::new(),
            jpeg_tables: false,
            compression: 7,
            vendor: "Aperio Image Library v12.0.5",
        }
    }

    pub fn level(mut self, width: u32, height: u32, tile_size: u32, tile: RgbImage) -> Self {
        self.levels.push(SvsLevel {
            width,
            height,
            tile_size,
            tile,
        });
        self
    }

    /// Store tiles as abbreviated streams with shared JPEGTables.
    pub fn with_jpeg_tables(mut self) -> Self {
        self.jpeg_tables = true;
        self
    }

    pub fn with_compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }

    /// Replace the vendor line of every description.
    pub fn with_vendor(mut self, vendor: &'static str) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut data = vec![b'I', b'I'];
        data.extend_from_slice(&42u16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());

        // Pixel data and arrays first, IFDs after
        let mut ifds = Vec::with_capacity(self.levels.len());
        for (index, level) in self.levels.iter().enumerate() {
            let jpeg = encode_jpeg(&level.tile, 90);
            let (tables, tile) = if self.jpeg_tables {
                let (tables, tile) = split_jpeg_stream(&jpeg);
                (Some(tables), tile)
            } else {
                (None, jpeg)
            };

            let tiles = level.width.div_ceil(level.tile_size) * level.height.div_ceil(level.tile_size);

            let tile_offset = push_blob(&mut data, &tile);
            let offsets: Vec<u8> = (0..tiles).flat_map(|_| tile_offset.to_le_bytes()).collect();
            let counts: Vec<u8> = (0..tiles)
                .flat_map(|_| (tile.len() as u32).to_le_bytes())
                .collect();

            let mut description = format!(
                "{}\r\n{}x{} ({}x{}) JPEG/RGB Q=90",
                self.vendor, level.width, level.height, level.tile_size, level.tile_size
            );
            if index == 0 {
                description.push_str("|AppMag = 20|MPP = 0.4990");
            }
            let mut description = description.into_bytes();
            description.push(0);

            let mut entries = vec![
                Entry::long(256, level.width),
                Entry::long(257, level.height),
                Entry::short(258, 8),
                Entry::short(259, self.compression),
                Entry::short(262, 2),
                Entry::blob(270, 2, description.len() as u32, push_blob(&mut data, &description)),
                Entry::short(277, 3),
                Entry::short(322, level.tile_size as u16),
                Entry::short(323, level.tile_size as u16),
            ];
            entries.push(if tiles == 1 {
                Entry::long(324, tile_offset)
            } else {
                Entry::blob(324, 4, tiles, push_blob(&mut data, &offsets))
            });
            entries.push(if tiles == 1 {
                Entry::long(325, tile.len() as u32)
            } else {
                Entry::blob(325, 4, tiles, push_blob(&mut data, &counts))
            });
            if let Some(tables) = tables {
                entries.push(Entry::blob(
                    347,
                    7,
                    tables.len() as u32,
                    push_blob(&mut data, &tables),
                ));
            }
            ifds.push(entries);
        }

        let mut next_pointer = 4usize;
        for entries in ifds {
            align(&mut data);
            let ifd_offset = data.len() as u32;
            data[next_pointer..next_pointer + 4].copy_from_slice(&ifd_offset.to_le_bytes());

            data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for entry in entries {
                data.extend_from_slice(&entry.tag.to_le_bytes());
                data.extend_from_slice(&entry.field_type.to_le_bytes());
                data.extend_from_slice(&entry.count.to_le_bytes());
                data.extend_from_slice(&entry.value);
            }
            next_pointer = data.len();
            data.extend_from_slice(&0u32.to_le_bytes());
        }

        data
    }
}

impl Default for SvsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: [u8; 4],
}

impl Entry {
    fn short(tag: u16, value: u16) -> Self {
        let mut bytes = [0u8; 4];
        bytes[..2].copy_from_slice(&value.to_le_bytes());
        Self {
            tag,
            field_type: 3,
            count: 1,
            value: bytes,
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            field_type: 4,
            count: 1,
            value: value.to_le_bytes(),
        }
    }

    fn blob(tag: u16, field_type: u16, count: u32, offset: u32) -> Self {
        Self {
            tag,
            field_type,
            count,
            value: offset.to_le_bytes(),
        }
    }
}

fn align(data: &mut Vec<u8>) {
    if data.len() % 2 == 1 {
        data.push(0);
    }
}

fn push_blob(data: &mut Vec<u8>, blob: &[u8]) -> u32 {
    align(data);
    let offset = data.len() as u32;
    data.extend_from_slice(blob);
    offset
}

/// A 2048x2048 slide with a 512x512 level, 256 px tiles, left half purple.
pub fn create_two_level_svs(jpeg_tables: bool) -> Vec<u8> {
    let builder = SvsBuilder::new()
        .level(2048, 2048, 256, split_tile(256, PURPLE, WHITE))
        .level(512, 512, 256, split_tile(256, PURPLE, WHITE));
    if jpeg_tables {
        builder.with_jpeg_tables().build()
    } else {
        builder.build()
    }
}

/// Write `data` to a unique file in the temp directory.
pub fn write_temp_file(name: &str, data: &[u8]) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("wsi-hed-tests-{}-{unique}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

// =============================================================================
// Synthetic Slide Source
// =============================================================================

/// [`SlideSource`] with a fixed tile grid per level.
///
/// Full tiles are `tile_size` square; tiles in the last column and row are
/// `edge` pixels wide or tall. Pixels are purple on a checkerboard of
/// `cell`-pixel squares and white elsewhere.
pub struct SyntheticSource {
    level_tiles: Vec<(u32, u32)>,
    tile_size: u32,
    edge: u32,
    cell: u32,
    fetches: Mutex<HashMap<(usize, u32, u32), usize>>,
    total: AtomicUsize,
}

impl SyntheticSource {
    pub fn new(level_tiles: Vec<(u32, u32)>, tile_size: u32) -> Self {
        Self {
            level_tiles,
            tile_size,
            edge: (tile_size / 3).max(1),
            cell: (tile_size / 8).max(1),
            fetches: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        }
    }

    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Largest number of fetches of any single tile.
    pub fn max_fetches_per_tile(&self) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    pub fn colour_at(&self, x: u32, y: u32) -> [u8; 3] {
        if (x / self.cell + y / self.cell) % 2 == 0 {
            PURPLE
        } else {
            WHITE
        }
    }

    fn extent(&self, tiles: u32) -> u32 {
        (tiles - 1) * self.tile_size + self.edge
    }
}

#[async_trait]
impl SlideSource for SyntheticSource {
    fn level_count(&self) -> usize {
        self.level_tiles.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        let &(tx, ty) = self.level_tiles.get(level)?;
        Some((self.extent(tx), self.extent(ty)))
    }

    fn level_tiles(&self, level: usize) -> Option<(u32, u32)> {
        self.level_tiles.get(level).copied()
    }

    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    async fn get_tile(&self, level: usize, col: u32, row: u32) -> Result<RgbImage, TileError> {
        let (tx, ty) = self.level_tiles(level).ok_or(TileError::InvalidLevel {
            level,
            max_levels: self.level_tiles.len(),
        })?;
        if col >= tx || row >= ty {
            return Err(TileError::TileOutOfBounds {
                level,
                x: col,
                y: row,
                max_x: tx,
                max_y: ty,
            });
        }

        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .fetches
            .lock()
            .unwrap()
            .entry((level, col, row))
            .or_insert(0) += 1;

        let width = if col == tx - 1 { self.edge } else { self.tile_size };
        let height = if row == ty - 1 { self.edge } else { self.tile_size };
        let x0 = col * self.tile_size;
        let y0 = row * self.tile_size;
        Ok(RgbImage::from_fn(width, height, |x, y| {
            Rgb(self.colour_at(x0 + x, y0 + y))
        }))
    }
}
