//! Pyramid level identification.
//!
//! An SVS file chains several IFDs: the full-resolution image, its reduced
//! copies, a thumbnail (usually stripped), and label and macro images whose
//! ImageDescription names them. Only tiled IFDs whose description does not
//! name a label or macro take part in the pyramid.

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Upper bound on the IFD chain length; guards against offset cycles.
const MAX_IFDS: usize = 100;

/// Kind of associated image an ImageDescription can announce.
const ASSOCIATED_IMAGE_MARKERS: [&str; 2] = ["label", "macro"];

// =============================================================================
// PyramidLevel
// =============================================================================

/// One resolution level, level 0 being the largest.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub level_index: usize,
    /// Position in the file's IFD chain
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Mean of the x and y size ratios to level 0
    pub downsample: f64,
    pub compression: u16,
    pub description: Option<String>,
    pub ifd: Ifd,
    pub tile_offsets_entry: Option<IfdEntry>,
    pub tile_byte_counts_entry: Option<IfdEntry>,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    fn from_ifd(
        ifd: Ifd,
        ifd_index: usize,
        description: Option<String>,
        byte_order: ByteOrder,
    ) -> Option<Self> {
        if !ifd.is_tiled() {
            return None;
        }
        let tile_width = ifd.tile_width(byte_order)?;
        let tile_height = ifd.tile_height(byte_order)?;
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;
        if tile_width == 0 || tile_height == 0 || width == 0 || height == 0 {
            return None;
        }
        // Compression defaults to 1 (none) per TIFF 6.0
        let compression = ifd.compression(byte_order).unwrap_or(1);

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            downsample: 1.0,
            compression,
            description,
            tile_offsets_entry: ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned(),
            tile_byte_counts_entry: ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned(),
            jpeg_tables_entry: ifd.get_entry_by_tag(TiffTag::JpegTables).cloned(),
            ifd,
        })
    }

    pub fn has_tile_data(&self) -> bool {
        self.tile_offsets_entry.is_some() && self.tile_byte_counts_entry.is_some()
    }

    /// Row-major index of a tile, `None` outside the grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        (tile_x < self.tiles_x && tile_y < self.tiles_y).then(|| tile_y * self.tiles_x + tile_x)
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// True if the ImageDescription announces a label or macro image.
    pub fn is_associated_image(&self) -> bool {
        self.description
            .as_deref()
            .map(names_associated_image)
            .unwrap_or(false)
    }
}

/// Aperio writes "label WxH" or "macro WxH" on the line after the library
/// banner. Any line starting with one of the markers counts.
fn names_associated_image(description: &str) -> bool {
    description.lines().any(|line| {
        let first = line.trim().split_whitespace().next().unwrap_or("");
        ASSOCIATED_IMAGE_MARKERS
            .iter()
            .any(|marker| first.eq_ignore_ascii_case(marker))
    })
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// The pyramid levels of a parsed IFD chain.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    /// Sorted by area, largest first
    pub levels: Vec<PyramidLevel>,
}

impl TiffPyramid {
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = read_ifd_chain(reader, &header).await?;
        let values = ValueReader::new(reader, &header);

        let mut candidates = Vec::new();
        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            let description = match ifd.get_entry_by_tag(TiffTag::ImageDescription) {
                Some(entry) => Some(values.read_string(entry).await?),
                None => None,
            };
            match PyramidLevel::from_ifd(ifd, ifd_index, description, header.byte_order) {
                Some(level) if level.has_tile_data() && !level.is_associated_image() => {
                    candidates.push(level)
                }
                _ => debug!(ifd_index, "IFD is not a pyramid level"),
            }
        }

        candidates.sort_by_key(|l| std::cmp::Reverse(l.width as u64 * l.height as u64));

        Ok(TiffPyramid {
            header,
            levels: assign_downsamples(candidates),
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.levels.first().map(|l| (l.width, l.height))
    }
}

async fn read_ifd_chain<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Vec<Ifd>, TiffError> {
    let mut ifds = Vec::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 && ifds.len() < MAX_IFDS {
        if offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }
        let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };

        let ifd_bytes = reader
            .read_exact_at(offset, Ifd::calculate_size(entry_count, header))
            .await?;
        let ifd = Ifd::parse(&ifd_bytes, header)?;
        offset = ifd.next_ifd_offset;
        ifds.push(ifd);
    }

    Ok(ifds)
}

/// Number the area-sorted levels and give each its downsample from the
/// largest: the mean of the width and height ratios.
fn assign_downsamples(mut levels: Vec<PyramidLevel>) -> Vec<PyramidLevel> {
    let Some(base) = levels.first() else {
        return levels;
    };
    let (base_w, base_h) = (base.width as f64, base.height as f64);

    for (index, level) in levels.iter_mut().enumerate() {
        level.level_index = index;
        level.downsample = if index == 0 {
            1.0
        } else {
            (base_w / level.width as f64 + base_h / level.height as f64) / 2.0
        };
    }
    levels
}

// =============================================================================
// TileData
// =============================================================================

/// Tile locations and shared JPEG tables for one level.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load tile arrays for `level`, rejecting anything but JPEG tiles.
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let supported = Compression::from_u16(level.compression)
            .map(Compression::is_supported)
            .unwrap_or(false);
        if !supported {
            return Err(TiffError::UnsupportedCompression(Compression::describe(
                level.compression,
            )));
        }

        let values = ValueReader::new(reader, header);
        let offsets_entry = level
            .tile_offsets_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let counts_entry = level
            .tile_byte_counts_entry
            .as_ref()
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        let offsets = values.read_u64_array(offsets_entry).await?;
        let byte_counts = values.read_u64_array(counts_entry).await?;
        let expected = level.tile_count() as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "level has {} tiles but {} offsets and {} byte counts",
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match &level.jpeg_tables_entry {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// `(offset, byte_count)` of a tile by row-major index.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let i = tile_index as usize;
        Some((*self.offsets.get(i)?, *self.byte_counts.get(i)?))
    }
}
