//! JPEG stream plumbing for SVS tiles.
//!
//! Aperio writes each tile as an abbreviated JPEG stream: the scan data is
//! there but the quantization (DQT) and Huffman (DHT) tables are stored once
//! per level in the `JPEGTables` tag. Decoding a tile means splicing the two:
//!
//! ```text
//! tables = SOI DQT.. DHT.. EOI
//! tile   = SOI SOF SOS <scan> EOI
//! merged = SOI DQT.. DHT.. SOF SOS <scan> EOI
//! ```

use bytes::{Bytes, BytesMut};

pub const SOI: [u8; 2] = [0xFF, 0xD8];
pub const EOI: [u8; 2] = [0xFF, 0xD9];
pub const DHT: [u8; 2] = [0xFF, 0xC4];
pub const DQT: [u8; 2] = [0xFF, 0xDB];
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Walk the marker segments that precede the scan, yielding each marker.
///
/// Stops at SOS, at EOI, or when the data runs out.
fn header_markers(data: &[u8]) -> impl Iterator<Item = [u8; 2]> + '_ {
    let mut pos = 2;
    std::iter::from_fn(move || {
        // Skip fill bytes and anything that is not a marker
        while pos + 1 < data.len() && !(data[pos] == 0xFF && data[pos + 1] != 0xFF) {
            pos += 1;
        }
        if pos + 1 >= data.len() {
            return None;
        }
        let marker = [data[pos], data[pos + 1]];
        if marker == SOS || marker == EOI {
            pos = data.len();
            return Some(marker);
        }
        // Standalone markers (RSTn, TEM) carry no length
        let standalone = matches!(marker[1], 0x01 | 0xD0..=0xD7);
        if standalone || pos + 3 >= data.len() {
            pos += 2;
        } else {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length.max(2);
        }
        Some(marker)
    })
}

fn starts_with_soi(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == SOI
}

/// True if the stream reaches its scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if !starts_with_soi(data) {
        return false;
    }
    for marker in header_markers(data) {
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }
    }
    false
}

/// True if the stream defines at least one quantization table.
pub fn is_complete_stream(data: &[u8]) -> bool {
    starts_with_soi(data) && header_markers(data).any(|m| m == DQT)
}

/// Splice `tables` (SOI..EOI) in front of an abbreviated `tile` (SOI..EOI).
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile_data.strip_prefix(&SOI).unwrap_or(tile_data);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged.freeze()
}

/// Produce a decodable stream from raw tile bytes and optional level tables.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if is_abbreviated_stream(tile_data) => merge_jpeg_tables(tables, tile_data),
        _ => Bytes::copy_from_slice(tile_data),
    }
}
