//! Slide format detection.
//!
//! Only Aperio SVS is accepted: a TIFF or BigTIFF file whose first IFD
//! carries an ImageDescription containing "Aperio". Plain pyramidal TIFFs
//! and non-TIFF files are rejected as unsupported.

use crate::error::FormatError;
use crate::io::RangeReader;

use super::tiff::{ByteOrder, Ifd, TiffHeader, TiffTag, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};

/// Prefix of the first IFD's description read when looking for the marker.
const MAX_DESCRIPTION_BYTES: usize = 1024;

const APERIO_MARKER: &[u8] = b"Aperio";

/// A recognised slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideFormat {
    AperioSvs,
}

impl SlideFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
        }
    }
}

/// Identify the slide format from the header and first IFD.
pub async fn detect_format<R: RangeReader>(reader: &R) -> Result<SlideFormat, FormatError> {
    if reader.size() < TIFF_HEADER_SIZE as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: "file too small to be a TIFF".to_string(),
        });
    }

    let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
    let header_bytes = reader.read_exact_at(0, header_len).await?;
    if !is_tiff_header(&header_bytes) {
        return Err(FormatError::UnsupportedFormat {
            reason: "not a TIFF file".to_string(),
        });
    }
    let header = TiffHeader::parse(&header_bytes, reader.size())?;

    let count_bytes = reader
        .read_exact_at(header.first_ifd_offset, header.ifd_count_size())
        .await?;
    let entry_count = if header.is_bigtiff {
        header.byte_order.read_u64(&count_bytes)
    } else {
        header.byte_order.read_u16(&count_bytes) as u64
    };
    let ifd_bytes = reader
        .read_exact_at(
            header.first_ifd_offset,
            Ifd::calculate_size(entry_count, &header),
        )
        .await?;
    let ifd = Ifd::parse(&ifd_bytes, &header)?;

    match description_prefix(reader, &ifd, &header).await? {
        Some(description) if contains_aperio_marker(&description) => Ok(SlideFormat::AperioSvs),
        _ => Err(FormatError::UnsupportedFormat {
            reason: "TIFF file without an Aperio ImageDescription".to_string(),
        }),
    }
}

async fn description_prefix<R: RangeReader>(
    reader: &R,
    ifd: &Ifd,
    header: &TiffHeader,
) -> Result<Option<Vec<u8>>, FormatError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) else {
        return Ok(None);
    };
    let len = (entry.count as usize).min(MAX_DESCRIPTION_BYTES);
    if len == 0 {
        return Ok(None);
    }

    let bytes = if entry.is_inline {
        entry.value_offset_bytes[..len.min(header.value_offset_size())].to_vec()
    } else {
        let offset = entry.value_offset(header.byte_order, header.is_bigtiff);
        reader.read_exact_at(offset, len).await?.to_vec()
    };
    Ok(Some(bytes))
}

fn contains_aperio_marker(data: &[u8]) -> bool {
    data.windows(APERIO_MARKER.len()).any(|w| w == APERIO_MARKER)
}

/// Quick check for TIFF or BigTIFF magic and version.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }
    let order = match &bytes[..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };
    matches!(order.read_u16(&bytes[2..4]), 42 | 43)
}
