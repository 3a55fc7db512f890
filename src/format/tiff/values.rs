//! Reading IFD entry values.
//!
//! Small values live inline in the entry; larger ones (tile offset arrays,
//! descriptions, JPEGTables) sit elsewhere in the file and are fetched with a
//! single range read per entry.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::{FieldType, TiffTag};

/// Reads entry values from a file with a known header.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Raw bytes of the whole value.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))? as usize;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(&entry.value_offset_bytes[..size]));
        }

        let offset = entry.value_offset(self.header.byte_order, self.header.is_bigtiff);
        Ok(self.reader.read_exact_at(offset, size).await?)
    }

    /// A single unsigned integer (Short, Long or Long8).
    pub async fn read_u64(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        if let Some(value) = entry.inline_u64(self.header.byte_order) {
            return Ok(value);
        }
        let values = self.read_u64_array(entry).await?;
        match values.as_slice() {
            [value] => Ok(*value),
            _ => Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected a single value, got {}", values.len()),
            }),
        }
    }

    /// An array of unsigned integers widened to u64.
    ///
    /// This is how TileOffsets and TileByteCounts are loaded.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        if entry.count == 0 {
            return Ok(Vec::new());
        }
        let field_type = integer_type(entry)?;
        let bytes = self.read_bytes(entry).await?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }

    /// An ASCII value with its NUL terminator stripped.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: tag_name(entry),
                message: format!("expected ASCII, got type {}", entry.field_type_raw),
            });
        }
        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

fn tag_name(entry: &IfdEntry) -> &'static str {
    entry.tag().map(TiffTag::name).unwrap_or("unknown")
}

fn integer_type(entry: &IfdEntry) -> Result<FieldType, TiffError> {
    match entry.field_type {
        Some(t @ (FieldType::Short | FieldType::Long | FieldType::Long8)) => Ok(t),
        Some(other) => Err(TiffError::InvalidTagValue {
            tag: tag_name(entry),
            message: format!("expected an integer type, got {other:?}"),
        }),
        None => Err(TiffError::UnknownFieldType(entry.field_type_raw)),
    }
}

/// Decode `count` integers of `field_type` from `bytes`.
///
/// Stops early if `bytes` is short; non-integer types yield an empty vector.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = match field_type {
        FieldType::Short | FieldType::Long | FieldType::Long8 => field_type.size_in_bytes(),
        _ => return Vec::new(),
    };

    bytes
        .chunks_exact(width)
        .take(count)
        .map(|chunk| match field_type {
            FieldType::Short => byte_order.read_u16(chunk) as u64,
            FieldType::Long => byte_order.read_u32(chunk) as u64,
            _ => byte_order.read_u64(chunk),
        })
        .collect()
}
