use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Random access to the bytes of a slide file.
///
/// Implementations must be shareable across tasks: tile fetches for the
/// same slide run concurrently and all go through one reader.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with [`IoError::RangeOutOfBounds`] if the range runs past the end.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Identifier used in logs, typically the file path.
    fn identifier(&self) -> &str;
}

// =============================================================================
// Endian Helpers
// =============================================================================
//
// TIFF declares its byte order in the header; every multi-byte value read
// afterwards goes through one of these. All of them panic on short input,
// callers slice to the right width first.

#[inline]
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Little-endian u16 from the first 2 bytes.
#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes(array(bytes))
}

/// Big-endian u16 from the first 2 bytes.
#[inline]
pub fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes(array(bytes))
}

/// Little-endian u32 from the first 4 bytes.
#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(array(bytes))
}

/// Big-endian u32 from the first 4 bytes.
#[inline]
pub fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes(array(bytes))
}

/// Little-endian u64 from the first 8 bytes.
#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(array(bytes))
}

/// Big-endian u64 from the first 8 bytes.
#[inline]
pub fn read_u64_be(bytes: &[u8]) -> u64 {
    u64::from_be_bytes(array(bytes))
}
