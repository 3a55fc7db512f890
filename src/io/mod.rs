//! Byte-range I/O for slide files.
//!
//! The TIFF parser never reads a slide front to back. It asks for small
//! ranges (headers, IFDs, offset arrays) and then for individual tile
//! payloads. [`RangeReader`] is the seam for that access pattern,
//! [`FileRangeReader`] serves it from a local file and [`BlockCache`]
//! coalesces the small scattered reads into cached blocks.

mod block_cache;
mod file_reader;
mod range_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use file_reader::FileRangeReader;
pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};
