//! TIFF and BigTIFF structure parsing.
//!
//! The header fixes the byte order and offset width for the rest of the
//! file. IFDs are read along the next-IFD chain; each one describes an image
//! (pyramid level, thumbnail, label or macro). Entry values either sit inline
//! in the entry or at an offset it points to.

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, TiffTag};
pub use values::{parse_u64_array, ValueReader};
