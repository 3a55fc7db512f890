//! Slide file decoding.
//!
//! [`detect::detect_format`] accepts Aperio SVS only; [`SvsReader`] parses
//! its pyramid and hands out decodable JPEG tiles.

pub mod detect;
pub mod jpeg;
pub mod svs;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, SlideFormat};
pub use svs::{SvsMetadata, SvsReader};
