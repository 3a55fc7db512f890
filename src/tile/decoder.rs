//! JPEG tile decoding.

use std::io::Cursor;

use image::{ImageFormat, ImageReader, RgbImage};

use crate::error::TileError;

/// Decodes complete JPEG streams into 8-bit RGB tiles.
///
/// Grayscale and CMYK streams are converted to RGB.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegTileDecoder;

impl JpegTileDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, source: &[u8]) -> Result<RgbImage, TileError> {
        let image = ImageReader::with_format(Cursor::new(source), ImageFormat::Jpeg)
            .decode()
            .map_err(|e| TileError::DecodeError {
                message: e.to_string(),
            })?;
        Ok(image.into_rgb8())
    }

    /// `(width, height)` read from the frame header, without decoding.
    pub fn dimensions(&self, source: &[u8]) -> Result<(u32, u32), TileError> {
        ImageReader::with_format(Cursor::new(source), ImageFormat::Jpeg)
            .into_dimensions()
            .map_err(|e| TileError::DecodeError {
                message: e.to_string(),
            })
    }
}
