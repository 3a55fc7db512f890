//! Tile-level operations.
//!
//! - [`TileCache`]: LRU of decoded source tiles with size-based eviction
//! - [`JpegTileDecoder`]: JPEG stream to RGB pixels
//! - [`fetch_tile`]: one raw tile from a [`crate::slide::SlideSource`] as an
//!   `(x, y, channel)` array
//! - [`mask_tile`]: the stain mask derived from a raw tile

mod cache;
mod decoder;
mod mask;
mod producer;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use decoder::JpegTileDecoder;
pub use mask::{mask_tile, MASK_POSITIVE};
pub use producer::{fetch_tile, image_to_tile, tile_to_image};
