//! Slide access layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     SlideSource (DeepZoomGenerator)     │
//! │   (level, col, row) tiles, 1x1 first    │
//! └────────────────────┬────────────────────┘
//!                      │ read_region
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              WholeSlide                 │
//! │  (byte source + decoded tile cache)     │
//! └────────────────────┬────────────────────┘
//!                      │ read_tile
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │       SlideReader (SvsReader)           │
//! │  (format-agnostic level metadata)       │
//! └─────────────────────────────────────────┘
//! ```

mod deepzoom;
mod reader;
mod source;
mod wsi;

pub use deepzoom::{DeepZoomGenerator, TileInfo};
pub use reader::{Bounds, LevelInfo, SlideReader};
pub use source::SlideSource;
pub use wsi::{WholeSlide, BACKGROUND};
