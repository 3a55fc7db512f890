//! # wsi-hed
//!
//! Lazy multiscale pyramids from Aperio SVS whole-slide images: the RGB
//! pyramid and a hematoxylin stain mask computed at full resolution.
//!
//! ## Architecture
//!
//! - [`io`] - byte-range reads from local files with block caching
//! - [`mod@format`] - TIFF/SVS parsing and JPEG stream preparation
//! - [`slide`] - opened slides, region reads and Deep Zoom tiling
//! - [`tile`] - tile decoding, caching, raw tiles and mask tiles
//! - [`stain`] - HED colour deconvolution
//! - [`graph`] - memoized task nodes, lazy arrays and their executor
//! - [`pyramid`] - per-level assembly of both pyramids
//! - [`plugin`] - reader selection and the layer-producing entry point
//! - [`config`] - reader configuration and CLI arguments
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_hed::{get_reader, ReadTarget};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let target = ReadTarget::from("slide.svs");
//!     let reader = get_reader(&target).ok_or("not an SVS file")?;
//!
//!     let layers = reader.read("slide.svs").await?;
//!     let finest = &layers[1].data[0];
//!     let mask = finest.compute_region(0..512, 0..512, reader.executor()).await?;
//!     println!("mask block: {:?}", mask.dim());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod graph;
pub mod io;
pub mod plugin;
pub mod pyramid;
pub mod slide;
pub mod stain;
pub mod tile;

pub use config::{LevelOrder, ReaderConfig, StainParams};
pub use error::{FormatError, IoError, ReadError, TiffError, TileError};
pub use format::{detect_format, SlideFormat, SvsMetadata, SvsReader};
pub use graph::{Delayed, Executor, LazyArray, TaskGraph, TaskKey, TaskKind};
pub use io::{BlockCache, FileRangeReader, RangeReader};
pub use plugin::{
    can_read, get_reader, read_function, LayerData, LayerOptions, LayerType, ReadTarget,
    SvsHedReader,
};
pub use pyramid::{PyramidAssembler, Pyramids};
pub use slide::{DeepZoomGenerator, SlideReader, SlideSource, WholeSlide};
pub use stain::{separate_stains, HED_FROM_RGB};
pub use tile::{fetch_tile, mask_tile};
