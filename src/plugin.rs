//! Reader selection and the layer-producing read entry point.
//!
//! A viewer asks [`get_reader`] whether it can handle a path; when it can,
//! [`SvsHedReader::read`] returns two image layers: the RGB pyramid and the
//! hematoxylin mask pyramid.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::ReaderConfig;
use crate::error::ReadError;
use crate::graph::{Executor, LazyArray};
use crate::pyramid::PyramidAssembler;
use crate::slide::{DeepZoomGenerator, SlideSource, WholeSlide};

/// File extension handled by this reader.
pub const SVS_EXTENSION: &str = ".svs";

/// What a viewer asks to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTarget {
    Path(String),
    /// Several paths at once; never handled
    Paths(Vec<String>),
}

impl From<&str> for ReadTarget {
    fn from(path: &str) -> Self {
        ReadTarget::Path(path.to_string())
    }
}

impl From<String> for ReadTarget {
    fn from(path: String) -> Self {
        ReadTarget::Path(path)
    }
}

impl From<Vec<String>> for ReadTarget {
    fn from(paths: Vec<String>) -> Self {
        ReadTarget::Paths(paths)
    }
}

/// True for a single path ending in `.svs`.
pub fn can_read(target: &ReadTarget) -> bool {
    match target {
        ReadTarget::Path(path) => path.ends_with(SVS_EXTENSION),
        ReadTarget::Paths(_) => false,
    }
}

/// Reader for `target`, or `None` when it is not handled.
pub fn get_reader(target: &ReadTarget) -> Option<SvsHedReader> {
    can_read(target).then(SvsHedReader::default)
}

/// Read `path` with the default configuration.
pub async fn read_function(path: impl AsRef<Path>) -> Result<Vec<LayerData>, ReadError> {
    SvsHedReader::default().read(path).await
}

// =============================================================================
// Layers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Image,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Image => "image",
        }
    }
}

/// Display keyword arguments of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub multiscale: bool,
    pub contrast_limits: [u8; 2],
}

impl LayerOptions {
    pub fn raw() -> Self {
        Self {
            name: None,
            multiscale: true,
            contrast_limits: [0, 255],
        }
    }

    pub fn mask() -> Self {
        Self {
            name: Some("label".to_string()),
            ..Self::raw()
        }
    }
}

/// One layer: a pyramid, its display options and its kind.
#[derive(Debug, Clone)]
pub struct LayerData {
    pub data: Vec<LazyArray>,
    pub options: LayerOptions,
    pub layer_type: LayerType,
}

// =============================================================================
// Reader
// =============================================================================

/// Opens SVS slides into raw and mask layers.
///
/// The returned arrays are lazy; evaluate them with [`SvsHedReader::executor`]
/// or any other [`Executor`].
#[derive(Clone)]
pub struct SvsHedReader {
    config: ReaderConfig,
    executor: Executor,
}

impl Default for SvsHedReader {
    fn default() -> Self {
        Self::new(ReaderConfig::default())
    }
}

impl SvsHedReader {
    pub fn new(config: ReaderConfig) -> Self {
        let executor =
            Executor::with_cache_capacity(config.concurrency, config.result_cache_bytes);
        Self { config, executor }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Open `path` and build the `[raw, mask]` layers.
    pub async fn read(&self, path: impl AsRef<Path>) -> Result<Vec<LayerData>, ReadError> {
        self.config.validate().map_err(ReadError::Config)?;

        let slide = WholeSlide::open(path.as_ref(), &self.config).await?;
        let deepzoom = DeepZoomGenerator::new(
            Arc::new(slide),
            self.config.tile_size,
            self.config.overlap,
            self.config.limit_bounds,
        )?;
        info!(
            levels = deepzoom.level_count(),
            tiles = deepzoom.tile_count(),
            "Built Deep Zoom grid"
        );

        let source: Arc<dyn SlideSource> = Arc::new(deepzoom);
        let pyramids = PyramidAssembler::new(source, &self.config)
            .assemble(&self.executor)
            .await?;

        Ok(vec![
            LayerData {
                data: pyramids.raw,
                options: LayerOptions::raw(),
                layer_type: LayerType::Image,
            },
            LayerData {
                data: pyramids.mask,
                options: LayerOptions::mask(),
                layer_type: LayerType::Image,
            },
        ])
    }
}
