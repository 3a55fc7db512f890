use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err.to_string())
    }
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only JPEG is supported)")]
    UnsupportedCompression(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while producing, masking, or assembling tiles
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Level index outside the pyramid
    #[error("Invalid level {level}: slide has {max_levels} levels")]
    InvalidLevel { level: usize, max_levels: usize },

    /// Tile address outside the level's tile grid
    #[error("Tile ({x}, {y}) out of bounds for level {level} ({max_x}x{max_y} tiles)")]
    TileOutOfBounds {
        level: usize,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    /// Error from the slide structure
    #[error("Slide error: {0}")]
    Slide(#[from] TiffError),

    /// I/O error while reading tile data
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Tile data could not be decoded
    #[error("Failed to decode tile: {message}")]
    DecodeError { message: String },

    /// Tile has the wrong number of channels
    #[error("Expected at least {expected} channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    /// A computed block disagrees with its declared shape
    #[error("Computed block has shape {actual:?}, declared {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// Arrays cannot be concatenated because their block extents differ
    #[error("Incompatible chunks: {message}")]
    IncompatibleChunks { message: String },

    /// Concatenation of an empty list of arrays
    #[error("Cannot concatenate an empty list of arrays")]
    EmptyConcatenation,

    /// Requested region exceeds the array
    #[error("Region x={x0}..{x1}, y={y0}..{y1} outside array of shape {shape:?}")]
    RegionOutOfBounds {
        x0: usize,
        x1: usize,
        y0: usize,
        y1: usize,
        shape: [usize; 3],
    },

    /// A worker task panicked or was cancelled
    #[error("Task failed: {message}")]
    TaskFailed { message: String },
}

/// Errors returned by the reading interface
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The slide could not be opened
    #[error("Failed to open slide: {0}")]
    Format(#[from] FormatError),

    /// The pyramid could not be assembled
    #[error("Failed to assemble pyramid: {0}")]
    Tile(#[from] TileError),

    /// The reader configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),
}
