//! Error types for the raster storage engine.
//!
//! One `thiserror` enum per concern, composed into a top-level [`EngineError`]
//! via `#[from]`, the same layering the format/io layers used before this
//! crate was a raster engine: a leaf error (e.g. [`PixelError`]) is wrapped by
//! the error of the operation that used it (e.g. [`CodecError`]), and the
//! outermost [`EngineError`] is what every public [`crate::Engine`] method
//! returns.

use thiserror::Error;

/// Errors constructing, mutating or comparing in-memory pixel values (C1).
#[derive(Debug, Clone, Error)]
pub enum PixelError {
    /// `(sample_type, pixel_type, bands)` combination violates spec §3.
    #[error("invalid pixel shape: sample={sample:?} pixel={pixel:?} bands={bands}")]
    InvalidShape {
        sample: crate::pixel::SampleType,
        pixel: crate::pixel::PixelType,
        bands: u8,
    },

    /// A sample value does not fit the declared sample width.
    #[error("sample value {value} out of range for {sample:?} (band {band})")]
    InvalidRange {
        sample: crate::pixel::SampleType,
        band: usize,
        value: i64,
    },

    /// Palette has more entries than `2^sample_width` allows, or is empty
    /// when the pixel type requires one.
    #[error("invalid palette: {reason}")]
    InvalidPalette { reason: String },

    /// A serialized pixel/tile/stats blob failed to parse.
    #[error("bad pixel blob: {reason}")]
    BadPixelBlob { reason: String },
}

/// Errors from the tile codec (C3): encode, decode, pixel-format conversion.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error(transparent)]
    Pixel(#[from] PixelError),

    /// The requested compression cannot represent this pixel shape (spec §4.3 table).
    #[error("incompatible compression: {compression:?} cannot encode {pixel:?}/{bands}-band {sample:?}")]
    IncompatibleCompression {
        compression: crate::codec::Compression,
        pixel: crate::pixel::PixelType,
        bands: u8,
        sample: crate::pixel::SampleType,
    },

    /// A decode requested a scale other than 1/1, 1/2, 1/4, 1/8.
    #[error("invalid scale denominator: {0} (must be 1, 2, 4 or 8)")]
    InvalidScale(u32),

    /// Tile blob header is malformed or inconsistent with the tile it is attached to.
    #[error("bad tile blob: {reason}")]
    BadTileBlob { reason: String },

    /// The even blob is required (lossy codec, scale 1) but missing.
    #[error("even blob required for lossless scale-1 decode of {0:?}")]
    MissingEvenBlob(crate::codec::Compression),

    /// Underlying codec (deflate/lzma/image) reported failure.
    #[error("codec failure: {0}")]
    CodecFailure(String),
}

/// Errors computing or (de)serializing raster statistics (C4).
#[derive(Debug, Clone, Error)]
pub enum StatsError {
    #[error(transparent)]
    Pixel(#[from] PixelError),

    #[error("bad statistics blob: {reason}")]
    BadStatsBlob { reason: String },

    #[error("cannot aggregate statistics with mismatched shape: expected {expected} bands, got {actual}")]
    BandMismatch { expected: usize, actual: usize },

    #[error("cannot aggregate statistics: empty set")]
    EmptySet,
}

/// Errors from schema creation and the coverage catalog (C5).
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("coverage name is invalid: {0}")]
    InvalidCoverageName(String),

    #[error("coverage already exists: {0}")]
    CoverageExists(String),

    #[error("coverage not found: {0}")]
    CoverageNotFound(String),

    #[error("cannot mix single-resolution and mixed-resolution level tables for coverage {0}")]
    MixedResolutionConflict(String),

    #[error(transparent)]
    Pixel(#[from] PixelError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Errors from the import pipeline (C8).
#[derive(Debug, Clone, Error)]
pub enum ImportError {
    #[error("source is incompatible with coverage: {reason}")]
    CoverageMismatch { reason: String },

    #[error("I/O failure reading {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("unrecognized source format for {0}")]
    UnrecognizedFormat(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Db(#[from] DbError),

    /// Raised only when the caller asked to pyramidize immediately after import
    /// (spec §4.8 step 6) and C10 failed.
    #[error(transparent)]
    Pyramid(#[from] PyramidError),

    /// File-touching ingress was attempted while `EngineConfig::allow_file_io` is false.
    #[error("file ingress is disabled by engine configuration")]
    FileIoDisabled,
}

/// Errors from the windowed reader (C9).
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    #[error("geometry/size mismatch: requested {width}x{height} at ({x_res}, {y_res}) does not match bbox within tolerance")]
    GeometrySizeMismatch {
        width: u32,
        height: u32,
        x_res: f64,
        y_res: f64,
    },

    #[error("band {requested} out of range: source has {available} bands")]
    BadBandSelection { requested: u32, available: u32 },

    #[error("resolution plan has no admissible candidate")]
    NoResolutionPlan,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Errors from the pyramid builder (C10).
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    #[error("section {0} not found")]
    SectionNotFound(i64),

    #[error("pyramid level {level} already exists for section {section_id} (use force to rebuild)")]
    LevelExists { section_id: i64, level: u32 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Errors from raster egress: `WriteGeoTiff`, `WriteTiff`, `WriteTiffTfw`,
/// `WriteAsciiGrid`, `GetMapImage` (spec §6).
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    /// ASCII grid export needs a single numeric band.
    #[error("export needs a single numeric band, got {bands} band(s) of {pixel:?}")]
    UnsupportedPixelType { pixel: crate::pixel::PixelType, bands: u8 },

    /// File-touching egress was attempted while `EngineConfig::allow_file_io` is false.
    #[error("file egress is disabled by engine configuration")]
    FileIoDisabled,

    #[error("I/O failure writing {path}: {reason}")]
    Io { path: String, reason: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors from statements executed against the host database.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Query(e.to_string())
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(e: rusqlite::Error) -> Self {
        SchemaError::Db(DbError::from(e))
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(e: rusqlite::Error) -> Self {
        ImportError::Db(DbError::from(e))
    }
}

impl From<rusqlite::Error> for ReadError {
    fn from(e: rusqlite::Error) -> Self {
        ReadError::Db(DbError::from(e))
    }
}

impl From<rusqlite::Error> for PyramidError {
    fn from(e: rusqlite::Error) -> Self {
        PyramidError::Db(DbError::from(e))
    }
}

/// Top-level error returned by every [`crate::Engine`] entry point.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Pixel(#[from] PixelError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Pyramid(#[from] PyramidError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("I/O failure: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Db(DbError::from(e))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

/// Maps an [`EngineError`] onto the `1 / 0 / -1` convention of the
/// SQL-callable function surface (spec §6).
pub fn sql_return_code(result: &Result<(), EngineError>) -> i32 {
    match result {
        Ok(()) => 1,
        Err(EngineError::InvalidArgument(_)) => -1,
        Err(_) => 0,
    }
}
