//! Source-format readers for the import pipeline (spec §4.8 step 1).
//!
//! Each reader inspects one file and returns a [`SourceRaster`]: a decoded
//! [`Raster`] plus the georeferencing the import pipeline needs to compare
//! against the target coverage. Format is picked by extension, matching the
//! original's `is_ascii_grid`/worldfile-suffix dispatch (spec §4.8 step 1).

pub mod ascii_grid;
pub mod tiff;
pub mod worldfile;

use std::path::Path;

use crate::error::ImportError;
use crate::raster::Raster;

/// A decoded source image plus the georeferencing the coverage-compatibility
/// check (spec §4.8 step 2) needs.
pub struct SourceRaster {
    pub raster: Raster,
    pub res_x: f64,
    pub res_y: f64,
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
    /// `None` when the source carries no embedded SRID (e.g. a worldfile-only
    /// JPEG); the caller's `force_srid`, if any, still applies.
    pub srid: Option<i64>,
    /// Set only by the JPEG+worldfile reader: the one source format the
    /// import pipeline is allowed to convert RGB<->grayscale for (spec
    /// §4.8 "Compatibility rules").
    pub allow_grayscale_rgb_conversion: bool,
}

impl SourceRaster {
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}

/// Detect the source format from a path's extension (spec §4.8 step 1).
pub enum SourceFormat {
    AsciiGrid,
    JpegWithWorldfile,
    Tiff,
}

pub fn detect_format(path: &Path) -> SourceFormat {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("asc") => SourceFormat::AsciiGrid,
        Some("jpg") | Some("jpeg") => SourceFormat::JpegWithWorldfile,
        _ => SourceFormat::Tiff,
    }
}

/// Read `path`, dispatching on [`detect_format`] (spec §4.8 step 1).
pub fn read_source(path: &Path) -> Result<SourceRaster, ImportError> {
    match detect_format(path) {
        SourceFormat::AsciiGrid => ascii_grid::read(path),
        SourceFormat::JpegWithWorldfile => worldfile::read_jpeg_with_worldfile(path),
        SourceFormat::Tiff => tiff::read(path),
    }
}
