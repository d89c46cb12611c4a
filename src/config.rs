//! Configuration and CLI surface for the `tileraster` command-line front-end.
//!
//! This module provides:
//! - Command-line arguments via clap, one subcommand per verb (spec §6 "CLI surface")
//! - Environment variables with a `TILERASTER_` prefix for the flags that make
//!   sense to set once per deployment (database path, file-I/O gate)
//! - Sensible defaults for optional settings
//!
//! # Example
//!
//! ```ignore
//! use tileraster::config::Cli;
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! println!("operating on {}", cli.db.display());
//! ```
//!
//! # Environment Variables
//!
//! - `TILERASTER_DB` - database file path
//! - `TILERASTER_ALLOW_FILE_IO` - enable file-touching ingress/egress (default: false)

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::codec::Compression;
use crate::pixel::{PixelType, SampleType};

/// Default SRID (WGS 84) for newly created coverages that don't specify one.
pub const DEFAULT_SRID: i64 = 4326;

/// Default tile edge, in pixels, for newly created coverages.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default compression quality (lossless codecs ignore this).
pub const DEFAULT_QUALITY: u8 = 100;

/// `tileraster` - a tiled, pyramidal raster storage engine backed by an
/// embedded SQLite database.
///
/// Mirrors the verb set of librasterlite2's `rl2_tool`: `create`, `drop`,
/// `import`, `export`, `delete`, `pyramidize`, `list`, `catalog`, `map`,
/// `check`.
#[derive(Parser, Debug, Clone)]
#[command(name = "tileraster")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the SQLite database file.
    #[arg(long = "db-path", visible_alias = "db", global = true, env = "TILERASTER_DB")]
    pub db: PathBuf,

    /// Allow file-touching ingress/egress (`import`, `export`, `map`).
    ///
    /// Mirrors librasterlite2's `SPATIALITE_SECURITY=relaxed` gate, but as an
    /// explicit per-invocation flag rather than ambient process state.
    #[arg(long, global = true, env = "TILERASTER_ALLOW_FILE_IO", default_value_t = false)]
    pub allow_file_io: bool,

    /// Enable verbose (debug level) logging.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Register a new Coverage and its table set.
    Create(CreateArgs),
    /// Drop an existing Coverage, its tables and its catalog row.
    Drop(DropArgs),
    /// Import a Raster Section from a single file or every file in a directory.
    Import(ImportArgs),
    /// Export a windowed view of a Coverage as a raster file.
    Export(ExportArgs),
    /// Delete a Raster Section and everything that references it.
    Delete(DeleteArgs),
    /// (Re)build, or drop, the Pyramid Levels supporting a Coverage.
    Pyramidize(PyramidizeArgs),
    /// List Raster Sections within a Coverage.
    List(ListArgs),
    /// List all Coverages registered in the database.
    Catalog,
    /// Render a PNG map of a Coverage window, for quick visual inspection.
    Map(MapArgs),
    /// Check a Coverage (or the whole database) for structural validity.
    Check(CheckArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,

    /// Sample Type keyword: `1-bit 2-bit 4-bit int8 uint8 int16 uint16 int32 uint32 float double`.
    #[arg(long = "sample-type", visible_alias = "smp", value_parser = parse_sample_type)]
    pub sample_type: SampleType,

    /// Pixel Type keyword: `monochrome palette grayscale rgb multiband datagrid`.
    #[arg(long = "pixel-type", visible_alias = "pxl", value_parser = parse_pixel_type)]
    pub pixel_type: PixelType,

    /// Number of Bands.
    #[arg(long = "num-bands", visible_alias = "bds")]
    pub bands: u8,

    /// Compression keyword: `none deflate lzma fax4 gif png lossless_webp lossy_webp jpeg`.
    #[arg(long = "compression", visible_alias = "cpr", value_parser = parse_compression, default_value = "none")]
    pub compression: Compression,

    /// Compression quality, 0-100 (ignored by lossless codecs).
    #[arg(long = "quality", visible_alias = "qty", default_value_t = DEFAULT_QUALITY)]
    pub quality: u8,

    /// Tile Width, in pixels.
    #[arg(long = "tile-width", visible_alias = "tlw", default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_width: u32,

    /// Tile Height, in pixels.
    #[arg(long = "tile-height", visible_alias = "tlh", default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_height: u32,

    /// SRID value.
    #[arg(long = "srid", default_value_t = DEFAULT_SRID)]
    pub srid: i64,

    /// Pixel resolution (X and Y). Overridden by `--x-resol`/`--y-resol` if given.
    #[arg(long = "resolution", visible_alias = "res")]
    pub resolution: Option<f64>,

    /// Pixel resolution, X-specific.
    #[arg(long = "x-resol", visible_alias = "xres")]
    pub x_resol: Option<f64>,

    /// Pixel resolution, Y-specific.
    #[arg(long = "y-resol", visible_alias = "yres")]
    pub y_resol: Option<f64>,

    /// NO-DATA value, applied identically to every band.
    #[arg(long = "no-data", visible_alias = "nd")]
    pub no_data: Option<f64>,

    /// Reject imports whose resolution disagrees with the Coverage's beyond tolerance.
    #[arg(long = "strict-resolution", default_value_t = false)]
    pub strict_resolution: bool,

    /// Allow Sections at independent resolutions (per-section pyramid levels).
    #[arg(long = "mixed-resolutions", default_value_t = false)]
    pub mixed_resolutions: bool,

    /// Record each Section's source file path.
    #[arg(long = "section-paths", default_value_t = false)]
    pub section_paths: bool,

    /// Record each Section's source file MD5.
    #[arg(long = "section-md5", default_value_t = false)]
    pub section_md5: bool,

    /// Record a per-Section statistics summary.
    #[arg(long = "section-summary", default_value_t = false)]
    pub section_summary: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DropArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ImportArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,

    /// Input Image/Raster path (single file).
    #[arg(long = "src-path", visible_alias = "src", conflicts_with = "dir_path")]
    pub src_path: Option<PathBuf>,

    /// Input directory path: every recognised raster file directly under it is imported.
    #[arg(long = "dir-path", visible_alias = "dir", conflicts_with = "src_path")]
    pub dir_path: Option<PathBuf>,

    /// Section's name; defaults to the source file's stem. Ignored with `--dir-path`.
    #[arg(long = "section", visible_alias = "sec")]
    pub section: Option<String>,

    /// Force SRID value, overriding the source's own.
    #[arg(long = "srid")]
    pub srid: Option<i64>,

    /// Immediately build Pyramid levels for the new Section.
    #[arg(long = "pyramidize", visible_alias = "pyr", default_value_t = false)]
    pub pyramidize_now: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,

    /// Output Image/Raster path.
    #[arg(long = "dst-path", visible_alias = "dst")]
    pub dst_path: PathBuf,

    /// Output format keyword: `tiff tiff-tfw geotiff ascii-grid png`.
    #[arg(long = "format", visible_alias = "img", value_parser = parse_export_format)]
    pub format: ExportFormat,

    /// Restrict to one Section, by id. Applies only to mixed-resolution Coverages.
    #[arg(long = "section-id")]
    pub section_id: Option<i64>,

    /// X coordinate, lower-left corner.
    #[arg(long = "min-x", visible_alias = "minx")]
    pub minx: f64,

    /// Y coordinate, lower-left corner.
    #[arg(long = "min-y", visible_alias = "miny")]
    pub miny: f64,

    /// X coordinate, upper-right corner.
    #[arg(long = "max-x", visible_alias = "maxx")]
    pub maxx: f64,

    /// Y coordinate, upper-right corner.
    #[arg(long = "max-y", visible_alias = "maxy")]
    pub maxy: f64,

    /// Output image width, in pixels.
    #[arg(long = "out-width", visible_alias = "outw")]
    pub out_width: u32,

    /// Output image height, in pixels.
    #[arg(long = "out-height", visible_alias = "outh")]
    pub out_height: u32,

    /// NO-DATA value for `ascii-grid` output.
    #[arg(long = "no-data", visible_alias = "nd", default_value_t = -9999.0)]
    pub no_data: f64,
}

/// Egress target keyword for [`ExportArgs::format`] (spec §6 `WriteGeoTiff`,
/// `WriteTiffTfw`, `WriteTiff`, `WriteAsciiGrid`, `GetMapImage`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Tiff,
    TiffTfw,
    GeoTiff,
    AsciiGrid,
    Png,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,

    /// Section's id.
    #[arg(long = "section-id")]
    pub section_id: i64,
}

#[derive(Parser, Debug, Clone)]
pub struct PyramidizeArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,

    /// Section's id.
    #[arg(long = "section-id")]
    pub section_id: i64,

    /// Unconditionally rebuild all Pyramid levels from scratch.
    #[arg(short, long = "force", default_value_t = false)]
    pub force: bool,

    /// Drop the Pyramid levels instead of building them.
    #[arg(long = "drop", default_value_t = false, conflicts_with = "force")]
    pub drop: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,
}

#[derive(Parser, Debug, Clone)]
pub struct MapArgs {
    /// Coverage's name.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: String,

    /// Output PNG path.
    #[arg(long = "dst-path", visible_alias = "dst")]
    pub dst_path: PathBuf,

    /// X coordinate, lower-left corner.
    #[arg(long = "min-x", visible_alias = "minx")]
    pub minx: f64,

    /// Y coordinate, lower-left corner.
    #[arg(long = "min-y", visible_alias = "miny")]
    pub miny: f64,

    /// X coordinate, upper-right corner.
    #[arg(long = "max-x", visible_alias = "maxx")]
    pub maxx: f64,

    /// Y coordinate, upper-right corner.
    #[arg(long = "max-y", visible_alias = "maxy")]
    pub maxy: f64,

    /// Output image width, in pixels.
    #[arg(long = "out-width", visible_alias = "outw")]
    pub out_width: u32,

    /// Output image height, in pixels.
    #[arg(long = "out-height", visible_alias = "outh")]
    pub out_height: u32,
}

#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    /// Coverage's name; omit to check every Coverage in the database.
    #[arg(long = "coverage", visible_alias = "cov")]
    pub coverage: Option<String>,
}

fn parse_sample_type(s: &str) -> Result<SampleType, String> {
    Ok(match s.to_ascii_uppercase().as_str() {
        "1-BIT" | "1BIT" => SampleType::UInt1,
        "2-BIT" | "2BIT" => SampleType::UInt2,
        "4-BIT" | "4BIT" => SampleType::UInt4,
        "INT8" => SampleType::Int8,
        "UINT8" => SampleType::UInt8,
        "INT16" => SampleType::Int16,
        "UINT16" => SampleType::UInt16,
        "INT32" => SampleType::Int32,
        "UINT32" => SampleType::UInt32,
        "FLOAT" => SampleType::Float32,
        "DOUBLE" => SampleType::Float64,
        other => return Err(format!("unrecognised sample type keyword {other:?}")),
    })
}

fn parse_pixel_type(s: &str) -> Result<PixelType, String> {
    Ok(match s.to_ascii_uppercase().as_str() {
        "MONOCHROME" => PixelType::Monochrome,
        "PALETTE" => PixelType::Palette,
        "GRAYSCALE" => PixelType::Grayscale,
        "RGB" => PixelType::Rgb,
        "MULTIBAND" => PixelType::Multiband,
        "DATAGRID" => PixelType::DataGrid,
        other => return Err(format!("unrecognised pixel type keyword {other:?}")),
    })
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    Ok(match s.to_ascii_uppercase().as_str() {
        "NONE" => Compression::None,
        "DEFLATE" => Compression::Deflate,
        "LZMA" => Compression::Lzma,
        "FAX4" => Compression::Fax4,
        "GIF" => Compression::Gif,
        "PNG" => Compression::Png,
        "LOSSLESS_WEBP" => Compression::WebpLossless,
        "LOSSY_WEBP" => Compression::WebpLossy,
        "JPEG" => Compression::Jpeg,
        other => return Err(format!("unrecognised compression keyword {other:?}")),
    })
}

fn parse_export_format(s: &str) -> Result<ExportFormat, String> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "tiff" | "tif" => ExportFormat::Tiff,
        "tiff-tfw" | "tif-tfw" | "tfw" => ExportFormat::TiffTfw,
        "geotiff" | "geotif" => ExportFormat::GeoTiff,
        "ascii-grid" | "asc" | "ascii" => ExportFormat::AsciiGrid,
        "png" => ExportFormat::Png,
        other => return Err(format!("unrecognised export format keyword {other:?}")),
    })
}

impl CreateArgs {
    /// Resolve `--resolution`/`--x-resol`/`--y-resol` into an `(h_res, v_res)`
    /// pair, the way the original tool lets a shared `-res` be overridden by
    /// the axis-specific flags.
    pub fn resolved_resolution(&self) -> Result<(f64, f64), String> {
        let h = self.x_resol.or(self.resolution);
        let v = self.y_resol.or(self.resolution);
        match (h, v) {
            (Some(h), Some(v)) => Ok((h, v)),
            _ => Err("resolution is required: pass --resolution, or both --x-resol and --y-resol".to_string()),
        }
    }
}
