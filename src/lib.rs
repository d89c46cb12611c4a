//! # tileraster
//!
//! A tiled, pyramidal raster storage engine backed by an embedded SQLite
//! database, modeled on librasterlite2's RasterLite2 format.
//!
//! This library provides the core functionality for storing large rasters
//! (satellite imagery, whole-slide images, elevation grids) as a pyramid of
//! compressed tiles inside a single SQLite file, queryable by spatial window
//! at any resolution without re-decoding the whole source.
//!
//! ## Features
//!
//! - **Tiled, pyramidal storage**: rasters are imported as a base-level tile
//!   grid plus coarser pyramid levels built on demand.
//! - **Closed codec family**: none/deflate/lzma/fax4/gif/png/webp/jpeg, with
//!   lossy codecs carrying a residual blob for lossless scale-1 reconstruction.
//! - **Spatial indexing**: an R*Tree virtual table keeps windowed reads fast
//!   regardless of coverage size.
//! - **Raster egress**: classic TIFF, GeoTIFF, worldfile TIFF, ASCII grid and
//!   PNG map rendering.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`pixel`] - sample/pixel type tags, pixel values, palettes
//! - [`raster`] - the in-memory raster buffer
//! - [`codec`] - the tile blob codec family and PNG map rendering
//! - [`stats`] - per-band raster statistics and their aggregation
//! - [`schema`] - per-coverage table DDL and the coverage catalog
//! - [`planner`] - resolution planning for windowed reads
//! - [`writer`] - low-level tile/section/level persistence
//! - [`import`] - the file-to-coverage import pipeline
//! - [`reader`] - the windowed reader
//! - [`pyramid`] - pyramid level construction and teardown
//! - [`export`] - raster egress (TIFF, GeoTIFF, ASCII grid, PNG)
//! - [`engine`] - the `Engine` façade: transactions, file-I/O gating
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use tileraster::config::Cli;
//!
//! fn main() {
//!     let cli = Cli::parse();
//!     println!("operating on {}", cli.db.display());
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod import;
pub mod pixel;
pub mod planner;
pub mod pyramid;
pub mod raster;
pub mod reader;
pub mod schema;
pub mod stats;
pub mod writer;

pub use config::{Cli, Command};
pub use engine::{CheckReport, Engine, EngineConfig, ExportTarget, ImportBatchReport, SectionSummary};
pub use error::EngineError;
pub use import::ImportOptions;
pub use reader::{ReadRequest, WindowRaster};
pub use schema::CoverageMeta;
