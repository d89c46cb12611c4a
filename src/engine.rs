//! The storage engine's embedding façade (spec §5 "Transaction discipline",
//! §9 "no ambient global state"): one [`Engine`] per open connection, owning
//! every `BEGIN`/`COMMIT` the rest of the crate assumes is already open.
//!
//! [`crate::writer`], [`crate::import`] and [`crate::pyramid`] all take
//! `&Connection` and never start a transaction themselves; `Engine` is where
//! that transaction is actually opened, a `rusqlite::Transaction` derefing to
//! `&Connection` at every call site below. Read-only entry points
//! (`read_window`, `list_coverages`, `check_coverage`) skip the transaction
//! since SQLite's own read consistency within one connection already covers
//! them.

use std::path::Path;

use rusqlite::Connection;

use crate::codec;
use crate::error::{EngineError, ExportError, ImportError};
use crate::export;
use crate::import::{self, ImportOptions};
use crate::pyramid;
use crate::reader::{self, ReadRequest, WindowRaster};
use crate::schema::{self, CoverageMeta};

/// Explicit, per-`Engine` configuration in place of the original's
/// `SPATIALITE_SECURITY` environment variable (spec §6, §9 "global state"):
/// the caller sets this once when opening the engine rather than every file
/// operation re-sampling process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
    /// Gates every file-touching entry point: `import_raster` and the
    /// `export` module's writers. `false` (the default) matches
    /// `SPATIALITE_SECURITY` unset or not `"relaxed"`.
    pub allow_file_io: bool,
}

/// An open raster database: one `rusqlite::Connection` plus the
/// configuration that gates file I/O.
pub struct Engine {
    conn: Connection,
    config: EngineConfig,
}

impl Engine {
    /// Open (or create) a database file at `path`.
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, config)
    }

    /// An in-memory database, for tests and scratch pipelines.
    pub fn in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: EngineConfig) -> Result<Self, EngineError> {
        // SQLite defaults this off; without it the `ON DELETE CASCADE`
        // clauses on every coverage's tiles/tile_data/section_levels tables
        // are inert and `delete_section` silently orphans rows (spec §8
        // invariant 7 "Delete cascade").
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Engine { conn, config })
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// The underlying connection, for callers that need to inspect raw
    /// table state (diagnostics, integration tests) beyond what the
    /// higher-level methods expose.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Register a new coverage and its per-coverage table set (spec §6
    /// `CreateCoverage`).
    pub fn create_coverage(&mut self, meta: &CoverageMeta) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        schema::create_coverage(&tx, meta)?;
        tx.commit()?;
        Ok(())
    }

    /// Drop a coverage's tables and its catalog row (spec §6 `DropCoverage`,
    /// spec §8 invariant 8 "Idempotent drop": calling this on an already-gone
    /// coverage returns `SchemaError::CoverageNotFound`, never a panic).
    pub fn drop_coverage(&mut self, name: &str) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        schema::drop_coverage(&tx, name)?;
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_coverage(&self, name: &str) -> Result<CoverageMeta, EngineError> {
        Ok(schema::fetch_coverage(&self.conn, name)?)
    }

    pub fn list_coverages(&self) -> Result<Vec<CoverageMeta>, EngineError> {
        Ok(schema::list_coverages(&self.conn)?)
    }

    /// List every Section registered in `meta`'s coverage (spec §6 CLI `list` verb).
    pub fn list_sections(&self, meta: &CoverageMeta) -> Result<Vec<SectionSummary>, EngineError> {
        let mut id_stmt = self.conn.prepare(&schema::select_all_section_ids(&meta.name))?;
        let ids: Vec<i64> = id_stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
        let mut out = Vec::with_capacity(ids.len());
        for section_id in ids {
            let row = self.conn.query_row(&schema::select_section(&meta.name), rusqlite::params![section_id], |r| {
                Ok(SectionSummary {
                    section_id: r.get(0)?,
                    section_name: r.get(1)?,
                    width: r.get(5)?,
                    height: r.get(6)?,
                    minx: r.get(7)?,
                    miny: r.get(8)?,
                    maxx: r.get(9)?,
                    maxy: r.get(10)?,
                })
            })?;
            out.push(row);
        }
        Ok(out)
    }

    /// Import one source file into `meta`'s coverage (spec §6 `LoadRaster`),
    /// refusing if `EngineConfig::allow_file_io` is false.
    pub fn import_raster(&mut self, meta: &CoverageMeta, path: impl AsRef<Path>, section_name: &str, opts: &ImportOptions) -> Result<i64, EngineError> {
        if !self.config.allow_file_io {
            return Err(EngineError::from(ImportError::FileIoDisabled));
        }
        let tx = self.conn.transaction()?;
        let section_id = import::import_raster(&tx, meta, path.as_ref(), section_name, opts)?;
        tx.commit()?;
        Ok(section_id)
    }

    /// Import every recognised raster file directly under `dir`, in
    /// directory order, skipping (but recording) files a reader rejects
    /// rather than aborting the whole batch (spec §6 `LoadRastersFromDir`).
    pub fn import_rasters_from_dir(&mut self, meta: &CoverageMeta, dir: impl AsRef<Path>, opts: &ImportOptions) -> Result<ImportBatchReport, EngineError> {
        if !self.config.allow_file_io {
            return Err(EngineError::from(ImportError::FileIoDisabled));
        }
        let mut report = ImportBatchReport::default();
        let mut entries: Vec<_> = std::fs::read_dir(dir.as_ref())
            .map_err(|e| EngineError::Io(e.to_string()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        for path in entries {
            let section_name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("section").to_string();
            let tx = self.conn.transaction()?;
            match import::import_raster(&tx, meta, &path, &section_name, opts) {
                Ok(section_id) => {
                    tx.commit()?;
                    report.imported.push(section_id);
                }
                Err(e) => {
                    tx.rollback()?;
                    report.skipped.push((path.display().to_string(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Delete one section and (via `ON DELETE CASCADE`, now that foreign keys
    /// are enabled) everything that references it (spec §6 `DeleteSection`).
    pub fn delete_section(&mut self, meta: &CoverageMeta, section_id: i64) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        tx.execute(&schema::delete_section(&meta.name), rusqlite::params![section_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Build every pyramid level above the base for `section_id` (spec §6 `Pyramidize`).
    pub fn pyramidize(&mut self, meta: &CoverageMeta, section_id: i64, force: bool) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        pyramid::build_pyramid(&tx, meta, section_id, force)?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every pyramid level above the base for `section_id` (spec §6 `DePyramidize`).
    pub fn depyramidize(&mut self, meta: &CoverageMeta, section_id: i64) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        pyramid::drop_pyramid(&tx, meta, section_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Read one window out of `meta`'s coverage (spec §6 `GetMapImage` and
    /// friends all start here).
    pub fn read_window(&self, meta: &CoverageMeta, req: &ReadRequest) -> Result<WindowRaster, EngineError> {
        Ok(reader::read_window(&self.conn, meta, req)?)
    }

    /// Render a window as a standalone PNG (spec §6 `GetMapImage`).
    pub fn get_map_image(&self, meta: &CoverageMeta, req: &ReadRequest) -> Result<Vec<u8>, EngineError> {
        let window = self.read_window(meta, req)?;
        Ok(export::get_map_image(&window.raster)?)
    }

    /// Write a window out as one of the file formats in [`crate::export`],
    /// refusing if `EngineConfig::allow_file_io` is false (spec §6
    /// `WriteGeoTiff`/`WriteTiffTfw`/`WriteTiff`/`WriteAsciiGrid`).
    pub fn write_window(&self, meta: &CoverageMeta, req: &ReadRequest, target: ExportTarget, path: impl AsRef<Path>) -> Result<(), EngineError> {
        if !self.config.allow_file_io {
            return Err(EngineError::from(ExportError::FileIoDisabled));
        }
        let window = self.read_window(meta, req)?;
        let (res_x, res_y) = window_resolution(req);
        match target {
            ExportTarget::Tiff => export::write_tiff(&window.raster, path.as_ref())?,
            ExportTarget::TiffTfw => export::write_tiff_tfw(&window.raster, res_x, res_y, req.minx, req.maxy, path.as_ref())?,
            ExportTarget::GeoTiff => export::write_geotiff(&window.raster, res_x, res_y, req.minx, req.maxy, meta.srid, path.as_ref())?,
            ExportTarget::AsciiGrid { no_data } => {
                let cellsize = if (res_x - res_y).abs() > f64::EPSILON {
                    return Err(EngineError::InvalidArgument("ASCII grid export requires square cells".into()));
                } else {
                    res_x
                };
                export::write_ascii_grid(&window.raster, req.minx, req.miny, cellsize, no_data, path.as_ref())?
            }
        }
        Ok(())
    }

    /// Sweep every tile and section statistics blob in a coverage, decoding
    /// (without materializing a window) to catch corruption the insert path
    /// should never have let through (spec §6 `IsValidRasterTile`,
    /// `IsValidRasterStatistics`).
    pub fn check_coverage(&self, meta: &CoverageMeta) -> Result<CheckReport, EngineError> {
        let mut report = CheckReport::default();

        let mut section_stmt = self.conn.prepare(&schema::select_all_section_ids(&meta.name))?;
        let section_ids: Vec<i64> = section_stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
        for section_id in &section_ids {
            report.sections_checked += 1;
            let statistics: Option<Vec<u8>> = self.conn.query_row(&schema::select_section(&meta.name), rusqlite::params![section_id], |r| r.get(11))?;
            if let Some(blob) = statistics {
                if let Err(e) = crate::stats::RasterStatistics::from_blob(&blob, meta.sample_type, meta.bands as usize) {
                    report.problems.push(format!("section {section_id}: bad statistics blob: {e}"));
                }
            }
        }

        let mut tile_stmt = self.conn.prepare(&schema::select_all_tile_ids(&meta.name))?;
        let tile_ids: Vec<i64> = tile_stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;
        for tile_id in tile_ids {
            report.tiles_checked += 1;
            let (odd, even): (Vec<u8>, Option<Vec<u8>>) =
                self.conn.query_row(&schema::select_tile_data(&meta.name), rusqlite::params![tile_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
            if let Err(e) = codec::decode(&odd, even.as_deref(), 1, meta.palette.as_ref()) {
                report.problems.push(format!("tile {tile_id}: bad tile blob: {e}"));
            }
        }

        Ok(report)
    }
}

fn window_resolution(req: &ReadRequest) -> (f64, f64) {
    ((req.maxx - req.minx) / req.width as f64, (req.maxy - req.miny) / req.height as f64)
}

/// One of the file formats [`crate::export`] can write a window as.
pub enum ExportTarget {
    Tiff,
    TiffTfw,
    GeoTiff,
    AsciiGrid { no_data: f64 },
}

/// One row of [`Engine::list_sections`]'s output.
#[derive(Debug, Clone)]
pub struct SectionSummary {
    pub section_id: i64,
    pub section_name: String,
    pub width: u32,
    pub height: u32,
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

/// Outcome of [`Engine::import_rasters_from_dir`]: every section that landed,
/// and every file skipped with the reason why (spec §6 `LoadRastersFromDir`).
#[derive(Debug, Default)]
pub struct ImportBatchReport {
    pub imported: Vec<i64>,
    pub skipped: Vec<(String, String)>,
}

/// Outcome of [`Engine::check_coverage`]: counts swept plus a flat list of
/// problems found, empty when the coverage is fully consistent.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub sections_checked: u64,
    pub tiles_checked: u64,
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}
