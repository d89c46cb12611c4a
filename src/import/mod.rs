//! Import pipeline orchestration (spec §4.8, C8).
//!
//! Every step here runs inside the caller's already-open transaction
//! (`crate::Engine::import_raster` owns `BEGIN`/`COMMIT`); nothing in this
//! module opens or commits one itself, matching [`crate::writer`]'s
//! transaction discipline (spec §5).

pub mod readers;

use std::fs;
use std::path::Path;

use rusqlite::Connection;

use crate::codec::{self, grayscale_to_rgb, rgb_to_grayscale};
use crate::error::{CodecError, ImportError, PixelError};
use crate::pixel::{Pixel, PixelType};
use crate::planner::resolution_compatible;
use crate::raster::{prime_void_tile, Raster};
use crate::schema::CoverageMeta;
use crate::stats::{self, RasterStatistics};
use crate::writer;

use readers::SourceRaster;

/// Caller-supplied overrides for one import (spec §4.8 "Input").
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Overrides the source's (or coverage's) SRID unconditionally.
    pub force_srid: Option<i64>,
    /// Run C10 for the new section immediately after its tiles land.
    pub pyramidize_now: bool,
}

fn wrap_pixel(e: PixelError) -> ImportError {
    ImportError::from(CodecError::from(e))
}

/// Import one source file into `meta`'s coverage, returning the new
/// `section_id` (spec §4.8 steps 1-7).
///
/// `section_name` becomes the section row's `section_name`; it is the
/// caller's business to pick one (e.g. the file stem).
pub fn import_raster(conn: &Connection, meta: &CoverageMeta, path: &Path, section_name: &str, opts: &ImportOptions) -> Result<i64, ImportError> {
    let source = readers::read_source(path)?;
    let summary = build_xml_summary(path, &source);
    let prepared = prepare_source(meta, source, opts.force_srid)?;

    let bbox = (prepared.minx, prepared.miny, prepared.maxx, prepared.maxy);
    let width = prepared.raster.width();
    let height = prepared.raster.height();

    let file_path = meta.section_paths.then(|| path.display().to_string());
    let md5 = if meta.section_md5 {
        let bytes = fs::read(path).map_err(|e| ImportError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Some(format!("{:x}", md5::compute(&bytes)))
    } else {
        None
    };
    let summary = meta.section_summary.then_some(summary);

    let section_id = writer::insert_section(
        conn,
        &meta.name,
        section_name,
        file_path.as_deref(),
        md5.as_deref(),
        summary.as_deref(),
        width,
        height,
        bbox,
    )?;

    writer::insert_level(
        conn,
        &meta.name,
        meta.mixed_resolutions,
        meta.mixed_resolutions.then_some(section_id),
        0,
        meta.h_res,
        meta.v_res,
    )?;

    let no_data = meta
        .no_data_pixel
        .clone()
        .map_or_else(|| Pixel::default_no_data(meta.sample_type, meta.pixel_type, meta.bands), Ok)
        .map_err(wrap_pixel)?;

    let mut tile_stats: Vec<RasterStatistics> = Vec::new();
    let mut row = 0u32;
    while row < height {
        let mut col = 0u32;
        while col < width {
            let tile = extract_tile(&prepared.raster, col, row, meta.tile_width, meta.tile_height, &no_data)?;
            let (odd, even) = codec::encode(&tile, meta.compression, meta.quality)?;

            let tile_bbox = (
                prepared.minx + col as f64 * prepared.res_x,
                prepared.maxy - (row + meta.tile_height) as f64 * prepared.res_y,
                prepared.minx + (col + meta.tile_width) as f64 * prepared.res_x,
                prepared.maxy - row as f64 * prepared.res_y,
            );
            writer::insert_tile(conn, &meta.name, section_id, 0, tile_bbox, &odd, even.as_deref())?;

            tile_stats.push(stats::compute_tile_stats(&tile)?);

            col += meta.tile_width;
        }
        row += meta.tile_height;
    }

    let section_stats = stats::aggregate(&tile_stats)?;
    writer::update_section_stats(conn, &meta.name, section_id, &section_stats.to_blob(meta.sample_type))?;

    if opts.pyramidize_now {
        crate::pyramid::build_pyramid(conn, meta, section_id, false)?;
    }

    Ok(section_id)
}

/// The source raster after compatibility checking, palette remap and any
/// permitted conversion — plus the georeferencing the tile loop needs
/// (spec §4.8 step 2).
struct PreparedSource {
    raster: Raster,
    minx: f64,
    miny: f64,
    maxx: f64,
    maxy: f64,
    res_x: f64,
    res_y: f64,
}

/// Apply spec §4.8's compatibility rules, failing with `CoverageMismatch`
/// on the first violation.
fn prepare_source(meta: &CoverageMeta, source: SourceRaster, force_srid: Option<i64>) -> Result<PreparedSource, ImportError> {
    match (force_srid, source.srid) {
        (Some(_), _) => {}
        (None, Some(src_srid)) if src_srid != meta.srid => {
            return Err(ImportError::CoverageMismatch {
                reason: format!("source SRID {src_srid} does not match coverage SRID {}", meta.srid),
            })
        }
        (None, _) => {}
    }

    if !resolution_compatible(meta, source.res_x, source.res_y) {
        return Err(ImportError::CoverageMismatch {
            reason: format!(
                "source resolution ({}, {}) is incompatible with coverage resolution ({}, {})",
                source.res_x, source.res_y, meta.h_res, meta.v_res
            ),
        });
    }

    let mut raster = source.raster;
    if raster.pixel_type() != meta.pixel_type {
        raster = convert_pixel_type(&raster, meta.pixel_type, source.allow_grayscale_rgb_conversion)?;
    }

    if raster.sample_type() != meta.sample_type || raster.bands() != meta.bands {
        return Err(ImportError::CoverageMismatch {
            reason: format!(
                "source shape sample={:?} pixel={:?} bands={} does not match coverage sample={:?} pixel={:?} bands={}",
                raster.sample_type(),
                raster.pixel_type(),
                raster.bands(),
                meta.sample_type,
                meta.pixel_type,
                meta.bands
            ),
        });
    }

    if meta.pixel_type == PixelType::Palette {
        let coverage_palette = meta.palette.as_ref().ok_or_else(|| ImportError::CoverageMismatch {
            reason: "palette coverage has no coverage palette".into(),
        })?;
        let source_palette = raster.palette().ok_or_else(|| ImportError::CoverageMismatch {
            reason: "source carries no palette".into(),
        })?;
        let remap = source_palette.subset_remap(coverage_palette).ok_or_else(|| ImportError::CoverageMismatch {
            reason: "source palette is not a subset of the coverage palette".into(),
        })?;
        raster = remap_palette_indices(&raster, &remap)?;
        raster.set_palette(coverage_palette.clone()).map_err(wrap_pixel)?;
    }

    Ok(PreparedSource {
        raster,
        minx: source.minx,
        miny: source.miny,
        maxx: source.maxx,
        maxy: source.maxy,
        res_x: source.res_x,
        res_y: source.res_y,
    })
}

/// The only conversion spec §4.8 permits: a JPEG source's RGB&lt;-&gt;grayscale,
/// gated on the reader having set `allow_grayscale_rgb_conversion`.
fn convert_pixel_type(raster: &Raster, target: PixelType, allow_jpeg_conversion: bool) -> Result<Raster, ImportError> {
    match (raster.pixel_type(), target) {
        (PixelType::Rgb, PixelType::Grayscale) if allow_jpeg_conversion => rgb_to_grayscale(raster).map_err(wrap_pixel),
        (PixelType::Grayscale, PixelType::Rgb) if allow_jpeg_conversion => grayscale_to_rgb(raster).map_err(wrap_pixel),
        _ => Err(ImportError::CoverageMismatch {
            reason: format!("source pixel type {:?} does not match coverage pixel type {target:?} and no conversion is permitted", raster.pixel_type()),
        }),
    }
}

fn remap_palette_indices(raster: &Raster, remap: &[u8]) -> Result<Raster, ImportError> {
    let mut out = Raster::allocate(raster.width(), raster.height(), raster.sample_type(), PixelType::Palette, 1).map_err(wrap_pixel)?;
    for row in 0..raster.height() {
        for col in 0..raster.width() {
            let p = raster.get_pixel(col, row).map_err(wrap_pixel)?;
            let old_index = p.sample(0).unwrap_or(0.0) as usize;
            let new_index = *remap.get(old_index).ok_or_else(|| ImportError::CoverageMismatch {
                reason: format!("palette index {old_index} out of remap range"),
            })? as f64;
            let mut np = Pixel::from_samples(raster.sample_type(), PixelType::Palette, vec![new_index]).map_err(wrap_pixel)?;
            np.set_transparent(p.is_transparent());
            out.set_pixel(col, row, &np).map_err(wrap_pixel)?;
        }
    }
    Ok(out)
}

/// Cut a `tile_width x tile_height` window out of `source` starting at
/// `(col, row)`, padding pixels past the source's edges with `no_data`
/// (spec §4.8 step 4a).
fn extract_tile(source: &Raster, col: u32, row: u32, tile_width: u32, tile_height: u32, no_data: &Pixel) -> Result<Raster, ImportError> {
    let mut tile = Raster::allocate(tile_width, tile_height, source.sample_type(), source.pixel_type(), source.bands()).map_err(wrap_pixel)?;
    tile.ensure_mask();
    prime_void_tile(&mut tile, no_data).map_err(wrap_pixel)?;

    let rows = tile_height.min(source.height().saturating_sub(row));
    let cols = tile_width.min(source.width().saturating_sub(col));
    for r in 0..rows {
        for c in 0..cols {
            let pixel = source.get_pixel(col + c, row + r).map_err(wrap_pixel)?;
            tile.set_pixel(c, r, &pixel).map_err(wrap_pixel)?;
        }
    }

    if let Some(palette) = source.palette() {
        tile.set_palette(palette.clone()).map_err(wrap_pixel)?;
    }

    Ok(tile)
}

/// A short XML descriptor of the imported source, the same textual role as
/// the original's per-format `rl2_build_*_xml_summary` helpers (spec §4.8
/// "Recording"), collapsed into one format-agnostic tag here.
fn build_xml_summary(path: &Path, source: &SourceRaster) -> String {
    format!(
        "<RasterSummary file=\"{}\" width=\"{}\" height=\"{}\" resX=\"{}\" resY=\"{}\" sampleType=\"{:?}\" pixelType=\"{:?}\" bands=\"{}\"/>",
        path.display(),
        source.width(),
        source.height(),
        source.res_x,
        source.res_y,
        source.raster.sample_type(),
        source.raster.pixel_type(),
        source.raster.bands(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;
    use crate::pixel::SampleType;
    use crate::schema::create_coverage;
    use std::io::Write;

    fn gray_coverage(conn: &Connection, name: &str, tile: u32) -> CoverageMeta {
        let meta = CoverageMeta {
            name: name.into(),
            sample_type: SampleType::Float64,
            pixel_type: PixelType::DataGrid,
            bands: 1,
            compression: Compression::None,
            quality: 100,
            tile_width: tile,
            tile_height: tile,
            srid: 4326,
            h_res: 10.0,
            v_res: 10.0,
            no_data_pixel: None,
            palette: None,
            strict_resolution: true,
            mixed_resolutions: false,
            section_paths: true,
            section_md5: true,
            section_summary: true,
        };
        create_coverage(conn, &meta).unwrap();
        meta
    }

    fn write_ascii_grid(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("grid.asc");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "ncols 4").unwrap();
        writeln!(f, "nrows 4").unwrap();
        writeln!(f, "xllcorner 0.0").unwrap();
        writeln!(f, "yllcorner 0.0").unwrap();
        writeln!(f, "cellsize 10.0").unwrap();
        for r in 0..4 {
            let vals: Vec<String> = (0..4).map(|c| format!("{}", r * 4 + c)).collect();
            writeln!(f, "{}", vals.join(" ")).unwrap();
        }
        path
    }

    #[test]
    fn imports_ascii_grid_into_matching_coverage() {
        let conn = Connection::open_in_memory().unwrap();
        let meta = gray_coverage(&conn, "grid", 2);
        let dir = tempfile::tempdir().unwrap();
        let path = write_ascii_grid(dir.path());

        let section_id = import_raster(&conn, &meta, &path, "grid-1", &ImportOptions::default()).unwrap();
        assert!(section_id > 0);

        let tile_count: i64 = conn.query_row("SELECT COUNT(*) FROM \"grid_tiles\"", [], |r| r.get(0)).unwrap();
        assert_eq!(tile_count, 4); // 4x4 grid cut into 2x2 tiles

        let stats_blob: Vec<u8> = conn
            .query_row("SELECT statistics FROM \"grid_sections\" WHERE section_id = ?1", [section_id], |r| r.get(0))
            .unwrap();
        let stats = RasterStatistics::from_blob(&stats_blob, SampleType::Float64, 1).unwrap();
        assert_eq!(stats.valid_pixel_count, 16);
    }

    #[test]
    fn rejects_mismatched_resolution() {
        let conn = Connection::open_in_memory().unwrap();
        let mut meta = gray_coverage(&conn, "grid2", 2);
        meta.h_res = 1.0;
        meta.v_res = 1.0;
        let dir = tempfile::tempdir().unwrap();
        let path = write_ascii_grid(dir.path());
        assert!(import_raster(&conn, &meta, &path, "grid-1", &ImportOptions::default()).is_err());
    }

    #[test]
    fn records_path_md5_and_summary_when_flagged() {
        let conn = Connection::open_in_memory().unwrap();
        let meta = gray_coverage(&conn, "grid3", 4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_ascii_grid(dir.path());
        let section_id = import_raster(&conn, &meta, &path, "grid-1", &ImportOptions::default()).unwrap();

        let (file_path, md5, summary): (Option<String>, Option<String>, Option<String>) = conn
            .query_row(
                "SELECT file_path, md5, summary FROM \"grid3_sections\" WHERE section_id = ?1",
                [section_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert!(file_path.is_some());
        assert!(md5.is_some());
        assert!(summary.unwrap().contains("RasterSummary"));
    }
}
