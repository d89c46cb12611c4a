//! Per-coverage schema creation and the coverage catalog (spec §4.5, C5).

mod sql;

pub use sql::{
    count_tiles_for_section, delete_levels_above, delete_section, delete_section_levels_above, delete_tiles_at_level,
    insert_section, insert_tile, insert_tile_data, max_level, max_section_level, query_tiles_in_window,
    select_all_section_ids, select_all_tile_ids, select_levels, select_section, select_section_levels, select_tile_data,
    update_section_stats, upsert_level, upsert_section_level,
};

use rusqlite::{params, Connection, OptionalExtension};

use crate::codec::Compression;
use crate::error::SchemaError;
use crate::pixel::{Palette, Pixel, PixelType, SampleType};

/// The persistent, immutable coverage descriptor (spec §3 "Coverage").
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMeta {
    pub name: String,
    pub sample_type: SampleType,
    pub pixel_type: PixelType,
    pub bands: u8,
    pub compression: Compression,
    pub quality: u8,
    pub tile_width: u32,
    pub tile_height: u32,
    pub srid: i64,
    pub h_res: f64,
    pub v_res: f64,
    pub no_data_pixel: Option<Pixel>,
    pub palette: Option<Palette>,
    pub strict_resolution: bool,
    pub mixed_resolutions: bool,
    pub section_paths: bool,
    pub section_md5: bool,
    pub section_summary: bool,
}

/// Coverage names become table-name fragments; keep them to the conservative
/// identifier subset SQLite and the catalog both tolerate.
pub fn validate_coverage_name(name: &str) -> Result<(), SchemaError> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SchemaError::InvalidCoverageName(name.to_string()))
    }
}

/// Create the full per-coverage table set and register it in the catalog
/// (spec §6 "Persistent layout").
pub fn create_coverage(conn: &Connection, meta: &CoverageMeta) -> Result<(), SchemaError> {
    validate_coverage_name(&meta.name)?;
    conn.execute(sql::CREATE_CATALOG_TABLE, [])?;

    let exists: Option<String> = conn
        .query_row(sql::SELECT_CATALOG_ROW, params![meta.name], |row| row.get(0))
        .optional()?;
    if exists.is_some() {
        return Err(SchemaError::CoverageExists(meta.name.clone()));
    }

    conn.execute(
        sql::INSERT_CATALOG_ROW,
        params![
            meta.name,
            meta.sample_type.code(),
            meta.pixel_type.code(),
            meta.bands,
            meta.compression.code(),
            meta.quality,
            meta.tile_width,
            meta.tile_height,
            meta.srid,
            meta.h_res,
            meta.v_res,
            meta.no_data_pixel.as_ref().map(Pixel::to_blob),
            meta.palette.as_ref().map(Palette::to_blob),
            meta.strict_resolution as i64,
            meta.mixed_resolutions as i64,
            meta.section_paths as i64,
            meta.section_md5 as i64,
            meta.section_summary as i64,
        ],
    )?;

    conn.execute(&sql::create_sections_table(&meta.name), [])?;
    if meta.mixed_resolutions {
        conn.execute(&sql::create_section_levels_table(&meta.name), [])?;
    } else {
        conn.execute(&sql::create_levels_table(&meta.name), [])?;
    }
    conn.execute(&sql::create_tiles_table(&meta.name), [])?;
    conn.execute(&sql::create_tile_data_table(&meta.name), [])?;
    conn.execute(&sql::create_tiles_rtree(&meta.name), [])?;
    conn.execute(&sql::create_tiles_insert_trigger(&meta.name), [])?;
    conn.execute(&sql::create_tiles_delete_trigger(&meta.name), [])?;

    Ok(())
}

/// Drop all five (or six, in mixed-resolution mode) of a coverage's tables
/// plus its rtree/triggers, and remove it from the catalog.
pub fn drop_coverage(conn: &Connection, name: &str) -> Result<(), SchemaError> {
    fetch_coverage(conn, name)?;
    for stmt in sql::drop_coverage_tables(name) {
        conn.execute(&stmt, [])?;
    }
    conn.execute(sql::DELETE_CATALOG_ROW, params![name])?;
    Ok(())
}

fn row_to_meta(row: &rusqlite::Row) -> rusqlite::Result<CoverageMeta> {
    let sample_code: u8 = row.get(1)?;
    let pixel_code: u8 = row.get(2)?;
    let compression_code: u8 = row.get(4)?;
    let no_data_blob: Option<Vec<u8>> = row.get(11)?;
    let palette_blob: Option<Vec<u8>> = row.get(12)?;

    let sample_type = SampleType::from_code(sample_code).unwrap_or(SampleType::UInt8);
    let pixel_type = PixelType::from_code(pixel_code).unwrap_or(PixelType::Grayscale);
    let compression = Compression::from_code(compression_code).unwrap_or(Compression::None);

    Ok(CoverageMeta {
        name: row.get(0)?,
        sample_type,
        pixel_type,
        bands: row.get(3)?,
        compression,
        quality: row.get(5)?,
        tile_width: row.get(6)?,
        tile_height: row.get(7)?,
        srid: row.get(8)?,
        h_res: row.get(9)?,
        v_res: row.get(10)?,
        no_data_pixel: no_data_blob.and_then(|b| Pixel::from_blob(&b).ok()),
        palette: palette_blob.and_then(|b| Palette::from_blob(&b).ok()),
        strict_resolution: row.get::<_, i64>(13)? != 0,
        mixed_resolutions: row.get::<_, i64>(14)? != 0,
        section_paths: row.get::<_, i64>(15)? != 0,
        section_md5: row.get::<_, i64>(16)? != 0,
        section_summary: row.get::<_, i64>(17)? != 0,
    })
}

pub fn fetch_coverage(conn: &Connection, name: &str) -> Result<CoverageMeta, SchemaError> {
    conn.execute(sql::CREATE_CATALOG_TABLE, [])?;
    conn.query_row(sql::SELECT_CATALOG_ROW, params![name], row_to_meta)
        .optional()?
        .ok_or_else(|| SchemaError::CoverageNotFound(name.to_string()))
}

pub fn list_coverages(conn: &Connection) -> Result<Vec<CoverageMeta>, SchemaError> {
    conn.execute(sql::CREATE_CATALOG_TABLE, [])?;
    let mut stmt = conn.prepare(sql::SELECT_ALL_CATALOG_ROWS)?;
    let rows = stmt.query_map([], row_to_meta)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Reject mixing the single-resolution and per-section level tables for one
/// coverage (spec §9 "Mixed-resolution coverages... enforce one mode").
pub fn ensure_level_mode(meta: &CoverageMeta, expects_mixed: bool) -> Result<(), SchemaError> {
    if meta.mixed_resolutions != expects_mixed {
        return Err(SchemaError::MixedResolutionConflict(meta.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, mixed: bool) -> CoverageMeta {
        CoverageMeta {
            name: name.to_string(),
            sample_type: SampleType::UInt8,
            pixel_type: PixelType::Rgb,
            bands: 3,
            compression: Compression::Png,
            quality: 100,
            tile_width: 256,
            tile_height: 256,
            srid: 4326,
            h_res: 0.01,
            v_res: 0.01,
            no_data_pixel: None,
            palette: None,
            strict_resolution: true,
            mixed_resolutions: mixed,
            section_paths: true,
            section_md5: false,
            section_summary: false,
        }
    }

    #[test]
    fn create_then_fetch_roundtrips() {
        let conn = Connection::open_in_memory().unwrap();
        let m = meta("rgb_test", false);
        create_coverage(&conn, &m).unwrap();
        let fetched = fetch_coverage(&conn, "rgb_test").unwrap();
        assert_eq!(fetched, m);
    }

    #[test]
    fn create_twice_fails() {
        let conn = Connection::open_in_memory().unwrap();
        let m = meta("dup", false);
        create_coverage(&conn, &m).unwrap();
        assert!(create_coverage(&conn, &m).is_err());
    }

    #[test]
    fn drop_then_fetch_fails() {
        let conn = Connection::open_in_memory().unwrap();
        let m = meta("transient", false);
        create_coverage(&conn, &m).unwrap();
        drop_coverage(&conn, "transient").unwrap();
        assert!(fetch_coverage(&conn, "transient").is_err());
    }

    #[test]
    fn invalid_name_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let mut m = meta("1bad", false);
        m.name = "1bad".into();
        assert!(create_coverage(&conn, &m).is_err());
    }

    #[test]
    fn list_includes_created_coverages() {
        let conn = Connection::open_in_memory().unwrap();
        create_coverage(&conn, &meta("a", false)).unwrap();
        create_coverage(&conn, &meta("b", true)).unwrap();
        let names: Vec<String> = list_coverages(&conn).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn level_mode_conflict_detected() {
        let m = meta("x", false);
        assert!(ensure_level_mode(&m, false).is_ok());
        assert!(ensure_level_mode(&m, true).is_err());
    }
}
