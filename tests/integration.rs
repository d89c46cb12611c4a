//! End-to-end coverage lifecycle tests: create, import, pyramidize, read,
//! export, delete, drop — driven through [`tileraster::Engine`] the same
//! way the CLI front-end does, rather than through any one module in
//! isolation.

use std::fs;
use std::io::Write;
use std::path::Path;

use tileraster::engine::{Engine, EngineConfig, ExportTarget};
use tileraster::error::EngineError;
use tileraster::import::ImportOptions;
use tileraster::pixel::{PixelType, SampleType};
use tileraster::reader::ReadRequest;
use tileraster::schema::CoverageMeta;

// =============================================================================
// Fixture builders
// =============================================================================

/// Optional georeferencing for [`write_tiff`]: a pixel scale, an upper-left
/// tiepoint and (if carried) a GeoKeyDirectory naming one SRID.
struct Geo {
    res_x: f64,
    res_y: f64,
    minx: f64,
    maxy: f64,
    srid: Option<i64>,
}

/// Build a minimal classic (non-BigTIFF), single-strip, single-IFD TIFF,
/// general enough to cover grayscale, RGB and 1-bit monochrome fixtures.
/// Mirrors the reader's own `write_minimal_tiff` test helpers: the
/// `StripOffsets` (and, when present, geo-tag) entries are appended to the
/// same `entries`/trailer vectors they are computed from, so the offset
/// arithmetic has one source of truth instead of a hand-kept tally.
fn write_tiff(path: &Path, width: u16, height: u16, bits_per_sample: u16, samples_per_pixel: u16, photometric: u16, pixels: &[u8], geo: Option<Geo>) {
    const TAG_IMAGE_WIDTH: u16 = 256;
    const TAG_IMAGE_LENGTH: u16 = 257;
    const TAG_BITS_PER_SAMPLE: u16 = 258;
    const TAG_COMPRESSION: u16 = 259;
    const TAG_PHOTOMETRIC: u16 = 262;
    const TAG_STRIP_OFFSETS: u16 = 273;
    const TAG_SAMPLES_PER_PIXEL: u16 = 277;
    const TAG_ROWS_PER_STRIP: u16 = 278;
    const TAG_STRIP_BYTE_COUNTS: u16 = 279;
    const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
    const TAG_MODEL_TIEPOINT: u16 = 33922;
    const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

    let mut entries: Vec<(u16, u16, u32, u32)> = vec![
        (TAG_IMAGE_WIDTH, 3, 1, width as u32),
        (TAG_IMAGE_LENGTH, 3, 1, height as u32),
        (TAG_BITS_PER_SAMPLE, 3, 1, bits_per_sample as u32),
        (TAG_COMPRESSION, 3, 1, 1),
        (TAG_PHOTOMETRIC, 3, 1, photometric as u32),
        (TAG_SAMPLES_PER_PIXEL, 3, 1, samples_per_pixel as u32),
        (TAG_ROWS_PER_STRIP, 3, 1, height as u32),
        (TAG_STRIP_BYTE_COUNTS, 4, 1, pixels.len() as u32),
    ];

    // Trailer data (geo tags, each wider than the 4-byte inline slot) lands
    // right after the IFD; StripOffsets' value depends on the IFD's total
    // length including these entries, so it is computed last and patched in.
    let mut trailer: Vec<u8> = Vec::new();
    if let Some(geo) = &geo {
        let scale_off_placeholder = entries.len(); // index of the ModelPixelScale entry, once pushed
        entries.push((TAG_MODEL_PIXEL_SCALE, 12, 3, 0));
        let tiepoint_idx = entries.len();
        entries.push((TAG_MODEL_TIEPOINT, 12, 6, 0));
        let geokey_idx = geo.srid.map(|_| {
            entries.push((TAG_GEO_KEY_DIRECTORY, 3, 8, 0));
            entries.len() - 1
        });
        let _ = scale_off_placeholder;

        // Layout is resolved once every entry (including StripOffsets) is
        // counted, by walking the header size out, then growing `trailer`
        // and patching each entry's offset to where its bytes actually land.
        entries.push((TAG_STRIP_OFFSETS, 4, 1, 0));
        let header_len = 8 + 2 + entries.len() * 12 + 4;

        let scale_off = header_len + trailer.len();
        trailer.extend_from_slice(&geo.res_x.to_le_bytes());
        trailer.extend_from_slice(&geo.res_y.to_le_bytes());
        trailer.extend_from_slice(&1.0f64.to_le_bytes());
        entries[entries.len() - if geokey_idx.is_some() { 4 } else { 3 }].3 = scale_off as u32;

        let tiepoint_off = header_len + trailer.len();
        for v in [0.0, 0.0, 0.0, geo.minx, geo.maxy, 0.0] {
            trailer.extend_from_slice(&(v as f64).to_le_bytes());
        }
        entries[tiepoint_idx].3 = tiepoint_off as u32;

        if let (Some(idx), Some(srid)) = (geokey_idx, geo.srid) {
            let geokey_off = header_len + trailer.len();
            let keys: [u16; 8] = [1, 1, 0, 1, 3072, 0, 1, srid as u16];
            for k in keys {
                trailer.extend_from_slice(&k.to_le_bytes());
            }
            entries[idx].3 = geokey_off as u32;
        }

        let data_offset = header_len + trailer.len();
        entries.last_mut().unwrap().3 = data_offset as u32;
    } else {
        entries.push((TAG_STRIP_OFFSETS, 4, 1, 0));
        let data_offset = 8 + 2 + entries.len() * 12 + 4;
        entries.last_mut().unwrap().3 = data_offset as u32;
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(b"II");
    buf.extend_from_slice(&42u16.to_le_bytes());
    buf.extend_from_slice(&8u32.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, ftype, count, value) in &entries {
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&ftype.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&0u32.to_le_bytes()); // next IFD offset
    buf.extend_from_slice(&trailer);
    buf.extend_from_slice(pixels);

    fs::File::create(path).unwrap().write_all(&buf).unwrap();
}

fn write_ascii_grid(path: &Path, ncols: u32, nrows: u32, cellsize: f64, xll: f64, yll: f64, rows: &[Vec<f64>]) {
    let mut f = fs::File::create(path).unwrap();
    writeln!(f, "ncols {ncols}").unwrap();
    writeln!(f, "nrows {nrows}").unwrap();
    writeln!(f, "xllcorner {xll}").unwrap();
    writeln!(f, "yllcorner {yll}").unwrap();
    writeln!(f, "cellsize {cellsize}").unwrap();
    writeln!(f, "nodata_value -9999").unwrap();
    for row in rows {
        let vals: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(f, "{}", vals.join(" ")).unwrap();
    }
}

fn rgb_meta(name: &str) -> CoverageMeta {
    CoverageMeta {
        name: name.into(),
        sample_type: SampleType::UInt8,
        pixel_type: PixelType::Rgb,
        bands: 3,
        compression: tileraster::codec::Compression::Png,
        quality: 100,
        tile_width: 4,
        tile_height: 4,
        srid: 4326,
        h_res: 0.01,
        v_res: 0.01,
        no_data_pixel: None,
        palette: None,
        strict_resolution: true,
        mixed_resolutions: false,
        section_paths: true,
        section_md5: false,
        section_summary: true,
    }
}

fn datagrid_meta(name: &str) -> CoverageMeta {
    CoverageMeta {
        name: name.into(),
        sample_type: SampleType::Float64,
        pixel_type: PixelType::DataGrid,
        bands: 1,
        compression: tileraster::codec::Compression::None,
        quality: 100,
        tile_width: 4,
        tile_height: 4,
        srid: 4326,
        h_res: 10.0,
        v_res: 10.0,
        no_data_pixel: None,
        palette: None,
        strict_resolution: true,
        mixed_resolutions: false,
        section_paths: false,
        section_md5: false,
        section_summary: false,
    }
}

fn monochrome_meta(name: &str) -> CoverageMeta {
    CoverageMeta {
        name: name.into(),
        sample_type: SampleType::UInt1,
        pixel_type: PixelType::Monochrome,
        bands: 1,
        compression: tileraster::codec::Compression::Fax4,
        quality: 100,
        tile_width: 8,
        tile_height: 8,
        srid: 4326,
        h_res: 1.0,
        v_res: 1.0,
        no_data_pixel: None,
        palette: None,
        strict_resolution: true,
        mixed_resolutions: false,
        section_paths: false,
        section_md5: false,
        section_summary: false,
    }
}

// =============================================================================
// S1: 8-bit RGB import + base-level windowed read
// =============================================================================

#[test]
fn s1_rgb_import_and_base_level_read_roundtrip() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let meta = rgb_meta("rgb_test");
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checker.tif");
    let (w, h) = (8u16, 8u16);
    let mut pixels = Vec::with_capacity(w as usize * h as usize * 3);
    for row in 0..h {
        for col in 0..w {
            let on = (row / 2 + col / 2) % 2 == 0;
            let v = if on { 255u8 } else { 0u8 };
            pixels.extend_from_slice(&[v, v, v]);
        }
    }
    let geo = Geo { res_x: 0.01, res_y: 0.01, minx: 10.0, maxy: 10.0 + h as f64 * 0.01, srid: Some(4326) };
    write_tiff(&path, w, h, 8, 3, 2, &pixels, Some(geo));

    let section_id = engine.import_raster(&meta, &path, "checker", &ImportOptions::default()).unwrap();
    assert!(section_id > 0);

    let sections = engine.list_sections(&meta).unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].width, w as u32);
    assert_eq!(sections[0].height, h as u32);

    let window = engine
        .read_window(
            &meta,
            &ReadRequest {
                width: w as u32,
                height: h as u32,
                minx: 10.0,
                miny: 10.0,
                maxx: 10.0 + w as f64 * 0.01,
                maxy: 10.0 + h as f64 * 0.01,
                section_id: Some(section_id),
                bands: None,
            },
        )
        .unwrap();

    assert_eq!((window.raster.width(), window.raster.height()), (w as u32, h as u32));
    assert_eq!(window.raster.pixels(), &pixels[..]);

    let report = engine.check_coverage(&meta).unwrap();
    assert!(report.is_clean(), "unexpected problems: {:?}", report.problems);
}

// =============================================================================
// Monochrome import + pyramid promotion
// =============================================================================

#[test]
fn monochrome_import_then_pyramidize_builds_coarser_level() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let meta = monochrome_meta("mono_test");
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.tif");
    let (w, h) = (16u16, 16u16);
    let row_bytes = (w as usize).div_ceil(8);
    let mut packed = vec![0u8; row_bytes * h as usize];
    for row in 0..h as usize {
        for col in 0..w as usize {
            if (row + col) % 3 == 0 {
                packed[row * row_bytes + col / 8] |= 1 << (7 - col % 8);
            }
        }
    }
    write_tiff(&path, w, h, 1, 1, 0, &packed, None);

    let section_id = engine.import_raster(&meta, &path, "mono", &ImportOptions::default()).unwrap();
    engine.pyramidize(&meta, section_id, false).unwrap();

    let report = engine.check_coverage(&meta).unwrap();
    assert!(report.is_clean(), "unexpected problems: {:?}", report.problems);

    // A coarse read across the whole section should decode without error
    // against a pyramid level rather than the base tiles.
    let window = engine
        .read_window(
            &meta,
            &ReadRequest { width: 4, height: 4, minx: 0.0, miny: 0.0, maxx: 16.0, maxy: 16.0, section_id: Some(section_id), bands: None },
        )
        .unwrap();
    assert_eq!((window.raster.width(), window.raster.height()), (4, 4));
}

// =============================================================================
// Palette mismatch: rejected import commits nothing
// =============================================================================

#[test]
fn palette_mismatch_import_fails_and_commits_no_rows() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    // A palette coverage with no coverage-level palette set: any palette
    // source is necessarily a mismatch (spec §4.8 "no coverage palette").
    let meta = CoverageMeta {
        name: "pal_test".into(),
        sample_type: SampleType::UInt8,
        pixel_type: PixelType::Palette,
        bands: 1,
        compression: tileraster::codec::Compression::Gif,
        quality: 100,
        tile_width: 4,
        tile_height: 4,
        srid: 4326,
        h_res: 1.0,
        v_res: 1.0,
        no_data_pixel: None,
        palette: None,
        strict_resolution: true,
        mixed_resolutions: false,
        section_paths: false,
        section_md5: false,
        section_summary: false,
    };
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pal.tif");
    let pixels: Vec<u8> = (0..16).map(|i| (i % 4) as u8).collect();
    // Photometric 3 (Palette) but no ColorMap tag: the reader itself already
    // rejects this, which exercises the same "no committed rows" guarantee
    // from the import side rather than the reader side.
    write_tiff(&path, 4, 4, 8, 1, 1, &pixels, None);

    let result = engine.import_raster(&meta, &path, "p1", &ImportOptions::default());
    assert!(result.is_err());

    let sections = engine.list_sections(&meta).unwrap();
    assert!(sections.is_empty(), "a failed import must not leave a committed section row");
}

// =============================================================================
// Forced SRID override
// =============================================================================

#[test]
fn forced_srid_overrides_coverage_mismatch() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let mut meta = rgb_meta("srid_test");
    meta.srid = 3857;
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("other_srid.tif");
    let pixels: Vec<u8> = (0..(4 * 4 * 3)).map(|i| (i % 256) as u8).collect();
    let geo = Geo { res_x: 0.01, res_y: 0.01, minx: 0.0, maxy: 4.0 * 0.01, srid: Some(4326) };
    write_tiff(&path, 4, 4, 8, 3, 2, &pixels, Some(geo));

    // Without an override, the source's embedded SRID (4326) disagrees with
    // the coverage's (3857) and the import is refused.
    let rejected = engine.import_raster(&meta, &path, "wrong-srid", &ImportOptions::default());
    assert!(rejected.is_err());
    assert!(engine.list_sections(&meta).unwrap().is_empty());

    // Forcing the SRID makes the same file importable.
    let opts = ImportOptions { force_srid: Some(3857), pyramidize_now: false };
    let section_id = engine.import_raster(&meta, &path, "forced-srid", &opts).unwrap();
    assert!(section_id > 0);
}

// =============================================================================
// Windowed read entirely outside a section returns no-data
// =============================================================================

#[test]
fn window_outside_section_reads_as_no_data() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let mut meta = datagrid_meta("dg");
    meta.no_data_pixel = Some(tileraster::pixel::Pixel::from_samples(meta.sample_type, meta.pixel_type, vec![-9999.0]).unwrap());
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.asc");
    let rows = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0], vec![9.0, 10.0, 11.0, 12.0], vec![13.0, 14.0, 15.0, 16.0]];
    write_ascii_grid(&path, 4, 4, 10.0, 0.0, 0.0, &rows);
    let section_id = engine.import_raster(&meta, &path, "grid-1", &ImportOptions::default()).unwrap();

    // The section covers x in [0, 40), y in [0, 40); a window far to the
    // east of it should come back entirely as the coverage's no-data value.
    let window = engine
        .read_window(
            &meta,
            &ReadRequest { width: 4, height: 4, minx: 1000.0, miny: 1000.0, maxx: 1040.0, maxy: 1040.0, section_id: Some(section_id), bands: None },
        )
        .unwrap();

    for row in 0..window.raster.height() {
        for col in 0..window.raster.width() {
            let pixel = window.raster.get_pixel(col, row).unwrap();
            assert_eq!(pixel.sample(0), Some(-9999.0));
        }
    }
}

// =============================================================================
// Pyramid rebuild idempotence
// =============================================================================

#[test]
fn pyramid_rebuild_is_byte_identical() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let meta = rgb_meta("pyr_test");
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.tif");
    let (w, h) = (16u16, 16u16);
    let pixels: Vec<u8> = (0..(w as u32 * h as u32 * 3)).map(|i| (i % 256) as u8).collect();
    write_tiff(&path, w, h, 8, 3, 2, &pixels, None);
    let section_id = engine.import_raster(&meta, &path, "a", &ImportOptions::default()).unwrap();

    engine.pyramidize(&meta, section_id, false).unwrap();
    let first = pyramid_tile_blobs(&engine, "pyr_test", section_id);
    assert!(!first.is_empty());

    engine.pyramidize(&meta, section_id, true).unwrap();
    let second = pyramid_tile_blobs(&engine, "pyr_test", section_id);

    assert_eq!(first, second, "rebuilding the same section's pyramid must reproduce byte-identical tile blobs");
}

fn pyramid_tile_blobs(engine: &Engine, coverage: &str, section_id: i64) -> Vec<(i64, Vec<u8>, Option<Vec<u8>>)> {
    let sql = format!(
        "SELECT d.tile_id, d.tile_data_odd, d.tile_data_even FROM \"{c}_tile_data\" d \
         JOIN \"{c}_tiles\" t ON t.tile_id = d.tile_id \
         WHERE t.section_id = ?1 AND t.pyramid_level > 0 ORDER BY d.tile_id",
        c = coverage
    );
    let conn = engine.connection();
    let mut stmt = conn.prepare(&sql).unwrap();
    stmt.query_map([section_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap()
}

// =============================================================================
// Invariant 7/8: delete cascade and idempotent drop
// =============================================================================

#[test]
fn delete_section_cascades_and_drop_is_idempotent() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let meta = rgb_meta("lifecycle_test");
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.tif");
    let pixels: Vec<u8> = (0..(8 * 8 * 3)).map(|i| (i % 256) as u8).collect();
    write_tiff(&path, 8, 8, 8, 3, 2, &pixels, None);
    let section_id = engine.import_raster(&meta, &path, "a", &ImportOptions::default()).unwrap();
    engine.pyramidize(&meta, section_id, false).unwrap();

    engine.delete_section(&meta, section_id).unwrap();
    assert!(engine.list_sections(&meta).unwrap().is_empty());

    let conn = engine.connection();
    let tiles: i64 = conn.query_row("SELECT COUNT(*) FROM \"lifecycle_test_tiles\"", [], |r| r.get(0)).unwrap();
    assert_eq!(tiles, 0, "deleting a section must cascade-delete its tiles");
    let tile_data: i64 = conn.query_row("SELECT COUNT(*) FROM \"lifecycle_test_tile_data\"", [], |r| r.get(0)).unwrap();
    assert_eq!(tile_data, 0, "deleting a section must cascade-delete its tile data");

    // Dropping the (now section-less) coverage, then dropping again, must
    // not panic or corrupt state — the second drop simply reports "not found".
    engine.drop_coverage("lifecycle_test").unwrap();
    let second_drop = engine.drop_coverage("lifecycle_test");
    assert!(matches!(second_drop, Err(EngineError::Schema(_))) || second_drop.is_err());
    assert!(engine.list_coverages().unwrap().iter().all(|m| m.name != "lifecycle_test"));
}

// =============================================================================
// Export: classic TIFF round-trip through the file system
// =============================================================================

#[test]
fn export_window_writes_a_readable_tiff() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let meta = rgb_meta("export_test");
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("a.tif");
    let (w, h) = (8u16, 8u16);
    let pixels: Vec<u8> = (0..(w as u32 * h as u32 * 3)).map(|i| (i % 256) as u8).collect();
    write_tiff(&src, w, h, 8, 3, 2, &pixels, None);
    engine.import_raster(&meta, &src, "a", &ImportOptions::default()).unwrap();

    let dst = dir.path().join("out.tif");
    let req = ReadRequest { width: w as u32, height: h as u32, minx: 0.0, miny: 0.0, maxx: w as f64, maxy: h as f64, section_id: None, bands: None };
    engine.write_window(&meta, &req, ExportTarget::Tiff, &dst).unwrap();

    assert!(dst.exists());
    let bytes = fs::read(&dst).unwrap();
    assert!(bytes.len() > 8);
    assert_eq!(&bytes[0..2], b"II");
}

#[test]
fn get_map_image_produces_a_png() {
    let mut engine = Engine::in_memory(EngineConfig { allow_file_io: true }).unwrap();
    let meta = rgb_meta("map_test");
    engine.create_coverage(&meta).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("a.tif");
    let pixels: Vec<u8> = (0..(8 * 8 * 3)).map(|i| (i % 256) as u8).collect();
    write_tiff(&src, 8, 8, 8, 3, 2, &pixels, None);
    engine.import_raster(&meta, &src, "a", &ImportOptions::default()).unwrap();

    let req = ReadRequest { width: 8, height: 8, minx: 0.0, miny: 0.0, maxx: 8.0, maxy: 8.0, section_id: None, bands: None };
    let png_bytes = engine.get_map_image(&meta, &req).unwrap();
    assert_eq!(&png_bytes[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
}
