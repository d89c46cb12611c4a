//! DDL/DML string constants and generators for per-coverage tables (spec §4.5,
//! §9 "Spatial index integration"). Centralizing SQL as plain `&str`/`String`
//! mirrors how the retrieved pack's rusqlite-backed geo stores keep their
//! schema close to the queries that use it rather than behind an ORM.

pub const CREATE_CATALOG_TABLE: &str = "
CREATE TABLE IF NOT EXISTS raster_coverages (
    name TEXT PRIMARY KEY,
    sample_type INTEGER NOT NULL,
    pixel_type INTEGER NOT NULL,
    num_bands INTEGER NOT NULL,
    compression INTEGER NOT NULL,
    quality INTEGER NOT NULL,
    tile_width INTEGER NOT NULL,
    tile_height INTEGER NOT NULL,
    srid INTEGER NOT NULL,
    h_res REAL NOT NULL,
    v_res REAL NOT NULL,
    nodata_pixel BLOB,
    palette BLOB,
    strict_resolution INTEGER NOT NULL,
    mixed_resolutions INTEGER NOT NULL,
    section_paths INTEGER NOT NULL,
    section_md5 INTEGER NOT NULL,
    section_summary INTEGER NOT NULL
)";

pub const INSERT_CATALOG_ROW: &str = "
INSERT INTO raster_coverages (
    name, sample_type, pixel_type, num_bands, compression, quality,
    tile_width, tile_height, srid, h_res, v_res, nodata_pixel, palette,
    strict_resolution, mixed_resolutions, section_paths, section_md5, section_summary
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)";

pub const SELECT_CATALOG_ROW: &str = "SELECT
    name, sample_type, pixel_type, num_bands, compression, quality,
    tile_width, tile_height, srid, h_res, v_res, nodata_pixel, palette,
    strict_resolution, mixed_resolutions, section_paths, section_md5, section_summary
    FROM raster_coverages WHERE name = ?1";

pub const SELECT_ALL_CATALOG_ROWS: &str = "SELECT
    name, sample_type, pixel_type, num_bands, compression, quality,
    tile_width, tile_height, srid, h_res, v_res, nodata_pixel, palette,
    strict_resolution, mixed_resolutions, section_paths, section_md5, section_summary
    FROM raster_coverages ORDER BY name";

pub const DELETE_CATALOG_ROW: &str = "DELETE FROM raster_coverages WHERE name = ?1";

/// Quote an identifier derived from a coverage name. Coverage names are
/// validated (`schema::validate_coverage_name`) before they ever reach SQL
/// text, so this only guards against accidental embedded quotes.
fn ident(raw: &str) -> String {
    raw.replace('"', "")
}

pub fn create_sections_table(coverage: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{0}_sections\" (
            section_id INTEGER PRIMARY KEY AUTOINCREMENT,
            section_name TEXT NOT NULL,
            file_path TEXT,
            md5 TEXT,
            summary TEXT,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            minx REAL NOT NULL,
            miny REAL NOT NULL,
            maxx REAL NOT NULL,
            maxy REAL NOT NULL,
            statistics BLOB
        )",
        ident(coverage)
    )
}

pub fn create_levels_table(coverage: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{0}_levels\" (
            pyramid_level INTEGER PRIMARY KEY,
            x_res_1_1 REAL NOT NULL, y_res_1_1 REAL NOT NULL,
            x_res_1_2 REAL NOT NULL, y_res_1_2 REAL NOT NULL,
            x_res_1_4 REAL NOT NULL, y_res_1_4 REAL NOT NULL,
            x_res_1_8 REAL NOT NULL, y_res_1_8 REAL NOT NULL
        )",
        ident(coverage)
    )
}

pub fn create_section_levels_table(coverage: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{0}_section_levels\" (
            section_id INTEGER NOT NULL REFERENCES \"{0}_sections\"(section_id) ON DELETE CASCADE,
            pyramid_level INTEGER NOT NULL,
            x_res_1_1 REAL NOT NULL, y_res_1_1 REAL NOT NULL,
            x_res_1_2 REAL NOT NULL, y_res_1_2 REAL NOT NULL,
            x_res_1_4 REAL NOT NULL, y_res_1_4 REAL NOT NULL,
            x_res_1_8 REAL NOT NULL, y_res_1_8 REAL NOT NULL,
            PRIMARY KEY (section_id, pyramid_level)
        )",
        ident(coverage)
    )
}

pub fn create_tiles_table(coverage: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{0}_tiles\" (
            tile_id INTEGER PRIMARY KEY AUTOINCREMENT,
            pyramid_level INTEGER NOT NULL,
            section_id INTEGER NOT NULL REFERENCES \"{0}_sections\"(section_id) ON DELETE CASCADE,
            minx REAL NOT NULL, miny REAL NOT NULL, maxx REAL NOT NULL, maxy REAL NOT NULL
        )",
        ident(coverage)
    )
}

pub fn create_tile_data_table(coverage: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{0}_tile_data\" (
            tile_id INTEGER PRIMARY KEY REFERENCES \"{0}_tiles\"(tile_id) ON DELETE CASCADE,
            tile_data_odd BLOB NOT NULL,
            tile_data_even BLOB
        )",
        ident(coverage)
    )
}

/// SQLite's R*Tree virtual table module, the spatial-index oracle (spec §9
/// "Spatial index integration" — the core does not reimplement R-tree).
pub fn create_tiles_rtree(coverage: &str) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS \"{0}_tiles_rtree\" USING rtree(tile_id, minx, maxx, miny, maxy)",
        ident(coverage)
    )
}

/// Keep the rtree index in sync with `{coverage}_tiles` so callers only ever
/// insert/delete from the tiles table (§9: use the correct query idiom, not a
/// second manually-maintained index).
pub fn create_tiles_insert_trigger(coverage: &str) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS \"{0}_tiles_ai\" AFTER INSERT ON \"{0}_tiles\" BEGIN
            INSERT INTO \"{0}_tiles_rtree\"(tile_id, minx, maxx, miny, maxy)
            VALUES (new.tile_id, new.minx, new.maxx, new.miny, new.maxy);
        END",
        ident(coverage)
    )
}

pub fn create_tiles_delete_trigger(coverage: &str) -> String {
    format!(
        "CREATE TRIGGER IF NOT EXISTS \"{0}_tiles_ad\" AFTER DELETE ON \"{0}_tiles\" BEGIN
            DELETE FROM \"{0}_tiles_rtree\" WHERE tile_id = old.tile_id;
        END",
        ident(coverage)
    )
}

pub fn drop_coverage_tables(coverage: &str) -> Vec<String> {
    let c = ident(coverage);
    vec![
        format!("DROP TRIGGER IF EXISTS \"{c}_tiles_ai\""),
        format!("DROP TRIGGER IF EXISTS \"{c}_tiles_ad\""),
        format!("DROP TABLE IF EXISTS \"{c}_tiles_rtree\""),
        format!("DROP TABLE IF EXISTS \"{c}_tile_data\""),
        format!("DROP TABLE IF EXISTS \"{c}_tiles\""),
        format!("DROP TABLE IF EXISTS \"{c}_section_levels\""),
        format!("DROP TABLE IF EXISTS \"{c}_levels\""),
        format!("DROP TABLE IF EXISTS \"{c}_sections\""),
    ]
}

/// `statistics` is left NULL here; it is filled in afterwards by
/// [`update_section_stats`] once the section's tiles have been scanned.
pub fn insert_section(coverage: &str) -> String {
    format!(
        "INSERT INTO \"{0}_sections\" (section_name, file_path, md5, summary, width, height, minx, miny, maxx, maxy)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        ident(coverage)
    )
}

pub fn update_section_stats(coverage: &str) -> String {
    format!("UPDATE \"{0}_sections\" SET statistics = ?1 WHERE section_id = ?2", ident(coverage))
}

pub fn select_section(coverage: &str) -> String {
    format!(
        "SELECT section_id, section_name, file_path, md5, summary, width, height, minx, miny, maxx, maxy, statistics
         FROM \"{0}_sections\" WHERE section_id = ?1",
        ident(coverage)
    )
}

pub fn delete_section(coverage: &str) -> String {
    format!("DELETE FROM \"{0}_sections\" WHERE section_id = ?1", ident(coverage))
}

pub fn upsert_level(coverage: &str) -> String {
    format!(
        "INSERT INTO \"{0}_levels\" (pyramid_level, x_res_1_1, y_res_1_1, x_res_1_2, y_res_1_2, x_res_1_4, y_res_1_4, x_res_1_8, y_res_1_8)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(pyramid_level) DO UPDATE SET
            x_res_1_1=excluded.x_res_1_1, y_res_1_1=excluded.y_res_1_1,
            x_res_1_2=excluded.x_res_1_2, y_res_1_2=excluded.y_res_1_2,
            x_res_1_4=excluded.x_res_1_4, y_res_1_4=excluded.y_res_1_4,
            x_res_1_8=excluded.x_res_1_8, y_res_1_8=excluded.y_res_1_8",
        ident(coverage)
    )
}

pub fn upsert_section_level(coverage: &str) -> String {
    format!(
        "INSERT INTO \"{0}_section_levels\" (section_id, pyramid_level, x_res_1_1, y_res_1_1, x_res_1_2, y_res_1_2, x_res_1_4, y_res_1_4, x_res_1_8, y_res_1_8)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(section_id, pyramid_level) DO UPDATE SET
            x_res_1_1=excluded.x_res_1_1, y_res_1_1=excluded.y_res_1_1,
            x_res_1_2=excluded.x_res_1_2, y_res_1_2=excluded.y_res_1_2,
            x_res_1_4=excluded.x_res_1_4, y_res_1_4=excluded.y_res_1_4,
            x_res_1_8=excluded.x_res_1_8, y_res_1_8=excluded.y_res_1_8",
        ident(coverage)
    )
}

pub fn select_levels(coverage: &str) -> String {
    format!(
        "SELECT pyramid_level, x_res_1_1, y_res_1_1, x_res_1_2, y_res_1_2, x_res_1_4, y_res_1_4, x_res_1_8, y_res_1_8
         FROM \"{0}_levels\" ORDER BY pyramid_level",
        ident(coverage)
    )
}

pub fn select_section_levels(coverage: &str) -> String {
    format!(
        "SELECT pyramid_level, x_res_1_1, y_res_1_1, x_res_1_2, y_res_1_2, x_res_1_4, y_res_1_4, x_res_1_8, y_res_1_8
         FROM \"{0}_section_levels\" WHERE section_id = ?1 ORDER BY pyramid_level",
        ident(coverage)
    )
}

pub fn max_level(coverage: &str) -> String {
    format!("SELECT COALESCE(MAX(pyramid_level), -1) FROM \"{0}_levels\"", ident(coverage))
}

pub fn max_section_level(coverage: &str) -> String {
    format!(
        "SELECT COALESCE(MAX(pyramid_level), -1) FROM \"{0}_section_levels\" WHERE section_id = ?1",
        ident(coverage)
    )
}

pub fn delete_levels_above(coverage: &str) -> String {
    format!("DELETE FROM \"{0}_levels\" WHERE pyramid_level > 0", ident(coverage))
}

pub fn delete_section_levels_above(coverage: &str) -> String {
    format!(
        "DELETE FROM \"{0}_section_levels\" WHERE section_id = ?1 AND pyramid_level > 0",
        ident(coverage)
    )
}

pub fn delete_tiles_at_level(coverage: &str) -> String {
    format!(
        "DELETE FROM \"{0}_tiles\" WHERE section_id = ?1 AND pyramid_level > 0",
        ident(coverage)
    )
}

pub fn insert_tile(coverage: &str) -> String {
    format!(
        "INSERT INTO \"{0}_tiles\" (pyramid_level, section_id, minx, miny, maxx, maxy) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        ident(coverage)
    )
}

pub fn insert_tile_data(coverage: &str) -> String {
    format!(
        "INSERT INTO \"{0}_tile_data\" (tile_id, tile_data_odd, tile_data_even) VALUES (?1, ?2, ?3)",
        ident(coverage)
    )
}

pub fn select_tile_data(coverage: &str) -> String {
    format!(
        "SELECT tile_data_odd, tile_data_even FROM \"{0}_tile_data\" WHERE tile_id = ?1",
        ident(coverage)
    )
}

/// The spatial-index query idiom (spec §9): restrict by the rtree first, join
/// back to the tiles table for the level/section filter.
///
/// Params: `?1` = pyramid_level, `?2..?5` = window `(minx, miny, maxx, maxy)`,
/// `?6` = section_id when `with_section_filter`.
pub fn query_tiles_in_window(coverage: &str, with_section_filter: bool) -> String {
    let c = ident(coverage);
    let section_clause = if with_section_filter { "AND t.section_id = ?6" } else { "" };
    format!(
        "SELECT t.tile_id, t.section_id, t.minx, t.miny, t.maxx, t.maxy
         FROM \"{c}_tiles\" t
         JOIN \"{c}_tiles_rtree\" r ON r.tile_id = t.tile_id
         WHERE t.pyramid_level = ?1
           AND r.minx <= ?4 AND r.maxx >= ?2 AND r.miny <= ?5 AND r.maxy >= ?3
           {section_clause}
         ORDER BY t.tile_id"
    )
}

pub fn count_tiles_for_section(coverage: &str) -> String {
    format!("SELECT COUNT(*) FROM \"{0}_tiles\" WHERE section_id = ?1", ident(coverage))
}

/// Every section id in a coverage, for the `check` verb's sweep (spec §6
/// `IsValidRasterTile`/`IsValidRasterStatistics`).
pub fn select_all_section_ids(coverage: &str) -> String {
    format!("SELECT section_id FROM \"{0}_sections\" ORDER BY section_id", ident(coverage))
}

/// Every tile id in a coverage, for the `check` verb's sweep.
pub fn select_all_tile_ids(coverage: &str) -> String {
    format!("SELECT tile_id FROM \"{0}_tiles\" ORDER BY tile_id", ident(coverage))
}
