//! Tile writer (spec §4.7, C7). Every operation binds the caller's open
//! transaction/connection; none of them open or commit a transaction
//! themselves (spec §5 "Transaction discipline").

use rusqlite::{params, Connection};

use crate::error::DbError;
use crate::planner::{derive_level_resolutions, LevelResolutions};
use crate::schema;

/// Insert a section row, returning its assigned `section_id` (spec §4.7).
#[allow(clippy::too_many_arguments)]
pub fn insert_section(
    conn: &Connection,
    coverage: &str,
    name: &str,
    file_path: Option<&str>,
    md5: Option<&str>,
    summary: Option<&str>,
    width: u32,
    height: u32,
    bbox: (f64, f64, f64, f64),
) -> Result<i64, DbError> {
    conn.execute(
        &schema::insert_section(coverage),
        params![name, file_path, md5, summary, width, height, bbox.0, bbox.1, bbox.2, bbox.3],
    )
    .map_err(|e| DbError::Insert(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

/// Insert (or upsert) one level row at `level`, with all eight resolution
/// columns filled at 1x/2x/4x/8x of `(base_res_x, base_res_y)` (spec §4.7
/// "insert_level").
pub fn insert_level(
    conn: &Connection,
    coverage: &str,
    mixed_resolutions: bool,
    section_id: Option<i64>,
    level: u32,
    base_res_x: f64,
    base_res_y: f64,
) -> Result<LevelResolutions, DbError> {
    let res = derive_level_resolutions(level, base_res_x, base_res_y);
    if mixed_resolutions {
        let section_id = section_id.expect("mixed-resolution coverages require a section_id for insert_level");
        conn.execute(
            &schema::upsert_section_level(coverage),
            params![
                section_id,
                level,
                res.x_res[0],
                res.y_res[0],
                res.x_res[1],
                res.y_res[1],
                res.x_res[2],
                res.y_res[2],
                res.x_res[3],
                res.y_res[3],
            ],
        )
    } else {
        conn.execute(
            &schema::upsert_level(coverage),
            params![
                level,
                res.x_res[0],
                res.y_res[0],
                res.x_res[1],
                res.y_res[1],
                res.x_res[2],
                res.y_res[2],
                res.x_res[3],
                res.y_res[3],
            ],
        )
    }
    .map_err(|e| DbError::Insert(e.to_string()))?;
    Ok(res)
}

/// Insert a tile row then its tile_data row, returning the assigned `tile_id`
/// (spec §4.7 "insert_tile" — two statements, auto-assigned id).
pub fn insert_tile(
    conn: &Connection,
    coverage: &str,
    section_id: i64,
    pyramid_level: u32,
    bbox: (f64, f64, f64, f64),
    odd: &[u8],
    even: Option<&[u8]>,
) -> Result<i64, DbError> {
    conn.execute(
        &schema::insert_tile(coverage),
        params![pyramid_level, section_id, bbox.0, bbox.1, bbox.2, bbox.3],
    )
    .map_err(|e| DbError::Insert(e.to_string()))?;
    let tile_id = conn.last_insert_rowid();

    conn.execute(&schema::insert_tile_data(coverage), params![tile_id, odd, even])
        .map_err(|e| DbError::Insert(e.to_string()))?;

    Ok(tile_id)
}

/// Overwrite a section's persisted statistics blob (spec §4.7 "update_section_stats").
pub fn update_section_stats(conn: &Connection, coverage: &str, section_id: i64, statistics_blob: &[u8]) -> Result<(), DbError> {
    conn.execute(&schema::update_section_stats(coverage), params![statistics_blob, section_id])
        .map_err(|e| DbError::Insert(e.to_string()))?;
    Ok(())
}
