//! Pyramid builder (spec §4.10, C10). Builds coarser levels on top of an
//! already-imported section's base (level 0) tiles, one level at a time,
//! recursing until a level would cover the section with a single tile on
//! both axes (see DESIGN.md "Pyramid termination").
//!
//! Like [`crate::writer`] and [`crate::import`], every operation here binds
//! the caller's open transaction; nothing here begins or commits one.

use rusqlite::{params, Connection, OptionalExtension};

use crate::codec;
use crate::error::PyramidError;
use crate::pixel::{Palette, Pixel};
use crate::raster::{prime_void_tile, rescale_block_grid, Raster};
use crate::schema::{self, CoverageMeta};
use crate::writer;

const BLOCK: u32 = 16;

struct SectionBounds {
    width: u32,
    height: u32,
    minx: f64,
    miny: f64,
    maxx: f64,
    maxy: f64,
}

fn read_section_bounds(conn: &Connection, coverage: &str, section_id: i64) -> Result<SectionBounds, PyramidError> {
    conn.query_row(&schema::select_section(coverage), params![section_id], |row| {
        Ok(SectionBounds {
            width: row.get(5)?,
            height: row.get(6)?,
            minx: row.get(7)?,
            miny: row.get(8)?,
            maxx: row.get(9)?,
            maxy: row.get(10)?,
        })
    })
    .optional()
    .map_err(PyramidError::from)?
    .ok_or(PyramidError::SectionNotFound(section_id))
}

fn read_base_resolution(conn: &Connection, meta: &CoverageMeta, section_id: i64) -> Result<(f64, f64), PyramidError> {
    if meta.mixed_resolutions {
        let mut stmt = conn.prepare(&schema::select_section_levels(&meta.name))?;
        let mut rows = stmt.query(params![section_id])?;
        while let Some(row) = rows.next()? {
            let level: u32 = row.get(0)?;
            if level == 0 {
                return Ok((row.get(1)?, row.get(2)?));
            }
        }
    } else {
        let mut stmt = conn.prepare(&schema::select_levels(&meta.name))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let level: u32 = row.get(0)?;
            if level == 0 {
                return Ok((row.get(1)?, row.get(2)?));
            }
        }
    }
    Err(PyramidError::SectionNotFound(section_id))
}

fn current_max_level(conn: &Connection, meta: &CoverageMeta, section_id: i64) -> Result<i64, PyramidError> {
    if meta.mixed_resolutions {
        Ok(conn.query_row(&schema::max_section_level(&meta.name), params![section_id], |r| r.get(0))?)
    } else {
        Ok(conn.query_row(&schema::max_level(&meta.name), [], |r| r.get(0))?)
    }
}

/// `ceil(pixels / (tile_dim * 16^level))` — how many tiles, along one axis,
/// a section needs at `level` (spec §4.10 step 3, grid derived from the
/// section's fixed pixel dimensions rather than scanned from the tiles table).
fn tiles_along_axis(pixels: u32, tile_dim: u32, level: u32) -> u64 {
    let denom = tile_dim as u64 * 16u64.checked_pow(level).unwrap_or(u64::MAX);
    if denom == 0 {
        return 0;
    }
    (pixels as u64 + denom - 1) / denom
}

/// Look up the one level-`level` tile (within `section_id`) whose bbox
/// contains `(x, y)` (spec §4.10 step 3b). Ties (shouldn't occur within one
/// pyramid level) resolve to the largest `tile_id`, the same "later tile_id
/// wins" rule the windowed reader uses (spec §4.9 "Determinism").
fn find_tile_at_point(conn: &Connection, coverage: &str, section_id: i64, level: u32, x: f64, y: f64) -> Result<Option<i64>, PyramidError> {
    let sql = schema::query_tiles_in_window(coverage, true);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![level, x, y, x, y, section_id])?;
    let mut best: Option<i64> = None;
    while let Some(row) = rows.next()? {
        let tile_id: i64 = row.get(0)?;
        best = Some(match best {
            Some(b) if b >= tile_id => b,
            _ => tile_id,
        });
    }
    Ok(best)
}

fn load_tile(conn: &Connection, coverage: &str, tile_id: i64, palette: Option<&Palette>) -> Result<Raster, PyramidError> {
    let (odd, even): (Vec<u8>, Option<Vec<u8>>) = conn.query_row(&schema::select_tile_data(coverage), params![tile_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    codec::decode(&odd, even.as_deref(), 1, palette).map_err(PyramidError::from)
}

/// Delete every pyramid level (and its tiles) above the base for `section_id`
/// (spec §4.10 "Re-building").
fn clear_existing_pyramid(conn: &Connection, meta: &CoverageMeta, section_id: i64) -> Result<(), PyramidError> {
    conn.execute(&schema::delete_tiles_at_level(&meta.name), params![section_id])?;
    if meta.mixed_resolutions {
        conn.execute(&schema::delete_section_levels_above(&meta.name), params![section_id])?;
    } else {
        conn.execute(&schema::delete_levels_above(&meta.name), [])?;
    }
    Ok(())
}

/// Drop every pyramid level above the base for `section_id`, leaving only the
/// level-0 tiles behind (spec §6 `DePyramidize`).
pub fn drop_pyramid(conn: &Connection, meta: &CoverageMeta, section_id: i64) -> Result<(), PyramidError> {
    clear_existing_pyramid(conn, meta, section_id)
}

/// Build every pyramid level above level 0 for `section_id`, recursing until
/// a level would need only a single tile on each axis (spec §4.10 steps 1-4).
///
/// Without `force`, refuses if a pyramid already exists for this section;
/// with `force`, deletes it first and rebuilds from scratch.
pub fn build_pyramid(conn: &Connection, meta: &CoverageMeta, section_id: i64, force: bool) -> Result<(), PyramidError> {
    let max_level = current_max_level(conn, meta, section_id)?;
    if max_level > 0 {
        if !force {
            return Err(PyramidError::LevelExists {
                section_id,
                level: max_level as u32,
            });
        }
        clear_existing_pyramid(conn, meta, section_id)?;
    }

    let bounds = read_section_bounds(conn, &meta.name, section_id)?;
    let (base_x_res, base_y_res) = read_base_resolution(conn, meta, section_id)?;
    let no_data = meta
        .no_data_pixel
        .clone()
        .map_or_else(|| Pixel::default_no_data(meta.sample_type, meta.pixel_type, meta.bands), Ok)
        .map_err(|e| PyramidError::from(crate::error::CodecError::from(e)))?;

    let mut level = 0u32;
    loop {
        let tiles_x = tiles_along_axis(bounds.width, meta.tile_width, level);
        let tiles_y = tiles_along_axis(bounds.height, meta.tile_height, level);
        if tiles_x <= 1 && tiles_y <= 1 {
            break;
        }

        build_one_level(conn, meta, section_id, &bounds, base_x_res, base_y_res, level, &no_data)?;
        level += 1;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_one_level(
    conn: &Connection,
    meta: &CoverageMeta,
    section_id: i64,
    bounds: &SectionBounds,
    base_x_res: f64,
    base_y_res: f64,
    level: u32,
    no_data: &Pixel,
) -> Result<(), PyramidError> {
    let next_level = level + 1;
    let next_base_x_res = base_x_res * 16f64.powi(next_level as i32);
    let next_base_y_res = base_y_res * 16f64.powi(next_level as i32);
    writer::insert_level(
        conn,
        &meta.name,
        meta.mixed_resolutions,
        meta.mixed_resolutions.then_some(section_id),
        next_level,
        next_base_x_res,
        next_base_y_res,
    )?;

    let res_k_x = base_x_res * 16f64.powi(level as i32);
    let res_k_y = base_y_res * 16f64.powi(level as i32);
    let subcell_w = meta.tile_width / BLOCK;
    let subcell_h = meta.tile_height / BLOCK;

    let new_tiles_x = tiles_along_axis(bounds.width, meta.tile_width, next_level);
    let new_tiles_y = tiles_along_axis(bounds.height, meta.tile_height, next_level);
    let new_tile_world_w = meta.tile_width as f64 * next_base_x_res;
    let new_tile_world_h = meta.tile_height as f64 * next_base_y_res;

    for ty in 0..new_tiles_y {
        for tx in 0..new_tiles_x {
            let tile_minx = bounds.minx + tx as f64 * new_tile_world_w;
            let tile_maxy = bounds.maxy - ty as f64 * new_tile_world_h;
            let tile_maxx = tile_minx + new_tile_world_w;
            let tile_miny = tile_maxy - new_tile_world_h;

            let mut pyramid_tile = Raster::allocate(meta.tile_width, meta.tile_height, meta.sample_type, meta.pixel_type, meta.bands).map_err(|e| {
                PyramidError::from(crate::error::CodecError::from(e))
            })?;
            pyramid_tile.ensure_mask();
            prime_void_tile(&mut pyramid_tile, no_data).map_err(|e| PyramidError::from(crate::error::CodecError::from(e)))?;

            let subtile_world_w = meta.tile_width as f64 * res_k_x;
            let subtile_world_h = meta.tile_height as f64 * res_k_y;

            for r in 0..BLOCK {
                for c in 0..BLOCK {
                    let center_x = tile_minx + (c as f64 + 0.5) * subtile_world_w;
                    let center_y = tile_maxy - (r as f64 + 0.5) * subtile_world_h;

                    let Some(tile_id) = find_tile_at_point(conn, &meta.name, section_id, level, center_x, center_y)? else {
                        continue;
                    };
                    let decoded = load_tile(conn, &meta.name, tile_id, meta.palette.as_ref())?;
                    let rescaled = rescale_block_grid(decoded.width(), decoded.height(), BLOCK, |x, y| decoded.get_pixel(x, y)).map_err(|e| {
                        PyramidError::from(crate::error::CodecError::from(e))
                    })?;

                    let dst_x0 = c * subcell_w;
                    let dst_y0 = r * subcell_h;
                    for (i, pixel) in rescaled.iter().enumerate() {
                        let sx = i as u32 % subcell_w;
                        let sy = i as u32 / subcell_w;
                        pyramid_tile
                            .set_pixel(dst_x0 + sx, dst_y0 + sy, pixel)
                            .map_err(|e| PyramidError::from(crate::error::CodecError::from(e)))?;
                    }
                }
            }

            let (odd, even) = codec::encode(&pyramid_tile, meta.compression, meta.quality)?;
            writer::insert_tile(conn, &meta.name, section_id, next_level, (tile_minx, tile_miny, tile_maxx, tile_maxy), &odd, even.as_deref())?;
        }
    }

    Ok(())
}
