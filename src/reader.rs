//! Windowed reader (spec §4.9, C9): resolution planning, spatial-index
//! query, tile decode and blit into one output buffer.

use rusqlite::{params, Connection};

use crate::codec;
use crate::error::{PixelError, ReadError};
use crate::pixel::{Palette, Pixel, PixelType};
use crate::planner::{self, LevelResolutions};
use crate::raster::{prime_void_tile, Raster};
use crate::schema::{self, CoverageMeta};

fn wrap_pixel(e: PixelError) -> ReadError {
    ReadError::from(crate::error::CodecError::from(e))
}

/// One windowed read request (spec §4.9 "Input").
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub width: u32,
    pub height: u32,
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
    /// Restrict the spatial-index query to one section.
    pub section_id: Option<i64>,
    /// Mono-band (`len() == 1`) or triple-band (`len() == 3`) out-projection;
    /// only admissible against a `Multiband` coverage.
    pub bands: Option<Vec<usize>>,
}

/// The decoded window, plus the coverage palette the caller needs to
/// interpret it if the output pixel type is still `Palette`.
pub struct WindowRaster {
    pub raster: Raster,
    pub palette: Option<Palette>,
}

fn load_levels(conn: &Connection, meta: &CoverageMeta, section_id: Option<i64>) -> Result<Vec<LevelResolutions>, ReadError> {
    let mut out = Vec::new();
    if meta.mixed_resolutions {
        let section_id = section_id.ok_or(ReadError::NoResolutionPlan)?;
        let mut stmt = conn.prepare(&schema::select_section_levels(&meta.name))?;
        let mut rows = stmt.query(params![section_id])?;
        while let Some(row) = rows.next()? {
            out.push(row_to_level(row)?);
        }
    } else {
        let mut stmt = conn.prepare(&schema::select_levels(&meta.name))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            out.push(row_to_level(row)?);
        }
    }
    Ok(out)
}

fn row_to_level(row: &rusqlite::Row) -> rusqlite::Result<LevelResolutions> {
    Ok(LevelResolutions {
        pyramid_level: row.get(0)?,
        x_res: [row.get(1)?, row.get(3)?, row.get(5)?, row.get(7)?],
        y_res: [row.get(2)?, row.get(4)?, row.get(6)?, row.get(8)?],
    })
}

/// Resolve the shape tiles decode to at `plan`'s scale (spec §4.3 "promoted"):
/// unchanged below scale 1/1; `Monochrome` promotes to 1-band grayscale and
/// `Palette` to 3-band RGB at coarser scales, matching [`codec::decode`].
fn decoded_shape(meta: &CoverageMeta, plan: &planner::ResolutionPlan) -> (crate::pixel::SampleType, PixelType, u8) {
    if plan.scale_denom == 1 {
        return (meta.sample_type, meta.pixel_type, meta.bands);
    }
    match meta.pixel_type {
        PixelType::Monochrome => (crate::pixel::SampleType::UInt8, PixelType::Grayscale, 1),
        PixelType::Palette => (crate::pixel::SampleType::UInt8, PixelType::Rgb, 3),
        _ => (meta.sample_type, meta.pixel_type, meta.bands),
    }
}

/// Read one window out of `meta`'s coverage (spec §4.9 steps 1-8).
pub fn read_window(conn: &Connection, meta: &CoverageMeta, req: &ReadRequest) -> Result<WindowRaster, ReadError> {
    if req.width == 0 || req.height == 0 || req.maxx <= req.minx || req.maxy <= req.miny {
        return Err(ReadError::GeometrySizeMismatch {
            width: req.width,
            height: req.height,
            x_res: 0.0,
            y_res: 0.0,
        });
    }

    let x_req = (req.maxx - req.minx) / req.width as f64;
    let y_req = (req.maxy - req.miny) / req.height as f64;

    let levels = load_levels(conn, meta, req.section_id)?;
    let plan = planner::plan(&levels, x_req, y_req).ok_or(ReadError::NoResolutionPlan)?;

    let expected_width = (req.maxx - req.minx) / plan.xx_res;
    let expected_height = (req.maxy - req.miny) / plan.yy_res;
    let within_tolerance = |requested: u32, expected: f64| (requested as f64 - expected).abs() <= expected.abs().max(1.0) * 0.01;
    if !within_tolerance(req.width, expected_width) || !within_tolerance(req.height, expected_height) {
        return Err(ReadError::GeometrySizeMismatch {
            width: req.width,
            height: req.height,
            x_res: plan.xx_res,
            y_res: plan.yy_res,
        });
    }

    let (decoded_sample, decoded_pixel, decoded_bands) = decoded_shape(meta, &plan);

    let (final_sample, final_pixel, final_bands) = match &req.bands {
        Some(bands) => {
            if decoded_pixel != PixelType::Multiband {
                return Err(ReadError::BadBandSelection {
                    requested: bands.first().copied().unwrap_or(0) as u32,
                    available: decoded_bands as u32,
                });
            }
            if !matches!(bands.len(), 1 | 3) {
                return Err(ReadError::BadBandSelection {
                    requested: bands.len() as u32,
                    available: decoded_bands as u32,
                });
            }
            for &b in bands {
                if b >= decoded_bands as usize {
                    return Err(ReadError::BadBandSelection {
                        requested: b as u32,
                        available: decoded_bands as u32,
                    });
                }
            }
            let pixel_type = if bands.len() == 1 { PixelType::Grayscale } else { PixelType::Rgb };
            (decoded_sample, pixel_type, bands.len() as u8)
        }
        None => (decoded_sample, decoded_pixel, decoded_bands),
    };

    let no_data = meta
        .no_data_pixel
        .clone()
        .map_or_else(|| Pixel::default_no_data(final_sample, final_pixel, final_bands), Ok)
        .map_err(wrap_pixel)?;

    let mut out = Raster::allocate(req.width, req.height, final_sample, final_pixel, final_bands).map_err(wrap_pixel)?;
    out.ensure_mask();
    prime_void_tile(&mut out, &no_data).map_err(wrap_pixel)?;

    let sql = schema::query_tiles_in_window(&meta.name, req.section_id.is_some());
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = match req.section_id {
        Some(sid) => stmt.query(params![plan.pyramid_level, req.minx, req.miny, req.maxx, req.maxy, sid])?,
        None => stmt.query(params![plan.pyramid_level, req.minx, req.miny, req.maxx, req.maxy])?,
    };

    while let Some(row) = rows.next()? {
        let tile_id: i64 = row.get(0)?;
        let tminx: f64 = row.get(2)?;
        let tmaxy: f64 = row.get(5)?;

        let (odd, even): (Vec<u8>, Option<Vec<u8>>) = conn.query_row(&schema::select_tile_data(&meta.name), params![tile_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let decoded = codec::decode(&odd, even.as_deref(), plan.scale_denom, meta.palette.as_ref())?;

        let col_offset = ((tminx - req.minx) / plan.xx_res).round() as i64;
        let row_offset = ((req.maxy - tmaxy) / plan.yy_res).round() as i64;

        for ty in 0..decoded.height() {
            let dest_row = row_offset + ty as i64;
            if dest_row < 0 || dest_row as u32 >= req.height {
                continue;
            }
            for tx in 0..decoded.width() {
                let dest_col = col_offset + tx as i64;
                if dest_col < 0 || dest_col as u32 >= req.width {
                    continue;
                }
                let pixel = decoded.get_pixel(tx, ty).map_err(wrap_pixel)?;
                let projected = match &req.bands {
                    Some(bands) if bands.len() == 1 => pixel.select_band(bands[0]).map_err(wrap_pixel)?,
                    Some(bands) => pixel.select_rgb_triple(bands[0], bands[1], bands[2]).map_err(wrap_pixel)?,
                    None => pixel,
                };
                out.set_pixel(dest_col as u32, dest_row as u32, &projected).map_err(wrap_pixel)?;
            }
        }
    }

    Ok(WindowRaster {
        raster: out,
        palette: meta.palette.clone(),
    })
}
