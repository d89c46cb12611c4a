//! Esri ASCII grid reader (spec §4.8 step 1, "`.asc` → ASCII grid").
//!
//! Header-token parsing follows `rl2_get_ascii_grid_infos`: case-insensitive
//! keys, either corner or center origin, a `cellsize` shared by both axes,
//! and an optional `NODATA_value` row.

use std::fs;
use std::path::Path;

use crate::error::ImportError;
use crate::pixel::{Pixel, PixelType, SampleType};
use crate::raster::Raster;

use super::SourceRaster;

fn io_err(path: &Path, reason: impl Into<String>) -> ImportError {
    ImportError::Io { path: path.display().to_string(), reason: reason.into() }
}

struct Header {
    ncols: u32,
    nrows: u32,
    xll: f64,
    yll: f64,
    cellsize: f64,
    nodata: Option<f64>,
}

/// Consume header lines (`ncols`, `nrows`, `xllcorner`/`center`, `yllcorner`/`center`,
/// `cellsize`, optional `nodata_value`) until a line's first token isn't a
/// recognized key, returning the header plus the count of lines it consumed.
fn parse_header<'a>(lines: impl Iterator<Item = &'a str>) -> Option<(Header, usize)> {
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut cellsize = None;
    let mut nodata = None;
    let mut consumed = 0;

    for line in lines {
        let mut it = line.split_whitespace();
        let (Some(key), Some(value)) = (it.next(), it.next()) else { break };
        match key.to_ascii_lowercase().as_str() {
            "ncols" => ncols = value.parse().ok(),
            "nrows" => nrows = value.parse().ok(),
            "xllcorner" | "xllcenter" => xll = value.parse().ok(),
            "yllcorner" | "yllcenter" => yll = value.parse().ok(),
            "cellsize" => cellsize = value.parse().ok(),
            "nodata_value" => nodata = value.parse().ok(),
            _ => break,
        }
        consumed += 1;
    }

    Some((
        Header {
            ncols: ncols?,
            nrows: nrows?,
            xll: xll?,
            yll: yll?,
            cellsize: cellsize?,
            nodata,
        },
        consumed,
    ))
}

/// Read an Esri ASCII grid into a single-band [`crate::pixel::PixelType::DataGrid`] raster
/// (spec §4.8 step 1).
pub fn read(path: &Path) -> Result<SourceRaster, ImportError> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e.to_string()))?;
    let (header, header_lines) = parse_header(text.lines()).ok_or_else(|| io_err(path, "malformed ASCII grid header"))?;

    let remaining: Vec<&str> = text.lines().skip(header_lines).collect();
    let nodata = header.nodata;

    let mut samples = Vec::with_capacity((header.ncols * header.nrows) as usize);
    for line in &remaining {
        for tok in line.split_whitespace() {
            let v: f64 = tok.parse().map_err(|_| io_err(path, format!("bad grid value {tok:?}")))?;
            samples.push(v);
        }
    }
    let expected = (header.ncols * header.nrows) as usize;
    if samples.len() != expected {
        return Err(io_err(path, format!("grid has {} values, expected {}", samples.len(), expected)));
    }

    let mut raster = Raster::allocate(header.ncols, header.nrows, SampleType::Float64, PixelType::DataGrid, 1)
        .map_err(|e| io_err(path, e.to_string()))?;
    for row in 0..header.nrows {
        for col in 0..header.ncols {
            let v = samples[(row * header.ncols + col) as usize];
            let pixel = Pixel::from_samples(SampleType::Float64, PixelType::DataGrid, vec![v]).map_err(|e| io_err(path, e.to_string()))?;
            raster.set_pixel(col, row, &pixel).map_err(|e| io_err(path, e.to_string()))?;
        }
    }
    if let Some(nd) = nodata {
        raster.set_no_data(Pixel::from_samples(SampleType::Float64, PixelType::DataGrid, vec![nd]).map_err(|e| io_err(path, e.to_string()))?);
    }

    let minx = header.xll;
    let miny = header.yll;
    let maxx = minx + header.ncols as f64 * header.cellsize;
    let maxy = miny + header.nrows as f64 * header.cellsize;

    Ok(SourceRaster {
        raster,
        res_x: header.cellsize,
        res_y: header.cellsize,
        minx,
        miny,
        maxx,
        maxy,
        srid: None,
        allow_grayscale_rgb_conversion: false,
    })
}
