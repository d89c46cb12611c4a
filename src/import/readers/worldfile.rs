//! WorldFile-georeferenced JPEG reader (spec §4.8 step 1, "`.jpg` → JPEG +
//! optional `.jgw/.jpgw/.wld` worldfile").
//!
//! The six-line affine parameter format and the `.jgw`/`.jpgw`/`.wld` suffix
//! fallback order are grounded in `read_jgw_worldfile`/`rl2_build_worldfile_path`.

use std::fs;
use std::path::{Path, PathBuf};

use image::GenericImageView;

use crate::error::ImportError;
use crate::pixel::{PixelType, SampleType};
use crate::raster::Raster;

use super::SourceRaster;

/// The six affine parameters a worldfile carries, one per line:
/// pixel size x, rotation (row), rotation (col), pixel size y (negative),
/// x of the center of the upper-left pixel, y of the center of the upper-left pixel.
struct WorldFile {
    res_x: f64,
    res_y: f64,
    minx: f64,
    maxy: f64,
}

fn build_worldfile_path(src: &Path, suffix: &str) -> PathBuf {
    src.with_extension(suffix.trim_start_matches('.'))
}

fn parse_worldfile(text: &str) -> Option<WorldFile> {
    let lines: Vec<f64> = text.lines().filter(|l| !l.trim().is_empty()).filter_map(|l| l.trim().parse().ok()).collect();
    if lines.len() < 6 {
        return None;
    }
    Some(WorldFile {
        res_x: lines[0],
        res_y: -lines[3],
        minx: lines[4],
        maxy: lines[5],
    })
}

fn read_worldfile(src_path: &Path) -> Option<WorldFile> {
    for suffix in [".jgw", ".jpgw", ".wld"] {
        let path = build_worldfile_path(src_path, suffix);
        if let Ok(text) = fs::read_to_string(&path) {
            if let Some(wf) = parse_worldfile(&text) {
                return Some(wf);
            }
        }
    }
    None
}

/// Read a JPEG image plus its sidecar worldfile (spec §4.8 step 1).
pub fn read_jpeg_with_worldfile(path: &Path) -> Result<SourceRaster, ImportError> {
    let img = image::open(path).map_err(|e| ImportError::Io { path: path.display().to_string(), reason: e.to_string() })?;
    let (width, height) = img.dimensions();
    let rgb = img.to_rgb8();
    let pixels = rgb.into_raw();
    let raster = Raster::from_pixels(width, height, SampleType::UInt8, PixelType::Rgb, 3, pixels)
        .map_err(|e| ImportError::Io { path: path.display().to_string(), reason: e.to_string() })?;

    let wf = read_worldfile(path).unwrap_or(WorldFile { res_x: 1.0, res_y: 1.0, minx: 0.0, maxy: height as f64 });

    Ok(SourceRaster {
        raster,
        res_x: wf.res_x,
        res_y: wf.res_y,
        minx: wf.minx,
        miny: wf.maxy - wf.res_y * height as f64,
        maxx: wf.minx + wf.res_x * width as f64,
        maxy: wf.maxy,
        srid: None,
        allow_grayscale_rgb_conversion: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_six_line_worldfile() {
        let text = "10.0\n0.0\n0.0\n-10.0\n500000.0\n4500000.0\n";
        let wf = parse_worldfile(text).unwrap();
        assert_eq!((wf.res_x, wf.res_y, wf.minx, wf.maxy), (10.0, 10.0, 500000.0, 4500000.0));
    }

    #[test]
    fn rejects_short_worldfile() {
        assert!(parse_worldfile("1.0\n2.0\n").is_none());
    }

    #[test]
    fn worldfile_path_swaps_suffix() {
        let path = build_worldfile_path(Path::new("/tmp/scene.jpg"), ".jgw");
        assert_eq!(path, Path::new("/tmp/scene.jgw"));
    }
}
