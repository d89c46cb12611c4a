//! Raster egress (spec §6 `WriteGeoTiff`, `WriteTiff`, `WriteTiffTfw`,
//! `WriteAsciiGrid`, `GetMapImage`).
//!
//! These functions do not check `EngineConfig::allow_file_io`; that gate, and
//! the bbox/section lookups that produce the [`crate::reader::WindowRaster`]
//! passed in here, belong to `crate::Engine`, the same division of
//! responsibility [`crate::import`] uses for file-touching ingress.
//!
//! The classic-TIFF writer mirrors [`crate::import::readers::tiff`]'s reader:
//! one IFD, one strip, no BigTIFF. `WriteGeoTiff` adds the three GeoTIFF tags
//! the reader already knows how to parse back out (`ModelPixelScaleTag`,
//! `ModelTiepointTag`, `GeoKeyDirectoryTag`).

use std::fs;
use std::path::Path;

use crate::codec;
use crate::error::ExportError;
use crate::pixel::{PixelType, SampleType};
use crate::raster::Raster;

fn io_err(path: &Path, reason: impl Into<String>) -> ExportError {
    ExportError::Io { path: path.display().to_string(), reason: reason.into() }
}

/// Render `raster` as a standalone PNG (spec §6 `GetMapImage`): a full file,
/// not the odd/even tile blob pair [`codec::encode`] produces.
pub fn get_map_image(raster: &Raster) -> Result<Vec<u8>, ExportError> {
    Ok(codec::encode_png(raster)?)
}

/// Write `raster` as an Esri ASCII grid (spec §6 `WriteAsciiGrid`): one
/// numeric band only, row-major starting at the northernmost row, which is
/// how row 0 of [`Raster`] is already laid out.
pub fn write_ascii_grid(raster: &Raster, minx: f64, miny: f64, cellsize: f64, no_data: f64, path: &Path) -> Result<(), ExportError> {
    if raster.bands() != 1 || !matches!(raster.pixel_type(), PixelType::Grayscale | PixelType::DataGrid | PixelType::Monochrome) {
        return Err(ExportError::UnsupportedPixelType { pixel: raster.pixel_type(), bands: raster.bands() });
    }

    let mut out = String::new();
    out.push_str(&format!("ncols        {}\n", raster.width()));
    out.push_str(&format!("nrows        {}\n", raster.height()));
    out.push_str(&format!("xllcorner    {minx}\n"));
    out.push_str(&format!("yllcorner    {miny}\n"));
    out.push_str(&format!("cellsize     {cellsize}\n"));
    out.push_str(&format!("NODATA_value {no_data}\n"));

    for row in 0..raster.height() {
        let mut line = String::new();
        for col in 0..raster.width() {
            let pixel = raster.get_pixel(col, row).map_err(|e| ExportError::from(crate::error::CodecError::from(e)))?;
            let value = if pixel.is_transparent() { no_data } else { pixel.sample(0).unwrap_or(no_data) };
            if col > 0 {
                line.push(' ');
            }
            line.push_str(&format_ascii_value(value, raster.sample_type()));
        }
        out.push_str(&line);
        out.push('\n');
    }

    fs::write(path, out).map_err(|e| io_err(path, e.to_string()))
}

fn format_ascii_value(value: f64, sample_type: SampleType) -> String {
    match sample_type {
        SampleType::Float32 | SampleType::Float64 => format!("{value}"),
        _ => format!("{}", value as i64),
    }
}

/// Write `raster` as a classic, ungeoreferenced TIFF (spec §6 `WriteTiff`).
pub fn write_tiff(raster: &Raster, path: &Path) -> Result<(), ExportError> {
    let bytes = assemble_tiff(raster, None)?;
    fs::write(path, bytes).map_err(|e| io_err(path, e.to_string()))
}

/// Write `raster` as a plain TIFF plus an Esri `.tfw` worldfile sidecar
/// (spec §6 `WriteTiffTfw`): georeferenced without embedding GeoTIFF tags.
pub fn write_tiff_tfw(raster: &Raster, res_x: f64, res_y: f64, minx: f64, maxy: f64, tiff_path: &Path) -> Result<(), ExportError> {
    write_tiff(raster, tiff_path)?;
    let tfw_path = tiff_path.with_extension("tfw");
    let worldfile = format!("{res_x}\n0.0\n0.0\n{neg_res_y}\n{cx}\n{cy}\n", neg_res_y = -res_y, cx = minx + res_x / 2.0, cy = maxy - res_y / 2.0);
    fs::write(&tfw_path, worldfile).map_err(|e| io_err(&tfw_path, e.to_string()))
}

/// Geo-referencing embedded directly in `GeoKeyDirectoryTag` (spec §6 `WriteGeoTiff`).
struct GeoTags {
    res_x: f64,
    res_y: f64,
    minx: f64,
    maxy: f64,
    srid: i64,
}

/// Write `raster` as a self-contained GeoTIFF (spec §6 `WriteGeoTiff`).
pub fn write_geotiff(raster: &Raster, res_x: f64, res_y: f64, minx: f64, maxy: f64, srid: i64, path: &Path) -> Result<(), ExportError> {
    let bytes = assemble_tiff(raster, Some(GeoTags { res_x, res_y, minx, maxy, srid }))?;
    fs::write(path, bytes).map_err(|e| io_err(path, e.to_string()))
}

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_COLOR_MAP: u16 = 320;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_SAMPLE_FORMAT: u16 = 339;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

const FIELD_SHORT: u16 = 3;
const FIELD_LONG: u16 = 4;
const FIELD_DOUBLE: u16 = 12;

/// A packed field value either small enough to sit inline in the IFD entry's
/// 4-byte slot, or large enough to need an external offset (mirrors the
/// `value_or_offset` split [`crate::import::readers::tiff`] reads).
enum Value {
    Short(u16),
    Long(u32),
    ShortArray(Vec<u16>),
    DoubleArray(Vec<f64>),
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: Value,
}

fn photometric_and_format(raster: &Raster) -> (u16, u16) {
    let sample_format = match raster.sample_type() {
        SampleType::Int8 | SampleType::Int16 | SampleType::Int32 => 2,
        SampleType::Float32 | SampleType::Float64 => 3,
        _ => 1,
    };
    let photometric = match raster.pixel_type() {
        PixelType::Palette => 3,
        PixelType::Rgb => 2,
        _ => 1, // Monochrome, Grayscale, DataGrid, Multiband: min-is-black.
    };
    (photometric, sample_format)
}

/// Pack `raster`'s pixel buffer into TIFF row-major, row-byte-aligned bytes
/// (spec §9 "Sub-byte packing": disk packs MSB-first per row).
fn pack_rows(raster: &Raster) -> Vec<u8> {
    let bit_width = raster.sample_type().bit_width();
    if !raster.sample_type().is_sub_byte() {
        return raster.pixels().to_vec();
    }
    let samples_per_row = raster.width() as usize * raster.bands() as usize;
    let pixels = raster.pixels();
    let mut out = Vec::new();
    for row in 0..raster.height() as usize {
        let start = row * samples_per_row;
        out.extend(codec::pack_bits(&pixels[start..start + samples_per_row], bit_width, samples_per_row));
    }
    out
}

fn assemble_tiff(raster: &Raster, geo: Option<GeoTags>) -> Result<Vec<u8>, ExportError> {
    let (photometric, sample_format) = photometric_and_format(raster);
    let pixel_data = pack_rows(raster);

    let mut entries = vec![
        Entry { tag: TAG_IMAGE_WIDTH, field_type: FIELD_LONG, count: 1, value: Value::Long(raster.width()) },
        Entry { tag: TAG_IMAGE_LENGTH, field_type: FIELD_LONG, count: 1, value: Value::Long(raster.height()) },
        Entry { tag: TAG_BITS_PER_SAMPLE, field_type: FIELD_SHORT, count: 1, value: Value::Short(raster.sample_type().bit_width() as u16) },
        Entry { tag: TAG_COMPRESSION, field_type: FIELD_SHORT, count: 1, value: Value::Short(1) },
        Entry { tag: TAG_PHOTOMETRIC, field_type: FIELD_SHORT, count: 1, value: Value::Short(photometric) },
        Entry { tag: TAG_SAMPLES_PER_PIXEL, field_type: FIELD_SHORT, count: 1, value: Value::Short(raster.bands() as u16) },
        Entry { tag: TAG_ROWS_PER_STRIP, field_type: FIELD_LONG, count: 1, value: Value::Long(raster.height()) },
        Entry { tag: TAG_STRIP_BYTE_COUNTS, field_type: FIELD_LONG, count: 1, value: Value::Long(pixel_data.len() as u32) },
        Entry { tag: TAG_PLANAR_CONFIG, field_type: FIELD_SHORT, count: 1, value: Value::Short(1) },
        Entry { tag: TAG_SAMPLE_FORMAT, field_type: FIELD_SHORT, count: 1, value: Value::Short(sample_format) },
    ];

    if let Some(palette) = raster.palette() {
        let n = palette.entries().len();
        let mut color_map = vec![0u16; n * 3];
        for (i, e) in palette.entries().iter().enumerate() {
            color_map[i] = e.r as u16 * 257;
            color_map[n + i] = e.g as u16 * 257;
            color_map[2 * n + i] = e.b as u16 * 257;
        }
        entries.push(Entry { tag: TAG_COLOR_MAP, field_type: FIELD_SHORT, count: color_map.len() as u32, value: Value::ShortArray(color_map) });
    }

    if let Some(geo) = &geo {
        entries.push(Entry {
            tag: TAG_MODEL_PIXEL_SCALE,
            field_type: FIELD_DOUBLE,
            count: 3,
            value: Value::DoubleArray(vec![geo.res_x, geo.res_y, 0.0]),
        });
        entries.push(Entry {
            tag: TAG_MODEL_TIEPOINT,
            field_type: FIELD_DOUBLE,
            count: 6,
            value: Value::DoubleArray(vec![0.0, 0.0, 0.0, geo.minx, geo.maxy, 0.0]),
        });
        entries.push(Entry {
            tag: TAG_GEO_KEY_DIRECTORY,
            field_type: FIELD_SHORT,
            count: geo_key_directory(geo.srid).len() as u32,
            value: Value::ShortArray(geo_key_directory(geo.srid)),
        });
    }

    // StripOffsets needs the final pixel data offset, computed below once the
    // IFD's own size is known; insert a placeholder now and patch it in place.
    entries.push(Entry { tag: TAG_STRIP_OFFSETS, field_type: FIELD_LONG, count: 1, value: Value::Long(0) });
    entries.sort_by_key(|e| e.tag);
    let strip_offsets_idx = entries.iter().position(|e| e.tag == TAG_STRIP_OFFSETS).expect("just inserted");

    let ifd_header_len = 2 + entries.len() * 12 + 4;
    let ifd_offset = 8u32;
    let external_start = ifd_offset + ifd_header_len as u32;

    let mut external = Vec::new();
    let mut resolved: Vec<(u16, u16, u32, [u8; 4])> = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        let slot = if idx == strip_offsets_idx {
            // Patched below once `pixel_data_offset` is known.
            [0u8; 4]
        } else {
            inline_or_external(entry, external_start, &mut external)
        };
        resolved.push((entry.tag, entry.field_type, entry.count, slot));
    }

    let pixel_data_offset = ifd_offset + ifd_header_len as u32 + external.len() as u32;
    resolved[strip_offsets_idx].3 = pixel_data_offset.to_le_bytes();

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&ifd_offset.to_le_bytes());

    out.extend_from_slice(&(resolved.len() as u16).to_le_bytes());
    for (tag, field_type, count, value) in &resolved {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&field_type.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(value);
    }
    out.extend_from_slice(&0u32.to_le_bytes()); // no next IFD
    out.extend_from_slice(&external);
    out.extend_from_slice(&pixel_data);

    Ok(out)
}

fn inline_or_external(entry: &Entry, external_base: u32, external: &mut Vec<u8>) -> [u8; 4] {
    match &entry.value {
        Value::Short(v) => {
            let mut slot = [0u8; 4];
            slot[..2].copy_from_slice(&v.to_le_bytes());
            slot
        }
        Value::Long(v) => v.to_le_bytes(),
        Value::ShortArray(values) => {
            let bytes_len = values.len() * 2;
            if bytes_len <= 4 {
                let mut slot = [0u8; 4];
                for (i, v) in values.iter().enumerate() {
                    slot[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
                }
                slot
            } else {
                let offset = external_base + external.len() as u32;
                for v in values {
                    external.extend_from_slice(&v.to_le_bytes());
                }
                offset.to_le_bytes()
            }
        }
        Value::DoubleArray(values) => {
            let offset = external_base + external.len() as u32;
            for v in values {
                external.extend_from_slice(&v.to_le_bytes());
            }
            offset.to_le_bytes()
        }
    }
}

/// Minimal GeoKeyDirectory: model type, raster type, and either
/// `GeographicTypeGeoKey` (2048) or `ProjectedCSTypeGeoKey` (3072) depending
/// on whether `srid` looks geographic (4326, the only one this crate can
/// name without a full EPSG table).
fn geo_key_directory(srid: i64) -> Vec<u16> {
    let (model_type, crs_key) = if srid == 4326 { (2u16, 2048u16) } else { (1u16, 3072u16) };
    vec![
        1, 1, 0, 3, // KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys
        1024, 0, 1, model_type, // GTModelTypeGeoKey
        1025, 0, 1, 1, // GTRasterTypeGeoKey = RasterPixelIsArea
        crs_key, 0, 1, srid as u16,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Pixel;

    fn flat_raster(width: u32, height: u32, value: f64) -> Raster {
        let mut r = Raster::allocate(width, height, SampleType::UInt8, PixelType::Grayscale, 1).unwrap();
        for row in 0..height {
            for col in 0..width {
                r.set_pixel(col, row, &Pixel::from_samples(SampleType::UInt8, PixelType::Grayscale, vec![value]).unwrap()).unwrap();
            }
        }
        r
    }

    #[test]
    fn writes_a_readable_classic_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let raster = flat_raster(4, 4, 200.0);
        write_tiff(&raster, &path).unwrap();

        let back = crate::import::readers::tiff::read(&path).unwrap();
        assert_eq!((back.raster.width(), back.raster.height()), (4, 4));
        assert_eq!(back.raster.pixels(), raster.pixels());
    }

    #[test]
    fn writes_a_geotiff_with_recoverable_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let raster = flat_raster(2, 2, 10.0);
        write_geotiff(&raster, 2.0, 2.0, 100.0, 500.0, 32632, &path).unwrap();

        let back = crate::import::readers::tiff::read(&path).unwrap();
        assert_eq!(back.res_x, 2.0);
        assert_eq!(back.res_y, 2.0);
        assert_eq!(back.minx, 100.0);
        assert_eq!(back.maxy, 500.0);
        assert_eq!(back.srid, Some(32632));
    }

    #[test]
    fn writes_a_worldfile_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");
        let raster = flat_raster(2, 2, 1.0);
        write_tiff_tfw(&raster, 1.0, 1.0, 0.0, 2.0, &path).unwrap();

        let tfw = fs::read_to_string(path.with_extension("tfw")).unwrap();
        let lines: Vec<&str> = tfw.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "1");
        assert_eq!(lines[3], "-1");
    }

    #[test]
    fn ascii_grid_rejects_multiband_rasters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.asc");
        let raster = Raster::allocate(2, 2, SampleType::UInt8, PixelType::Rgb, 3).unwrap();
        assert!(write_ascii_grid(&raster, 0.0, 0.0, 1.0, -9999.0, &path).is_err());
    }

    #[test]
    fn ascii_grid_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.asc");
        let raster = flat_raster(2, 2, 7.0);
        write_ascii_grid(&raster, 10.0, 20.0, 5.0, -9999.0, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ncols        2\n"));
        assert!(text.contains("cellsize     5\n"));
        assert!(text.contains("7 7\n"));
    }

    #[test]
    fn get_map_image_produces_a_standalone_png() {
        let raster = flat_raster(3, 3, 5.0);
        let bytes = get_map_image(&raster).unwrap();
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
