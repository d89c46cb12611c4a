//! Classic TIFF / GeoTIFF reader (spec §4.8 step 1, "otherwise TIFF").
//!
//! A single-resolution, strip-or-tile reader: no BigTIFF, no multi-IFD
//! pyramids (those are this crate's own concern, built by [`crate::pyramid`]
//! rather than read from a source file). Byte order, IFD entry layout and
//! inline-value-vs-offset handling follow the same shape the original WSI
//! TIFF parser used, simplified to the one (first) IFD a georeferenced
//! single-resolution source needs.

use std::fs;
use std::path::Path;

use crate::codec::unpack_bits;
use crate::error::ImportError;
use crate::pixel::{Palette, PixelType, RgbEntry, SampleType};
use crate::raster::Raster;

use super::SourceRaster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, b: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes([b[0], b[1]]),
            ByteOrder::Big => u16::from_be_bytes([b[0], b[1]]),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ByteOrder::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    fn f64_pair(self, buf: &[u8], offset: usize) -> f64 {
        let bytes = &buf[offset..offset + 8];
        let mut a = [0u8; 8];
        a.copy_from_slice(bytes);
        match self {
            ByteOrder::Little => f64::from_le_bytes(a),
            ByteOrder::Big => f64::from_be_bytes(a),
        }
    }
}

struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    value_or_offset: [u8; 4],
}

fn io_err(path: &Path, reason: impl Into<String>) -> ImportError {
    ImportError::Io { path: path.display().to_string(), reason: reason.into() }
}

fn field_type_size(field_type: u16) -> usize {
    match field_type {
        1 | 2 | 6 | 7 => 1, // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => 2,         // SHORT, SSHORT
        4 | 9 | 11 => 4,    // LONG, SLONG, FLOAT
        5 | 10 | 12 => 8,   // RATIONAL, SRATIONAL, DOUBLE
        _ => 1,
    }
}

impl IfdEntry {
    fn values_u32(&self, bo: ByteOrder, buf: &[u8]) -> Vec<u32> {
        let size = field_type_size(self.field_type);
        let total = size * self.count as usize;
        let bytes: &[u8] = if total <= 4 {
            &self.value_or_offset[..total.max(1)]
        } else {
            let off = bo.u32(&self.value_or_offset) as usize;
            &buf[off..off + total]
        };
        match self.field_type {
            3 | 8 => bytes.chunks_exact(2).map(|c| bo.u16(c) as u32).collect(),
            4 | 9 => bytes.chunks_exact(4).map(|c| bo.u32(c)).collect(),
            1 | 2 | 6 | 7 => bytes.iter().map(|&b| b as u32).collect(),
            _ => vec![],
        }
    }

    fn single_u32(&self, bo: ByteOrder, buf: &[u8]) -> u32 {
        self.values_u32(bo, buf).first().copied().unwrap_or(0)
    }
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
const TAG_TILE_WIDTH: u16 = 322;
const TAG_TILE_LENGTH: u16 = 323;
const TAG_TILE_OFFSETS: u16 = 324;
const TAG_TILE_BYTE_COUNTS: u16 = 325;
const TAG_SAMPLE_FORMAT: u16 = 339;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

/// Read a single-resolution TIFF/GeoTIFF source image (spec §4.8 step 1).
pub fn read(path: &Path) -> Result<SourceRaster, ImportError> {
    let buf = fs::read(path).map_err(|e| io_err(path, e.to_string()))?;
    if buf.len() < 8 {
        return Err(io_err(path, "file too small for a TIFF header"));
    }
    let bo = match u16::from_le_bytes([buf[0], buf[1]]) {
        0x4949 => ByteOrder::Little,
        0x4D4D => ByteOrder::Big,
        magic => return Err(io_err(path, format!("not a TIFF file (magic 0x{magic:04X})"))),
    };
    let version = bo.u16(&buf[2..4]);
    if version != 42 {
        return Err(io_err(path, format!("unsupported TIFF version {version} (BigTIFF not supported)")));
    }
    let ifd_offset = bo.u32(&buf[4..8]) as usize;

    let entry_count = bo.u16(&buf[ifd_offset..ifd_offset + 2]) as usize;
    let mut entries = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let off = ifd_offset + 2 + i * 12;
        let tag = bo.u16(&buf[off..off + 2]);
        let field_type = bo.u16(&buf[off + 2..off + 4]);
        let count = bo.u32(&buf[off + 4..off + 8]);
        let mut value_or_offset = [0u8; 4];
        value_or_offset.copy_from_slice(&buf[off + 8..off + 12]);
        entries.push(IfdEntry { tag, field_type, count, value_or_offset });
    }
    let find = |tag: u16| entries.iter().find(|e| e.tag == tag);

    let width = find(TAG_IMAGE_WIDTH).map(|e| e.single_u32(bo, &buf)).ok_or_else(|| io_err(path, "missing ImageWidth"))?;
    let height = find(TAG_IMAGE_LENGTH).map(|e| e.single_u32(bo, &buf)).ok_or_else(|| io_err(path, "missing ImageLength"))?;
    let bits_per_sample = find(TAG_BITS_PER_SAMPLE).map(|e| e.single_u32(bo, &buf)).unwrap_or(1);
    let samples_per_pixel = find(TAG_SAMPLES_PER_PIXEL).map(|e| e.single_u32(bo, &buf)).unwrap_or(1) as u8;
    let photometric = find(TAG_PHOTOMETRIC).map(|e| e.single_u32(bo, &buf)).unwrap_or(1);
    let compression = find(TAG_COMPRESSION).map(|e| e.single_u32(bo, &buf)).unwrap_or(1);
    let sample_format = find(TAG_SAMPLE_FORMAT).map(|e| e.single_u32(bo, &buf)).unwrap_or(1);

    let sample_type = match (bits_per_sample, sample_format) {
        (1, _) => SampleType::UInt1,
        (2, _) => SampleType::UInt2,
        (4, _) => SampleType::UInt4,
        (8, _) => SampleType::UInt8,
        (16, 2) => SampleType::Int16,
        (16, _) => SampleType::UInt16,
        (32, 3) => SampleType::Float32,
        (32, 2) => SampleType::Int32,
        (32, _) => SampleType::UInt32,
        (bits, _) => return Err(io_err(path, format!("unsupported BitsPerSample {bits}"))),
    };

    let mut palette = None;
    let pixel_type = if photometric == 3 {
        let cmap = find(TAG_COLOR_MAP).ok_or_else(|| io_err(path, "palette photometric without ColorMap"))?;
        let raw = cmap.values_u32(bo, &buf);
        let n = raw.len() / 3;
        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            entries.push(RgbEntry::new((raw[i] >> 8) as u8, (raw[n + i] >> 8) as u8, (raw[2 * n + i] >> 8) as u8));
        }
        palette = Some(Palette::new(entries, 1usize << sample_type.bit_width()).map_err(|e| io_err(path, e.to_string()))?);
        PixelType::Palette
    } else if bits_per_sample == 1 && samples_per_pixel == 1 && matches!(photometric, 0 | 1) {
        PixelType::Monochrome
    } else if samples_per_pixel == 3 && photometric == 2 {
        PixelType::Rgb
    } else if samples_per_pixel == 1 && matches!(sample_format, 2 | 3) {
        PixelType::DataGrid
    } else if samples_per_pixel == 1 {
        PixelType::Grayscale
    } else {
        PixelType::Multiband
    };

    let row_bytes = (width as usize * bits_per_sample as usize * samples_per_pixel as usize).div_ceil(8);
    let mut planar = vec![0u8; row_bytes * height as usize];

    if let Some(tile_width_e) = find(TAG_TILE_WIDTH) {
        let tile_width = tile_width_e.single_u32(bo, &buf);
        let tile_length = find(TAG_TILE_LENGTH).map(|e| e.single_u32(bo, &buf)).unwrap_or(tile_width);
        let offsets = find(TAG_TILE_OFFSETS).ok_or_else(|| io_err(path, "missing TileOffsets"))?.values_u32(bo, &buf);
        let counts = find(TAG_TILE_BYTE_COUNTS).ok_or_else(|| io_err(path, "missing TileByteCounts"))?.values_u32(bo, &buf);
        let tiles_across = width.div_ceil(tile_width);
        let tile_row_bytes = (tile_width as usize * bits_per_sample as usize * samples_per_pixel as usize).div_ceil(8);
        for (idx, (&off, &count)) in offsets.iter().zip(counts.iter()).enumerate() {
            let tile_col = idx as u32 % tiles_across;
            let tile_row = idx as u32 / tiles_across;
            let raw = decompress(&buf[off as usize..(off + count) as usize], compression, path)?;
            let rows_here = tile_length.min(height - tile_row * tile_length);
            for r in 0..rows_here {
                let dst_row = tile_row * tile_length + r;
                let dst_off = dst_row as usize * row_bytes + tile_col as usize * tile_row_bytes;
                let src_off = r as usize * tile_row_bytes;
                let n = tile_row_bytes.min(row_bytes - tile_col as usize * tile_row_bytes);
                planar[dst_off..dst_off + n].copy_from_slice(&raw[src_off..src_off + n]);
            }
        }
    } else {
        let rows_per_strip = find(TAG_ROWS_PER_STRIP).map(|e| e.single_u32(bo, &buf)).unwrap_or(height);
        let offsets = find(TAG_STRIP_OFFSETS).ok_or_else(|| io_err(path, "missing StripOffsets"))?.values_u32(bo, &buf);
        let counts = find(TAG_STRIP_BYTE_COUNTS).ok_or_else(|| io_err(path, "missing StripByteCounts"))?.values_u32(bo, &buf);
        for (idx, (&off, &count)) in offsets.iter().zip(counts.iter()).enumerate() {
            let raw = decompress(&buf[off as usize..(off + count) as usize], compression, path)?;
            let dst_off = idx * rows_per_strip as usize * row_bytes;
            let n = raw.len().min(planar.len() - dst_off);
            planar[dst_off..dst_off + n].copy_from_slice(&raw[..n]);
        }
    }

    let pixels = if sample_type.is_sub_byte() {
        let samples_per_row = width as usize * samples_per_pixel as usize;
        let mut out = Vec::with_capacity(samples_per_row * height as usize);
        for row in 0..height as usize {
            let row_bytes_slice = &planar[row * row_bytes..(row + 1) * row_bytes];
            out.extend(unpack_bits(row_bytes_slice, sample_type.bit_width(), samples_per_row));
        }
        out
    } else {
        reinterleave_native(&planar, width, height, samples_per_pixel, sample_type, bo)
    };

    let mut raster = Raster::from_pixels(width, height, sample_type, pixel_type, samples_per_pixel, pixels)
        .map_err(|e| io_err(path, e.to_string()))?;
    if let Some(p) = palette {
        raster.set_palette(p).map_err(|e| io_err(path, e.to_string()))?;
    }

    let (mut res_x, mut res_y, mut minx, mut maxy) = (1.0, 1.0, 0.0, height as f64);
    if let Some(scale) = find(TAG_MODEL_PIXEL_SCALE) {
        let off = bo.u32(&scale.value_or_offset) as usize;
        res_x = bo.f64_pair(&buf, off);
        res_y = bo.f64_pair(&buf, off + 8);
    }
    if let Some(tiepoint) = find(TAG_MODEL_TIEPOINT) {
        let off = bo.u32(&tiepoint.value_or_offset) as usize;
        // (i, j, k, x, y, z): raster-space tiepoint (i,j) maps to model-space (x,y).
        minx = bo.f64_pair(&buf, off + 24);
        maxy = bo.f64_pair(&buf, off + 32);
    }

    let srid = find(TAG_GEO_KEY_DIRECTORY).and_then(|dir| read_srid_from_geokeys(dir, bo, &buf));

    Ok(SourceRaster {
        raster,
        res_x,
        res_y,
        minx,
        miny: maxy - res_y * height as f64,
        maxx: minx + res_x * width as f64,
        maxy,
        srid,
        allow_grayscale_rgb_conversion: false,
    })
}

/// Pull `ProjectedCSTypeGeoKey` (3072) or `GeographicTypeGeoKey` (2048) out of
/// the GeoKeyDirectory, the minimal subset needed for SRID recovery.
fn read_srid_from_geokeys(dir: &IfdEntry, bo: ByteOrder, buf: &[u8]) -> Option<i64> {
    let values = dir.values_u32(bo, buf);
    if values.len() < 4 {
        return None;
    }
    let num_keys = values[3] as usize;
    for i in 0..num_keys {
        let base = 4 + i * 4;
        if base + 4 > values.len() {
            break;
        }
        let key_id = values[base];
        let tiff_tag_location = values[base + 1];
        let value = values[base + 3];
        if tiff_tag_location == 0 && matches!(key_id, 3072 | 2048) {
            return Some(value as i64);
        }
    }
    None
}

fn decompress(bytes: &[u8], compression: u32, path: &Path) -> Result<Vec<u8>, ImportError> {
    match compression {
        1 => Ok(bytes.to_vec()),
        8 | 32946 => {
            use std::io::Read;
            let mut out = Vec::new();
            flate2::read::ZlibDecoder::new(bytes).read_to_end(&mut out).map_err(|e| io_err(path, e.to_string()))?;
            Ok(out)
        }
        other => Err(io_err(path, format!("unsupported TIFF compression code {other}"))),
    }
}

fn reinterleave_native(planar: &[u8], width: u32, height: u32, bands: u8, sample_type: SampleType, bo: ByteOrder) -> Vec<u8> {
    let stride = sample_type.in_memory_bytes();
    let mut out = vec![0u8; planar.len()];
    let total_samples = width as usize * height as usize * bands as usize;
    for i in 0..total_samples {
        let src = &planar[i * stride..i * stride + stride];
        let dst = &mut out[i * stride..i * stride + stride];
        if matches!(bo, ByteOrder::Big) {
            for (d, s) in dst.iter_mut().zip(src.iter().rev()) {
                *d = *s;
            }
        } else {
            dst.copy_from_slice(src);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_tiff(path: &Path, width: u16, height: u16, pixels: &[u8]) {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"II");
        buf.extend_from_slice(&42u16.to_le_bytes());
        let ifd_offset = 8u32;
        buf.extend_from_slice(&ifd_offset.to_le_bytes());

        // StripOffsets' value depends on the IFD's total length, so it is
        // computed from `entries.len()` only after every other tag (including
        // StripOffsets itself) is already in the vector — one source of truth
        // for the entry count instead of a second hand-maintained tally.
        let mut entries: Vec<(u16, u16, u32, u32)> = vec![
            (TAG_IMAGE_WIDTH, 3, 1, width as u32),
            (TAG_IMAGE_LENGTH, 3, 1, height as u32),
            (TAG_BITS_PER_SAMPLE, 3, 1, 8),
            (TAG_COMPRESSION, 3, 1, 1),
            (TAG_PHOTOMETRIC, 3, 1, 1),
            (TAG_SAMPLES_PER_PIXEL, 3, 1, 1),
            (TAG_ROWS_PER_STRIP, 3, 1, height as u32),
            (TAG_STRIP_BYTE_COUNTS, 4, 1, pixels.len() as u32),
            (TAG_STRIP_OFFSETS, 4, 1, 0), // patched below
        ];
        let data_offset = ifd_offset as usize + 2 + entries.len() * 12 + 4;
        entries.last_mut().unwrap().3 = data_offset as u32;

        buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, ftype, count, value) in &entries {
            buf.extend_from_slice(&tag.to_le_bytes());
            buf.extend_from_slice(&ftype.to_le_bytes());
            buf.extend_from_slice(&count.to_le_bytes());
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf.extend_from_slice(&0u32.to_le_bytes()); // next IFD offset
        buf.extend_from_slice(pixels);

        let mut f = fs::File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }

    #[test]
    fn reads_minimal_grayscale_strip_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.tif");
        let pixels: Vec<u8> = (0..16).collect();
        write_minimal_tiff(&path, 4, 4, &pixels);
        let source = read(&path).unwrap();
        assert_eq!((source.width(), source.height()), (4, 4));
        assert_eq!(source.raster.pixel_type(), PixelType::Grayscale);
        assert_eq!(source.raster.pixels(), &pixels[..]);
    }

    #[test]
    fn rejects_non_tiff_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tif");
        fs::write(&path, [0u8; 16]).unwrap();
        assert!(read(&path).is_err());
    }
}
