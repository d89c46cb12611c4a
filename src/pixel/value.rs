//! In-memory pixel values (spec §3 "Pixel", §4.1).

use super::palette::Palette;
use super::types::{validate_shape, PixelType, SampleType};
use crate::error::PixelError;

/// One pixel's worth of typed samples plus a transparency flag.
///
/// Samples are stored as `f64` internally regardless of `sample_type` — every
/// sample type this engine supports (1..32-bit integers, `f32`, `f64`) round-trips
/// exactly through `f64`, so this buys uniform band arithmetic (min/max/histogram,
/// §4.4) without per-type branching at every call site; `sample_type` still gates
/// range validation and serialization width.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixel {
    sample_type: SampleType,
    pixel_type: PixelType,
    samples: Vec<f64>,
    transparent: bool,
}

impl Pixel {
    /// Create a pixel of the given shape with all samples at zero.
    pub fn new(sample_type: SampleType, pixel_type: PixelType, bands: u8) -> Result<Self, PixelError> {
        validate_shape(sample_type, pixel_type, bands)?;
        Ok(Self {
            sample_type,
            pixel_type,
            samples: vec![0.0; bands as usize],
            transparent: false,
        })
    }

    pub fn from_samples(sample_type: SampleType, pixel_type: PixelType, samples: Vec<f64>) -> Result<Self, PixelError> {
        validate_shape(sample_type, pixel_type, samples.len() as u8)?;
        let mut pixel = Self {
            sample_type,
            pixel_type,
            samples: vec![0.0; samples.len()],
            transparent: false,
        };
        for (i, s) in samples.into_iter().enumerate() {
            pixel.set_sample(i, s)?;
        }
        Ok(pixel)
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn bands(&self) -> usize {
        self.samples.len()
    }

    pub fn sample(&self, band: usize) -> Option<f64> {
        self.samples.get(band).copied()
    }

    /// Set `band`'s sample, rejecting values outside the declared sample width.
    pub fn set_sample(&mut self, band: usize, value: f64) -> Result<(), PixelError> {
        if band >= self.samples.len() {
            return Err(PixelError::InvalidRange {
                sample: self.sample_type,
                band,
                value: value as i64,
            });
        }
        if !self.sample_type.is_float() {
            let v = value.round();
            if v < self.sample_type.min_value() as f64 || v > self.sample_type.max_value() as f64 {
                return Err(PixelError::InvalidRange {
                    sample: self.sample_type,
                    band,
                    value: value as i64,
                });
            }
            self.samples[band] = v;
        } else {
            self.samples[band] = value;
        }
        Ok(())
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn set_transparent(&mut self, transparent: bool) {
        self.transparent = transparent;
    }

    /// Element-wise comparison; differing shapes compare unequal without fault.
    pub fn equals(&self, other: &Pixel) -> bool {
        self.sample_type == other.sample_type
            && self.pixel_type == other.pixel_type
            && self.samples == other.samples
            && self.transparent == other.transparent
    }

    /// Select a single band, producing a grayscale/datagrid pixel (spec §4.1 "derive a narrower pixel").
    pub fn select_band(&self, band: usize) -> Result<Pixel, PixelError> {
        let value = self.sample(band).ok_or_else(|| PixelError::InvalidRange {
            sample: self.sample_type,
            band,
            value: 0,
        })?;
        let narrower_pixel_type = match self.pixel_type {
            PixelType::DataGrid => PixelType::DataGrid,
            _ => PixelType::Grayscale,
        };
        let mut pixel = Pixel::new(self.sample_type, narrower_pixel_type, 1)?;
        pixel.set_sample(0, value)?;
        pixel.set_transparent(self.transparent);
        Ok(pixel)
    }

    /// Select three bands as an RGB triple from a multiband pixel.
    pub fn select_rgb_triple(&self, r: usize, g: usize, b: usize) -> Result<Pixel, PixelError> {
        let rv = self.sample(r).ok_or_else(|| PixelError::InvalidRange { sample: self.sample_type, band: r, value: 0 })?;
        let gv = self.sample(g).ok_or_else(|| PixelError::InvalidRange { sample: self.sample_type, band: g, value: 0 })?;
        let bv = self.sample(b).ok_or_else(|| PixelError::InvalidRange { sample: self.sample_type, band: b, value: 0 })?;
        let mut pixel = Pixel::new(self.sample_type, PixelType::Rgb, 3)?;
        pixel.set_sample(0, rv)?;
        pixel.set_sample(1, gv)?;
        pixel.set_sample(2, bv)?;
        pixel.set_transparent(self.transparent);
        Ok(pixel)
    }

    /// Default no-data pixel for a `(sample, pixel, bands)` shape (spec §4.1 "Default no-data").
    pub fn default_no_data(sample_type: SampleType, pixel_type: PixelType, bands: u8) -> Result<Pixel, PixelError> {
        let mut pixel = Pixel::new(sample_type, pixel_type, bands)?;
        let value = match pixel_type {
            PixelType::Monochrome => 0.0,
            PixelType::Grayscale => sample_type.max_value() as f64,
            PixelType::Rgb => {
                if sample_type.bit_width() <= 8 {
                    sample_type.max_value() as f64
                } else {
                    0.0
                }
            }
            PixelType::DataGrid => 0.0,
            PixelType::Multiband => sample_type.max_value() as f64,
            PixelType::Palette => 0.0,
        };
        for band in 0..bands as usize {
            pixel.set_sample(band, value)?;
        }
        Ok(pixel)
    }

    /// Serialize as the short tagged byte string of spec §6 "Pixel blob (no-data)":
    /// `magic, sample, pixel, bands, then bands * f64 le, then one transparency byte`.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.samples.len() * 8 + 1);
        buf.push(0xB5); // magic
        buf.push(self.sample_type.code());
        buf.push(self.pixel_type.code());
        buf.push(self.samples.len() as u8);
        for s in &self.samples {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        buf.push(self.transparent as u8);
        buf
    }

    pub fn from_blob(blob: &[u8]) -> Result<Pixel, PixelError> {
        let bad = |reason: &str| PixelError::BadPixelBlob { reason: reason.into() };
        if blob.len() < 4 {
            return Err(bad("pixel blob too short"));
        }
        if blob[0] != 0xB5 {
            return Err(bad("bad pixel blob magic"));
        }
        let sample_type = SampleType::from_code(blob[1]).ok_or_else(|| bad("unknown sample type code"))?;
        let pixel_type = PixelType::from_code(blob[2]).ok_or_else(|| bad("unknown pixel type code"))?;
        let bands = blob[3] as usize;
        let expected_len = 4 + bands * 8 + 1;
        if blob.len() != expected_len {
            return Err(bad("pixel blob length does not match band count"));
        }
        let mut samples = Vec::with_capacity(bands);
        for i in 0..bands {
            let off = 4 + i * 8;
            let mut b = [0u8; 8];
            b.copy_from_slice(&blob[off..off + 8]);
            samples.push(f64::from_le_bytes(b));
        }
        let transparent = blob[4 + bands * 8] != 0;
        let mut pixel = Pixel::from_samples(sample_type, pixel_type, samples)?;
        pixel.set_transparent(transparent);
        Ok(pixel)
    }

    /// Decode a palette index into its RGB colour, honouring the palette's transparency flag.
    pub fn palette_lookup(&self, palette: &Palette) -> Result<Pixel, PixelError> {
        if self.pixel_type != PixelType::Palette {
            return Err(PixelError::InvalidShape {
                sample: self.sample_type,
                pixel: self.pixel_type,
                bands: self.bands() as u8,
            });
        }
        let index = self.sample(0).unwrap_or(0.0) as usize;
        let entry = palette.get(index).ok_or_else(|| PixelError::InvalidPalette {
            reason: format!("palette index {index} out of range"),
        })?;
        let mut rgb = Pixel::new(SampleType::UInt8, PixelType::Rgb, 3)?;
        rgb.set_sample(0, entry.r as f64)?;
        rgb.set_sample(1, entry.g as f64)?;
        rgb.set_sample(2, entry.b as f64)?;
        rgb.set_transparent(palette.is_transparent(index));
        Ok(rgb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_sample() {
        let mut p = Pixel::new(SampleType::UInt8, PixelType::Grayscale, 1).unwrap();
        assert!(p.set_sample(0, 300.0).is_err());
        assert!(p.set_sample(0, 255.0).is_ok());
    }

    #[test]
    fn equals_is_elementwise() {
        let a = Pixel::from_samples(SampleType::UInt8, PixelType::Rgb, vec![1.0, 2.0, 3.0]).unwrap();
        let b = Pixel::from_samples(SampleType::UInt8, PixelType::Rgb, vec![1.0, 2.0, 3.0]).unwrap();
        let c = Pixel::from_samples(SampleType::UInt8, PixelType::Rgb, vec![1.0, 2.0, 4.0]).unwrap();
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn differing_shapes_compare_unequal_without_fault() {
        let a = Pixel::new(SampleType::UInt8, PixelType::Grayscale, 1).unwrap();
        let b = Pixel::new(SampleType::UInt16, PixelType::Grayscale, 1).unwrap();
        assert!(!a.equals(&b));
    }

    #[test]
    fn default_no_data_matches_table() {
        assert_eq!(
            Pixel::default_no_data(SampleType::UInt1, PixelType::Monochrome, 1).unwrap().sample(0),
            Some(0.0)
        );
        assert_eq!(
            Pixel::default_no_data(SampleType::UInt8, PixelType::Grayscale, 1).unwrap().sample(0),
            Some(255.0)
        );
        assert_eq!(
            Pixel::default_no_data(SampleType::UInt8, PixelType::Rgb, 3).unwrap().sample(0),
            Some(255.0)
        );
        assert_eq!(
            Pixel::default_no_data(SampleType::UInt16, PixelType::Rgb, 3).unwrap().sample(0),
            Some(0.0)
        );
        assert_eq!(
            Pixel::default_no_data(SampleType::Int16, PixelType::DataGrid, 1).unwrap().sample(0),
            Some(0.0)
        );
    }

    #[test]
    fn pixel_blob_roundtrip() {
        let mut p = Pixel::from_samples(SampleType::Int16, PixelType::DataGrid, vec![-9999.0]).unwrap();
        p.set_transparent(false);
        let blob = p.to_blob();
        let back = Pixel::from_blob(&blob).unwrap();
        assert!(p.equals(&back));
    }

    #[test]
    fn bad_pixel_blob_detected() {
        assert!(Pixel::from_blob(&[1, 2, 3]).is_err());
        let mut blob = Pixel::from_samples(SampleType::UInt8, PixelType::Grayscale, vec![5.0])
            .unwrap()
            .to_blob();
        blob[0] = 0x00;
        assert!(Pixel::from_blob(&blob).is_err());
    }

    #[test]
    fn select_band_from_multiband() {
        let mb = Pixel::from_samples(SampleType::UInt16, PixelType::Multiband, vec![10.0, 20.0, 30.0, 40.0]).unwrap();
        let band = mb.select_band(2).unwrap();
        assert_eq!(band.sample(0), Some(30.0));
        assert_eq!(band.pixel_type(), PixelType::Grayscale);
    }

    #[test]
    fn palette_lookup_respects_transparency() {
        let palette = Palette::new(vec![super::super::palette::RgbEntry::new(10, 20, 30)], 4).unwrap();
        let idx = Pixel::from_samples(SampleType::UInt4, PixelType::Palette, vec![0.0]).unwrap();
        let rgb = idx.palette_lookup(&palette).unwrap();
        assert_eq!(rgb.sample(0), Some(10.0));
        assert!(!rgb.is_transparent());
    }
}
