//! The block-rescale primitive shared by scale>1 tile decode (§4.3) and the
//! pyramid builder's 16x16 block rescale (§4.10).
//!
//! Given a window of same-shape pixels, produce the single pixel that
//! represents it: arithmetic mean per band for continuous sample types
//! (excluding transparent samples), modal index for palette/monochrome
//! pixels, transparent if every input sample was transparent (spec §9
//! "Rescale-block primitive" — averaging for continuous types, modal for
//! discrete; do not silently average palette codes).

use std::collections::HashMap;

use crate::error::PixelError;
use crate::pixel::{Pixel, PixelType, SampleType};

/// Collapse `samples` (all the same shape) into one representative pixel.
pub fn rescale_samples(samples: &[Pixel]) -> Result<Pixel, PixelError> {
    assert!(!samples.is_empty(), "rescale_samples requires at least one sample");
    let sample_type = samples[0].sample_type();
    let pixel_type = samples[0].pixel_type();
    let bands = samples[0].bands();

    let opaque: Vec<&Pixel> = samples.iter().filter(|p| !p.is_transparent()).collect();
    if opaque.is_empty() {
        let mut out = Pixel::new(sample_type, pixel_type, bands as u8)?;
        out.set_transparent(true);
        return Ok(out);
    }

    let discrete = matches!(pixel_type, PixelType::Palette | PixelType::Monochrome);

    let mut out = Pixel::new(sample_type, pixel_type, bands as u8)?;
    for band in 0..bands {
        let value = if discrete {
            modal_value(&opaque, band)
        } else {
            mean_value(&opaque, band)
        };
        out.set_sample(band, value)?;
    }
    Ok(out)
}

fn mean_value(samples: &[&Pixel], band: usize) -> f64 {
    let sum: f64 = samples.iter().map(|p| p.sample(band).unwrap_or(0.0)).sum();
    sum / samples.len() as f64
}

fn modal_value(samples: &[&Pixel], band: usize) -> f64 {
    let mut counts: HashMap<u64, (f64, usize)> = HashMap::new();
    for p in samples {
        let v = p.sample(band).unwrap_or(0.0);
        let key = v.to_bits();
        let entry = counts.entry(key).or_insert((v, 0));
        entry.1 += 1;
    }
    // Ties broken by the smallest value for determinism (spec §8 invariant 6 /
    // §4.10 "Re-building" determinism requirement).
    counts
        .into_values()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.partial_cmp(&a.0).unwrap()))
        .map(|(v, _)| v)
        .unwrap_or(0.0)
}

/// Box-downsample `width x height` worth of pixels read via `get` (row-major,
/// 0-indexed) by an integer `block` factor in both axes. `width`/`height` must
/// be divisible by `block`.
pub fn rescale_block_grid<F>(width: u32, height: u32, block: u32, mut get: F) -> Result<Vec<Pixel>, PixelError>
where
    F: FnMut(u32, u32) -> Result<Pixel, PixelError>,
{
    assert_eq!(width % block, 0);
    assert_eq!(height % block, 0);
    let out_w = width / block;
    let out_h = height / block;
    let mut out = Vec::with_capacity((out_w * out_h) as usize);
    for by in 0..out_h {
        for bx in 0..out_w {
            let mut window = Vec::with_capacity((block * block) as usize);
            for dy in 0..block {
                for dx in 0..block {
                    window.push(get(bx * block + dx, by * block + dy)?);
                }
            }
            out.push(rescale_samples(&window)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::SampleType;

    #[test]
    fn averages_continuous_samples() {
        let a = Pixel::from_samples(SampleType::UInt8, PixelType::Grayscale, vec![10.0]).unwrap();
        let b = Pixel::from_samples(SampleType::UInt8, PixelType::Grayscale, vec![20.0]).unwrap();
        let out = rescale_samples(&[a, b]).unwrap();
        assert_eq!(out.sample(0), Some(15.0));
    }

    #[test]
    fn modal_for_palette() {
        let a = Pixel::from_samples(SampleType::UInt8, PixelType::Palette, vec![3.0]).unwrap();
        let b = Pixel::from_samples(SampleType::UInt8, PixelType::Palette, vec![3.0]).unwrap();
        let c = Pixel::from_samples(SampleType::UInt8, PixelType::Palette, vec![7.0]).unwrap();
        let out = rescale_samples(&[a, b, c]).unwrap();
        assert_eq!(out.sample(0), Some(3.0));
    }

    #[test]
    fn all_transparent_stays_transparent() {
        let mut a = Pixel::new(SampleType::UInt8, PixelType::Grayscale, 1).unwrap();
        a.set_transparent(true);
        let mut b = a.clone();
        b.set_transparent(true);
        let out = rescale_samples(&[a, b]).unwrap();
        assert!(out.is_transparent());
    }

    #[test]
    fn transparent_samples_excluded_from_average() {
        let mut transparent = Pixel::from_samples(SampleType::UInt8, PixelType::Grayscale, vec![0.0]).unwrap();
        transparent.set_transparent(true);
        let opaque = Pixel::from_samples(SampleType::UInt8, PixelType::Grayscale, vec![40.0]).unwrap();
        let out = rescale_samples(&[transparent, opaque]).unwrap();
        assert_eq!(out.sample(0), Some(40.0));
        assert!(!out.is_transparent());
    }
}
