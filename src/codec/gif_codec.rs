//! GIF payload encode/decode using the `gif` crate directly, preserving exact
//! palette indices rather than quantizing (spec §4.3 GIF row).

use std::borrow::Cow;

use crate::error::CodecError;
use crate::pixel::{Palette, PixelType, RgbEntry, SampleType};
use crate::raster::Raster;

pub fn encode(raster: &Raster) -> Result<Vec<u8>, CodecError> {
    if raster.pixel_type() != PixelType::Palette {
        return Err(CodecError::BadTileBlob {
            reason: "gif codec requires a palette raster".into(),
        });
    }
    let palette = raster.palette().ok_or_else(|| CodecError::BadTileBlob {
        reason: "gif codec requires a palette".into(),
    })?;
    let global_palette: Vec<u8> = palette.entries().iter().flat_map(|e| [e.r, e.g, e.b]).collect();

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, raster.width() as u16, raster.height() as u16, &global_palette)
            .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        let frame = gif::Frame {
            width: raster.width() as u16,
            height: raster.height() as u16,
            buffer: Cow::Borrowed(raster.pixels()),
            palette: None,
            transparent: None,
            ..Default::default()
        };
        encoder.write_frame(&frame).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    }
    Ok(out)
}

pub fn decode(payload: &[u8], width: u32, height: u32, sample_type: SampleType) -> Result<Raster, CodecError> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options
        .read_info(payload)
        .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    let frame = decoder
        .read_next_frame()
        .map_err(|e| CodecError::CodecFailure(e.to_string()))?
        .ok_or_else(|| CodecError::BadTileBlob {
            reason: "gif payload has no frames".into(),
        })?;

    let indices = frame.buffer.to_vec();
    let mut raster = Raster::from_pixels(width, height, sample_type, PixelType::Palette, 1, indices)
        .map_err(|e| CodecError::BadTileBlob { reason: e.to_string() })?;

    let global = decoder.global_palette().or(frame.palette.as_deref());
    if let Some(bytes) = global {
        let entries: Vec<RgbEntry> = bytes.chunks_exact(3).map(|c| RgbEntry::new(c[0], c[1], c[2])).collect();
        let max_entries = 1usize << sample_type.bit_width();
        if let Ok(palette) = Palette::new(entries, max_entries.max(1)) {
            let _ = raster.set_palette(palette);
        }
    }
    Ok(raster)
}
