//! Tile blob binary format (spec §6 "Tile blob binary format").
//!
//! Each odd/even blob begins with a fixed header describing the shape it
//! claims to hold, so a decoder can refuse a blob whose declared shape is
//! inconsistent with the tile it is attached to before it touches the payload.

use crate::error::CodecError;
use crate::pixel::{PixelType, SampleType};

use super::compression::Compression;

const MAGIC: u32 = 0x544C_5232; // "TLR2"
const VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobHalf {
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBlobHeader {
    pub compression: Compression,
    pub sample_type: SampleType,
    pub pixel_type: PixelType,
    pub bands: u8,
    pub tile_width: u16,
    pub tile_height: u16,
    pub half: BlobHalf,
}

impl TileBlobHeader {
    pub const SIZE: usize = 4 + 1 + 1 + 1 + 1 + 1 + 2 + 2 + 1;

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE + payload.len());
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.push(VERSION);
        buf.push(self.compression.code());
        buf.push(self.sample_type.code());
        buf.push(self.pixel_type.code());
        buf.push(self.bands);
        buf.extend_from_slice(&self.tile_width.to_le_bytes());
        buf.extend_from_slice(&self.tile_height.to_le_bytes());
        buf.push(match self.half {
            BlobHalf::Odd => 0,
            BlobHalf::Even => 1,
        });
        buf.extend_from_slice(payload);
        buf
    }

    pub fn decode(blob: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let bad = |reason: &str| CodecError::BadTileBlob { reason: reason.into() };
        if blob.len() < Self::SIZE {
            return Err(bad("tile blob shorter than header"));
        }
        let magic = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]);
        if magic != MAGIC {
            return Err(bad("bad tile blob magic"));
        }
        let version = blob[4];
        if version != VERSION {
            return Err(bad("unsupported tile blob version"));
        }
        let compression = Compression::from_code(blob[5]).ok_or_else(|| bad("unknown compression code"))?;
        let sample_type = SampleType::from_code(blob[6]).ok_or_else(|| bad("unknown sample type code"))?;
        let pixel_type = PixelType::from_code(blob[7]).ok_or_else(|| bad("unknown pixel type code"))?;
        let bands = blob[8];
        let tile_width = u16::from_le_bytes([blob[9], blob[10]]);
        let tile_height = u16::from_le_bytes([blob[11], blob[12]]);
        let half = match blob[13] {
            0 => BlobHalf::Odd,
            1 => BlobHalf::Even,
            _ => return Err(bad("invalid odd/even flag")),
        };
        let header = TileBlobHeader {
            compression,
            sample_type,
            pixel_type,
            bands,
            tile_width,
            tile_height,
            half,
        };
        Ok((header, &blob[Self::SIZE..]))
    }

    /// Refuse blobs whose declared shape doesn't match the tile they're attached to.
    pub fn check_shape(&self, tile_width: u32, tile_height: u32, sample_type: SampleType, pixel_type: PixelType, bands: u8) -> Result<(), CodecError> {
        if self.tile_width as u32 != tile_width
            || self.tile_height as u32 != tile_height
            || self.sample_type != sample_type
            || self.pixel_type != pixel_type
            || self.bands != bands
        {
            return Err(CodecError::BadTileBlob {
                reason: "blob header shape does not match the tile it is attached to".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = TileBlobHeader {
            compression: Compression::Png,
            sample_type: SampleType::UInt8,
            pixel_type: PixelType::Rgb,
            bands: 3,
            tile_width: 256,
            tile_height: 256,
            half: BlobHalf::Odd,
        };
        let blob = header.encode(&[1, 2, 3]);
        let (back, payload) = TileBlobHeader::decode(&blob).unwrap();
        assert_eq!(header, back);
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = vec![0u8; TileBlobHeader::SIZE];
        assert!(TileBlobHeader::decode(&blob).is_err());
        blob[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        blob[4] = VERSION;
        blob[5] = Compression::None.code();
        blob[6] = SampleType::UInt8.code();
        blob[7] = PixelType::Grayscale.code();
        blob[8] = 1;
        assert!(TileBlobHeader::decode(&blob).is_ok());
    }

    #[test]
    fn shape_mismatch_detected() {
        let header = TileBlobHeader {
            compression: Compression::None,
            sample_type: SampleType::UInt8,
            pixel_type: PixelType::Grayscale,
            bands: 1,
            tile_width: 256,
            tile_height: 256,
            half: BlobHalf::Odd,
        };
        assert!(header
            .check_shape(256, 256, SampleType::UInt8, PixelType::Grayscale, 1)
            .is_ok());
        assert!(header
            .check_shape(128, 128, SampleType::UInt8, PixelType::Grayscale, 1)
            .is_err());
    }
}
