//! Tile codec: compression families, the tile blob binary format, sub-byte
//! packing, pixel-format conversions, and the encode/decode orchestration
//! that ties them together (spec C3).

mod blob;
mod compression;
mod conversions;
mod fax4;
mod gif_codec;
mod packing;
mod png_codec;
mod tile_codec;

pub use blob::{BlobHalf, TileBlobHeader};
pub use compression::Compression;
pub use conversions::{grayscale_to_rgb, monochrome_to_grayscale, palette_to_grayscale, palette_to_rgb, promote_palette_for_scale, rgb_to_grayscale};
pub use packing::{pack_bits, unpack_bits};
pub use tile_codec::{decode, encode};

/// Encode a raster as a standalone PNG file (spec §6 `GetMapImage`), distinct
/// from [`encode`]'s tile blob format: no odd/even split, no header, just the
/// bytes a browser or `file` command recognises as a PNG.
pub fn encode_png(raster: &crate::raster::Raster) -> Result<Vec<u8>, crate::error::CodecError> {
    png_codec::encode(raster)
}
