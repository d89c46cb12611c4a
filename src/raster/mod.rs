//! Raster buffer & tile priming (spec C2).
//!
//! Owns the pixel byte buffer, optional transparency mask, and optional
//! palette clone/no-data pixel that travel with a decoded or about-to-be-encoded
//! tile.

mod buffer;
mod rescale;

pub use buffer::{prime_void_tile, prime_void_tile_palette, Raster};
pub use rescale::{rescale_block_grid, rescale_samples};
