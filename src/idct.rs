#![allow(clippy::cast_possible_truncation, clippy::needless_range_loop)]

//! The DCT collaborators of the scan machinery: a dequantizing
//! inverse transform for decoding and a quantizing forward transform
//! for encoding, both scalar over 8x8 blocks of `i32`.
//!
//! The kernels are the plain separable form; the scan drivers only
//! rely on the input/output contract (raster blocks in, raster
//! samples out, level shift applied here), not on the factorization.

use std::sync::OnceLock;

use crate::misc::DCT_BLOCK;
use crate::tables::QuantizationTable;

/// cos((2x + 1) u pi / 16) scaled by the DCT normalization, row `u`,
/// column `x`.
fn cosine_table() -> &'static [[f32; 8]; 8] {
    static TABLE: OnceLock<[[f32; 8]; 8]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0f32; 8]; 8];
        for u in 0..8 {
            let cu = if u == 0 {
                (1f32 / 8f32).sqrt()
            } else {
                (2f32 / 8f32).sqrt()
            };
            for x in 0..8 {
                table[u][x] =
                    cu * ((2 * x + 1) as f32 * u as f32 * std::f32::consts::PI / 16.0).cos();
            }
        }
        table
    })
}

/// Dequantize a coefficient block and transform it back to samples,
/// adding the level shift for the given precision. Results are
/// clamped to the sample range unless the block belongs to a
/// differential frame, whose samples legitimately leave it.
pub fn dequantize_and_idct_block(
    coefficients: &[i32], quant: &QuantizationTable, precision: u8, clamp: bool,
    out: &mut [i32; DCT_BLOCK],
) {
    debug_assert_eq!(coefficients.len(), DCT_BLOCK);
    let cos = cosine_table();
    let level = 1i32 << (precision - 1);
    let max = (1i32 << precision) - 1;

    let mut dequantized = [0f32; DCT_BLOCK];
    for k in 0..DCT_BLOCK {
        dequantized[k] = (coefficients[k] * i32::from(quant.values[k])) as f32;
    }

    // columns then rows
    let mut partial = [0f32; DCT_BLOCK];
    for x in 0..8 {
        for y in 0..8 {
            let mut accumulator = 0f32;
            for v in 0..8 {
                accumulator += cos[v][y] * dequantized[v * 8 + x];
            }
            partial[y * 8 + x] = accumulator;
        }
    }
    for y in 0..8 {
        for x in 0..8 {
            let mut accumulator = 0f32;
            for u in 0..8 {
                accumulator += cos[u][x] * partial[y * 8 + u];
            }
            let sample = accumulator.round() as i32 + level;
            out[y * 8 + x] = if clamp { sample.clamp(0, max) } else { sample };
        }
    }
}

/// Level shift a sample block, transform it forward and quantize with
/// rounding to the nearest bucket.
pub fn forward_dct_quantize(
    samples: &[i32; DCT_BLOCK], quant: &QuantizationTable, precision: u8,
    out: &mut [i32],
) {
    debug_assert_eq!(out.len(), DCT_BLOCK);
    let cos = cosine_table();
    let level = 1i32 << (precision - 1);

    let mut shifted = [0f32; DCT_BLOCK];
    for k in 0..DCT_BLOCK {
        shifted[k] = (samples[k] - level) as f32;
    }

    let mut partial = [0f32; DCT_BLOCK];
    for u in 0..8 {
        for y in 0..8 {
            let mut accumulator = 0f32;
            for x in 0..8 {
                accumulator += cos[u][x] * shifted[y * 8 + x];
            }
            partial[y * 8 + u] = accumulator;
        }
    }
    for v in 0..8 {
        for u in 0..8 {
            let mut accumulator = 0f32;
            for y in 0..8 {
                accumulator += cos[v][y] * partial[y * 8 + u];
            }
            let q = f32::from(quant.values[v * 8 + u]);
            out[v * 8 + u] = (accumulator / q).round() as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_quant() -> QuantizationTable {
        QuantizationTable::default()
    }

    #[test]
    fn dc_only_block_is_flat() {
        let mut coefficients = [0i32; DCT_BLOCK];
        // DC of 64 at unit quantization lifts every sample by 8
        coefficients[0] = 64;
        let mut out = [0i32; DCT_BLOCK];
        dequantize_and_idct_block(&coefficients, &flat_quant(), 8, true, &mut out);
        assert!(out.iter().all(|s| *s == 136), "{out:?}");
    }

    #[test]
    fn forward_backward_is_near_identity() {
        let samples: [i32; DCT_BLOCK] =
            std::array::from_fn(|i| ((i * 37 + (i / 8) * 23) % 256) as i32);
        let quant = flat_quant();

        let mut coefficients = [0i32; DCT_BLOCK];
        forward_dct_quantize(&samples, &quant, 8, &mut coefficients);
        let mut reconstructed = [0i32; DCT_BLOCK];
        dequantize_and_idct_block(&coefficients, &quant, 8, true, &mut reconstructed);

        for (a, b) in samples.iter().zip(reconstructed.iter()) {
            assert!((a - b).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn quantization_shrinks_magnitudes() {
        let samples: [i32; DCT_BLOCK] = std::array::from_fn(|i| (i as i32 * 4) % 256);
        let strong = QuantizationTable::luma_for_quality(10);
        let mut coefficients = [0i32; DCT_BLOCK];
        forward_dct_quantize(&samples, &strong, 8, &mut coefficients);
        // heavy quantization wipes the high band
        assert!(coefficients[63].abs() <= 1);
    }
}
