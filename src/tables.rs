#![allow(clippy::cast_possible_truncation)]

//! Table storage shared by the whole codec: quantization matrices,
//! arithmetic conditioning parameters and the JPEG-LS preset values.
//! Marker-level (de)serialization of these lives in `headers.rs`;
//! this module owns the data and its defaults.

use crate::errors::{ErrorKind, JpgError, JpgResult};
use crate::huffman::HuffmanTemplate;
use crate::misc::UN_ZIGZAG;

/// A quantization matrix. Stored in raster order; the zigzag
/// permutation is applied when crossing the wire.
#[derive(Clone)]
pub struct QuantizationTable {
    /// Bucket sizes, raster order.
    pub values: [u16; 64],
    /// True when any entry needs 16 bits (DQT `Pq = 1`).
    pub wide:   bool,
}

impl Default for QuantizationTable {
    fn default() -> Self {
        QuantizationTable {
            values: [1; 64],
            wide:   false,
        }
    }
}

impl QuantizationTable {
    /// Build from 64 wire-order (zigzag) entries.
    pub fn from_zigzag(zigzag: &[u16; 64], wide: bool) -> QuantizationTable {
        let mut values = [0u16; 64];
        for (i, v) in zigzag.iter().enumerate() {
            values[UN_ZIGZAG[i]] = *v;
        }
        QuantizationTable { values, wide }
    }

    /// Serialize back to wire order.
    pub fn to_zigzag(&self) -> [u16; 64] {
        let mut out = [0u16; 64];
        for i in 0..64 {
            out[i] = self.values[UN_ZIGZAG[i]];
        }
        out
    }

    /// The Annex K example luminance matrix scaled to `quality`
    /// (1..=100) with the usual 50-point pivot rule.
    pub fn luma_for_quality(quality: u8) -> QuantizationTable {
        QuantizationTable::scaled(&ANNEX_K_LUMA, quality)
    }

    /// The Annex K example chrominance matrix scaled to `quality`.
    pub fn chroma_for_quality(quality: u8) -> QuantizationTable {
        QuantizationTable::scaled(&ANNEX_K_CHROMA, quality)
    }

    fn scaled(base: &[u16; 64], quality: u8) -> QuantizationTable {
        let quality = i32::from(quality.clamp(1, 100));
        let scale = if quality < 50 {
            5000 / quality
        } else {
            200 - quality * 2
        };
        let mut values = [0u16; 64];
        for (i, v) in base.iter().enumerate() {
            let q = (i32::from(*v) * scale + 50) / 100;
            values[i] = q.clamp(1, 255) as u16;
        }
        QuantizationTable {
            values,
            wide: false,
        }
    }
}

/// The example luminance matrix of T.81 Annex K, raster order.
#[rustfmt::skip]
pub const ANNEX_K_LUMA: [u16; 64] = [
    16, 11, 10, 16,  24,  40,  51,  61,
    12, 12, 14, 19,  26,  58,  60,  55,
    14, 13, 16, 24,  40,  57,  69,  56,
    14, 17, 22, 29,  51,  87,  80,  62,
    18, 22, 37, 56,  68, 109, 103,  77,
    24, 35, 55, 64,  81, 104, 113,  92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103,  99,
];

/// The example chrominance matrix of T.81 Annex K, raster order.
#[rustfmt::skip]
pub const ANNEX_K_CHROMA: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// Arithmetic-coding conditioning parameters (one DAC entry).
///
/// DC tables carry the small/large classification thresholds `(L, U)`,
/// AC tables the band discriminator `Kx`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ACConditioning {
    /// Lower threshold, `0 <= l <= u <= 15`.
    pub lower: u8,
    /// Upper threshold.
    pub upper: u8,
    /// AC band discriminator, `1..=63`.
    pub kx:    u8,
}

impl Default for ACConditioning {
    fn default() -> Self {
        // the defaults of T.81 F.1.4.4.1.4 / F.1.4.4.2.1
        ACConditioning {
            lower: 0,
            upper: 1,
            kx:    5,
        }
    }
}

impl ACConditioning {
    pub fn dc(lower: u8, upper: u8) -> JpgResult<ACConditioning> {
        if lower > upper || upper > 15 {
            return Err(JpgError::malformed(
                "ACConditioning::dc",
                format!("DC conditioning needs 0 <= L <= U <= 15, got L={lower} U={upper}"),
            ));
        }
        Ok(ACConditioning {
            lower,
            upper,
            ..ACConditioning::default()
        })
    }

    pub fn ac(kx: u8) -> JpgResult<ACConditioning> {
        if kx == 0 || kx > 63 {
            return Err(JpgError::malformed(
                "ACConditioning::ac",
                format!("AC band discriminator must be in 1..=63, got {kx}"),
            ));
        }
        Ok(ACConditioning {
            kx,
            ..ACConditioning::default()
        })
    }
}

/// JPEG-LS preset coding parameters (LSE id 1), plus the precision
/// based defaults of T.87 C.2.4.1.1.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Thresholds {
    pub max_val: u16,
    pub t1:      u16,
    pub t2:      u16,
    pub t3:      u16,
    pub reset:   u16,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            max_val: 255,
            t1:      3,
            t2:      7,
            t3:      21,
            reset:   64,
        }
    }
}

impl Thresholds {
    /// The default parameters for a precision and near value.
    pub fn for_precision(bpp: u8, near: u16) -> Thresholds {
        let max_val = ((1u32 << bpp) - 1) as u16;
        let mut t = Thresholds {
            max_val,
            ..Thresholds::default()
        };

        if max_val >= 128 {
            let factor = u32::from(max_val.min(4095) + 128) >> 8;
            let clamp = |v: u32, lo: u32| -> u16 {
                if v > u32::from(max_val) || v < lo {
                    lo as u16
                } else {
                    v as u16
                }
            };
            t.t1 = clamp(factor * (3 - 2) + 2 + 3 * u32::from(near), u32::from(near) + 1);
            t.t2 = clamp(factor * (7 - 3) + 3 + 5 * u32::from(near), u32::from(t.t1));
            t.t3 = clamp(factor * (21 - 4) + 4 + 7 * u32::from(near), u32::from(t.t2));
        } else {
            let factor = 256 / (u32::from(max_val) + 1);
            let clamp = |v: u32, floor: u32, lo: u32| -> u16 {
                let v = v.max(floor);
                if v > u32::from(max_val) || v < lo {
                    lo as u16
                } else {
                    v as u16
                }
            };
            t.t1 = clamp(3 / factor + 3 * u32::from(near), 2, u32::from(near) + 1);
            t.t2 = clamp(7 / factor + 5 * u32::from(near), 3, u32::from(t.t1));
            t.t3 = clamp(21 / factor + 7 * u32::from(near), 4, u32::from(t.t2));
        }
        t.reset = 64;
        t
    }
}

/// The JPEG-LS reversible color transform announced by LSE id 0x0D.
///
/// Each transformed component carries a right-shift amount, a
/// centering flag and one matrix row of weights over the *other*
/// components.
#[derive(Clone, Debug, Default)]
pub struct LsColorTrafo {
    pub max_trans: u16,
    /// Transformed component labels, in scan order.
    pub labels:    Vec<u8>,
    /// Right shift per component, `0..=32`.
    pub shift:     Vec<u8>,
    /// Whether the weighted sum is centered before shifting.
    pub centered:  Vec<bool>,
    /// Row-major `depth x (depth - 1)` weight matrix.
    pub matrix:    Vec<u16>,
}

impl LsColorTrafo {
    pub fn depth(&self) -> usize {
        self.labels.len()
    }
}

/// All tables a codec instance owns; scans borrow from here.
#[derive(Default)]
pub struct Tables {
    pub quant:            [Option<QuantizationTable>; 4],
    pub dc_huffman:       [Option<HuffmanTemplate>; 4],
    pub ac_huffman:       [Option<HuffmanTemplate>; 4],
    pub dc_conditioning:  [Option<ACConditioning>; 4],
    pub ac_conditioning:  [Option<ACConditioning>; 4],
    pub thresholds:       Option<Thresholds>,
    pub ls_color_trafo:   Option<LsColorTrafo>,
    /// MCUs between restart markers; zero disables restarts.
    pub restart_interval: u16,
    /// Escalate recoverable stream damage to hard errors.
    pub strict:           bool,
}

impl Tables {
    pub fn new() -> Tables {
        Tables::default()
    }

    pub fn quant_table(&self, index: usize, method: &'static str) -> JpgResult<&QuantizationTable> {
        self.quant[index & 3].as_ref().ok_or_else(|| {
            JpgError::new(
                ErrorKind::ObjectDoesntExist,
                method,
                format!("quantization table {index} was never defined"),
            )
        })
    }

    pub fn dc_template(&self, index: usize, method: &'static str) -> JpgResult<&HuffmanTemplate> {
        self.dc_huffman[index & 3].as_ref().ok_or_else(|| {
            JpgError::new(
                ErrorKind::ObjectDoesntExist,
                method,
                format!("DC Huffman table {index} was never defined"),
            )
        })
    }

    pub fn ac_template(&self, index: usize, method: &'static str) -> JpgResult<&HuffmanTemplate> {
        self.ac_huffman[index & 3].as_ref().ok_or_else(|| {
            JpgError::new(
                ErrorKind::ObjectDoesntExist,
                method,
                format!("AC Huffman table {index} was never defined"),
            )
        })
    }

    /// DC conditioning with the standard defaults when absent.
    pub fn dc_conditioning_or_default(&self, index: usize) -> ACConditioning {
        self.dc_conditioning[index & 3].unwrap_or_default()
    }

    /// AC conditioning with the standard defaults when absent.
    pub fn ac_conditioning_or_default(&self, index: usize) -> ACConditioning {
        self.ac_conditioning[index & 3].unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_roundtrip() {
        let mut zz = [0u16; 64];
        for (i, v) in zz.iter_mut().enumerate() {
            *v = i as u16 + 1;
        }
        let table = QuantizationTable::from_zigzag(&zz, false);
        assert_eq!(table.to_zigzag(), zz);
        // DC entry stays in place
        assert_eq!(table.values[0], 1);
    }

    #[test]
    fn quality_scaling_pivots_at_50() {
        let q50 = QuantizationTable::luma_for_quality(50);
        assert_eq!(q50.values, ANNEX_K_LUMA);
        let q100 = QuantizationTable::luma_for_quality(100);
        assert!(q100.values.iter().all(|v| *v == 1));
        let q10 = QuantizationTable::luma_for_quality(10);
        assert!(q10.values[63] > q50.values[63]);
    }

    #[test]
    fn ls_defaults_match_t87() {
        let t = Thresholds::for_precision(8, 0);
        assert_eq!((t.max_val, t.t1, t.t2, t.t3, t.reset), (255, 3, 7, 21, 64));
        let t12 = Thresholds::for_precision(12, 0);
        assert_eq!(t12.max_val, 4095);
        assert!(t12.t1 >= 2 && t12.t2 >= t12.t1 && t12.t3 >= t12.t2);
    }

    #[test]
    fn conditioning_bounds() {
        assert!(ACConditioning::dc(2, 1).is_err());
        assert!(ACConditioning::ac(0).is_err());
        assert_eq!(ACConditioning::default().kx, 5);
    }
}
