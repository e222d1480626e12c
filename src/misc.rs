#![allow(dead_code)]

//! Small shared items: scan order tables, colorspaces and the
//! start-of-frame classification used across the crate.

use std::fmt;

/// Start of baseline DCT Huffman coding
pub const START_OF_FRAME_BASE: u16 = 0xffc0;
/// Start of extended sequential DCT Huffman coding
pub const START_OF_FRAME_EXT_SEQ: u16 = 0xffc1;
/// Start of progressive DCT Huffman coding
pub const START_OF_FRAME_PROG_DCT: u16 = 0xffc2;
/// Start of lossless sequential Huffman coding
pub const START_OF_FRAME_LOS_SEQ: u16 = 0xffc3;
/// Start of differential sequential DCT Huffman coding
pub const START_OF_FRAME_DIFF_SEQ: u16 = 0xffc5;
/// Start of differential progressive DCT Huffman coding
pub const START_OF_FRAME_DIFF_PROG: u16 = 0xffc6;
/// Start of differential lossless Huffman coding
pub const START_OF_FRAME_DIFF_LOS: u16 = 0xffc7;
/// Start of extended sequential DCT arithmetic coding
pub const START_OF_FRAME_EXT_AR: u16 = 0xffc9;
/// Start of progressive DCT arithmetic coding
pub const START_OF_FRAME_PROG_DCT_AR: u16 = 0xffca;
/// Start of lossless sequential arithmetic coding
pub const START_OF_FRAME_LOS_SEQ_AR: u16 = 0xffcb;
/// Start of differential sequential DCT arithmetic coding
pub const START_OF_FRAME_DIFF_SEQ_AR: u16 = 0xffcd;
/// Start of differential progressive DCT arithmetic coding
pub const START_OF_FRAME_DIFF_PROG_AR: u16 = 0xffce;
/// Start of differential lossless arithmetic coding
pub const START_OF_FRAME_DIFF_LOS_AR: u16 = 0xffcf;
/// Start of JPEG-LS (ITU-T T.87) coding
pub const START_OF_FRAME_JPEG_LS: u16 = 0xfff7;

/// Undo run length encoding of coefficients by placing them in natural order
#[rustfmt::skip]
pub const UN_ZIGZAG: [usize; 64] = [
    0,  1,  8,  16, 9,  2,  3, 10,
    17, 24, 32, 25, 18, 11, 4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13, 6,  7,  14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// The inverse permutation: maps a raster position to its place in the
/// zigzag sequence. `ZIGZAG[UN_ZIGZAG[i]] == i`.
#[rustfmt::skip]
pub const ZIGZAG: [usize; 64] = [
    0,  1,  5,  6,  14, 15, 27, 28,
    2,  4,  7,  13, 16, 26, 29, 42,
    3,  8,  12, 17, 25, 30, 41, 43,
    9,  11, 18, 24, 31, 40, 44, 53,
    10, 19, 23, 32, 39, 45, 52, 54,
    20, 22, 33, 38, 46, 51, 55, 60,
    21, 34, 37, 47, 50, 56, 59, 61,
    35, 36, 48, 49, 57, 58, 62, 63,
];

/// The size of one coefficient block.
pub const DCT_BLOCK: usize = 64;

/// Maximum components in a frame we track tables for.
pub const MAX_COMPONENTS: usize = 4;

/// Color spaces the codec converts between.
///
/// The coded domain of a color image is YCbCr (or grayscale); the user
/// facing side may be any of these.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ColorSpace {
    /// Red, Green, Blue
    RGB,
    /// Monochrome
    GRAYSCALE,
    /// YCbCr, (also known as YUV)
    YCbCr,
    /// Cyan/Magenta/Yellow/Key, stored inverted as Adobe does
    CMYK,
    /// YCbCr plus an inverted key channel
    YCCK,
    /// R,G,B,A colorspace; the fourth channel is set to 255 to
    /// represent an opaque alpha channel
    RGBA,
}

impl ColorSpace {
    /// Number of channels (including unused alpha) in this color space
    pub const fn num_components(self) -> usize {
        match self {
            Self::RGB | Self::YCbCr => 3,
            Self::CMYK | Self::RGBA | Self::YCCK => 4,
            Self::GRAYSCALE => 1,
        }
    }
}

impl Default for ColorSpace {
    fn default() -> Self {
        ColorSpace::RGB
    }
}

/// Identifies the coding process selected by a start-of-frame marker.
#[derive(Eq, PartialEq, Copy, Clone)]
#[allow(clippy::upper_case_acronyms)]
pub enum SOFMarkers {
    /// Baseline DCT
    BaselineDct,
    /// SOF1, extended sequential DCT, Huffman coding
    ExtendedSequentialHuffman,
    /// SOF2, progressive DCT, Huffman coding
    ProgressiveDctHuffman,
    /// SOF3, lossless (sequential), Huffman coding
    LosslessHuffman,
    /// SOF5, differential sequential DCT, Huffman coding
    DifferentialSequentialHuffman,
    /// SOF6, differential progressive DCT, Huffman coding
    DifferentialProgressiveHuffman,
    /// SOF7, differential lossless, Huffman coding
    DifferentialLosslessHuffman,
    /// SOF9, extended sequential DCT, arithmetic coding
    ExtendedSequentialDctArithmetic,
    /// SOF10, progressive DCT, arithmetic coding
    ProgressiveDctArithmetic,
    /// SOF11, lossless (sequential), arithmetic coding
    LosslessArithmetic,
    /// SOF13, differential sequential DCT, arithmetic coding
    DifferentialSequentialArithmetic,
    /// SOF14, differential progressive DCT, arithmetic coding
    DifferentialProgressiveArithmetic,
    /// SOF15, differential lossless, arithmetic coding
    DifferentialLosslessArithmetic,
    /// SOF55, JPEG-LS sequential
    JpegLs,
}

impl Default for SOFMarkers {
    fn default() -> Self {
        Self::BaselineDct
    }
}

impl SOFMarkers {
    /// Check if a certain marker is sequential DCT or not
    pub fn is_sequential_dct(self) -> bool {
        matches!(
            self,
            Self::BaselineDct
                | Self::ExtendedSequentialHuffman
                | Self::ExtendedSequentialDctArithmetic
                | Self::DifferentialSequentialHuffman
                | Self::DifferentialSequentialArithmetic
        )
    }

    /// Check if a marker is a lossless predictive type or not
    pub fn is_lossless(self) -> bool {
        matches!(
            self,
            Self::LosslessHuffman
                | Self::LosslessArithmetic
                | Self::DifferentialLosslessHuffman
                | Self::DifferentialLosslessArithmetic
                | Self::JpegLs
        )
    }

    /// Check whether a marker is a progressive marker or not
    pub fn is_progressive(self) -> bool {
        matches!(
            self,
            Self::ProgressiveDctHuffman
                | Self::ProgressiveDctArithmetic
                | Self::DifferentialProgressiveHuffman
                | Self::DifferentialProgressiveArithmetic
        )
    }

    /// Check whether the scan data is arithmetic coded
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::ExtendedSequentialDctArithmetic
                | Self::ProgressiveDctArithmetic
                | Self::LosslessArithmetic
                | Self::DifferentialSequentialArithmetic
                | Self::DifferentialProgressiveArithmetic
                | Self::DifferentialLosslessArithmetic
        )
    }

    /// Check whether this frame codes a differential against a
    /// lower-resolution reference.
    pub fn is_differential(self) -> bool {
        matches!(
            self,
            Self::DifferentialSequentialHuffman
                | Self::DifferentialProgressiveHuffman
                | Self::DifferentialLosslessHuffman
                | Self::DifferentialSequentialArithmetic
                | Self::DifferentialProgressiveArithmetic
                | Self::DifferentialLosslessArithmetic
        )
    }

    pub fn from_int(int: u16) -> Option<SOFMarkers> {
        match int {
            START_OF_FRAME_BASE => Some(Self::BaselineDct),
            START_OF_FRAME_EXT_SEQ => Some(Self::ExtendedSequentialHuffman),
            START_OF_FRAME_PROG_DCT => Some(Self::ProgressiveDctHuffman),
            START_OF_FRAME_LOS_SEQ => Some(Self::LosslessHuffman),
            START_OF_FRAME_DIFF_SEQ => Some(Self::DifferentialSequentialHuffman),
            START_OF_FRAME_DIFF_PROG => Some(Self::DifferentialProgressiveHuffman),
            START_OF_FRAME_DIFF_LOS => Some(Self::DifferentialLosslessHuffman),
            START_OF_FRAME_EXT_AR => Some(Self::ExtendedSequentialDctArithmetic),
            START_OF_FRAME_PROG_DCT_AR => Some(Self::ProgressiveDctArithmetic),
            START_OF_FRAME_LOS_SEQ_AR => Some(Self::LosslessArithmetic),
            START_OF_FRAME_DIFF_SEQ_AR => Some(Self::DifferentialSequentialArithmetic),
            START_OF_FRAME_DIFF_PROG_AR => Some(Self::DifferentialProgressiveArithmetic),
            START_OF_FRAME_DIFF_LOS_AR => Some(Self::DifferentialLosslessArithmetic),
            START_OF_FRAME_JPEG_LS => Some(Self::JpegLs),
            _ => None,
        }
    }

    /// The wire value of the marker.
    pub fn to_int(self) -> u16 {
        match self {
            Self::BaselineDct => START_OF_FRAME_BASE,
            Self::ExtendedSequentialHuffman => START_OF_FRAME_EXT_SEQ,
            Self::ProgressiveDctHuffman => START_OF_FRAME_PROG_DCT,
            Self::LosslessHuffman => START_OF_FRAME_LOS_SEQ,
            Self::DifferentialSequentialHuffman => START_OF_FRAME_DIFF_SEQ,
            Self::DifferentialProgressiveHuffman => START_OF_FRAME_DIFF_PROG,
            Self::DifferentialLosslessHuffman => START_OF_FRAME_DIFF_LOS,
            Self::ExtendedSequentialDctArithmetic => START_OF_FRAME_EXT_AR,
            Self::ProgressiveDctArithmetic => START_OF_FRAME_PROG_DCT_AR,
            Self::LosslessArithmetic => START_OF_FRAME_LOS_SEQ_AR,
            Self::DifferentialSequentialArithmetic => START_OF_FRAME_DIFF_SEQ_AR,
            Self::DifferentialProgressiveArithmetic => START_OF_FRAME_DIFF_PROG_AR,
            Self::DifferentialLosslessArithmetic => START_OF_FRAME_DIFF_LOS_AR,
            Self::JpegLs => START_OF_FRAME_JPEG_LS,
        }
    }
}

impl fmt::Debug for SOFMarkers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::BaselineDct => write!(f, "Baseline DCT"),
            Self::ExtendedSequentialHuffman => {
                write!(f, "Extended sequential DCT, Huffman coding")
            }
            Self::ProgressiveDctHuffman => write!(f, "Progressive DCT, Huffman coding"),
            Self::LosslessHuffman => write!(f, "Lossless (sequential), Huffman coding"),
            Self::DifferentialSequentialHuffman => {
                write!(f, "Differential sequential DCT, Huffman coding")
            }
            Self::DifferentialProgressiveHuffman => {
                write!(f, "Differential progressive DCT, Huffman coding")
            }
            Self::DifferentialLosslessHuffman => {
                write!(f, "Differential lossless, Huffman coding")
            }
            Self::ExtendedSequentialDctArithmetic => {
                write!(f, "Extended sequential DCT, arithmetic coding")
            }
            Self::ProgressiveDctArithmetic => write!(f, "Progressive DCT, arithmetic coding"),
            Self::LosslessArithmetic => write!(f, "Lossless (sequential), arithmetic coding"),
            Self::DifferentialSequentialArithmetic => {
                write!(f, "Differential sequential DCT, arithmetic coding")
            }
            Self::DifferentialProgressiveArithmetic => {
                write!(f, "Differential progressive DCT, arithmetic coding")
            }
            Self::DifferentialLosslessArithmetic => {
                write!(f, "Differential lossless, arithmetic coding")
            }
            Self::JpegLs => write!(f, "JPEG-LS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_tables_are_inverse() {
        for i in 0..64 {
            assert_eq!(ZIGZAG[UN_ZIGZAG[i]], i);
        }
    }

    #[test]
    fn sof_classification() {
        assert!(SOFMarkers::LosslessArithmetic.is_lossless());
        assert!(SOFMarkers::LosslessArithmetic.is_arithmetic());
        assert!(!SOFMarkers::LosslessArithmetic.is_differential());
        assert!(SOFMarkers::DifferentialLosslessHuffman.is_differential());
        assert_eq!(
            SOFMarkers::from_int(0xfff7).unwrap().to_int(),
            START_OF_FRAME_JPEG_LS
        );
    }
}
