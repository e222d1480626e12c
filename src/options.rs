//! Per-instance configuration for both coding directions.
//!
//! Options are plain data threaded through the constructors; nothing
//! global. Builders consume and return `self` so a configuration can
//! be written in one expression.

use crate::misc::{ColorSpace, SOFMarkers};

/// Configuration of a [`crate::Decoder`].
#[derive(Copy, Clone, Debug)]
pub struct DecoderOptions {
    /// Treat recoverable stream damage (bad restart markers, truncated
    /// entropy data) as a hard error instead of a warning.
    pub(crate) strict:         bool,
    /// Dimension guard; frames beyond this are rejected.
    pub(crate) max_width:      usize,
    pub(crate) max_height:     usize,
    /// The colorspace handed to the caller.
    pub(crate) out_colorspace: ColorSpace,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            strict:         false,
            max_width:      1 << 16,
            max_height:     1 << 16,
            out_colorspace: ColorSpace::RGB,
        }
    }
}

impl DecoderOptions {
    pub fn new() -> DecoderOptions {
        DecoderOptions::default()
    }

    pub fn set_strict_mode(mut self, strict: bool) -> DecoderOptions {
        self.strict = strict;
        self
    }

    pub fn set_max_dimensions(mut self, width: usize, height: usize) -> DecoderOptions {
        self.max_width = width;
        self.max_height = height;
        self
    }

    pub fn set_out_colorspace(mut self, colorspace: ColorSpace) -> DecoderOptions {
        self.out_colorspace = colorspace;
        self
    }

    pub fn out_colorspace(&self) -> ColorSpace {
        self.out_colorspace
    }

    pub fn strict(&self) -> bool {
        self.strict
    }
}

/// Configuration of an [`crate::Encoder`].
#[derive(Copy, Clone, Debug)]
pub struct EncoderOptions {
    /// The coding process to emit.
    pub(crate) sof:              SOFMarkers,
    /// DCT quality, 1..=100, pivoting at 50 on the Annex K tables.
    pub(crate) quality:          u8,
    /// Predictor selection for lossless scans (1..=7).
    pub(crate) predictor:        u8,
    /// Point transform / JPEG-LS point transform.
    pub(crate) point_transform:  u8,
    /// JPEG-LS error bound; zero is lossless.
    pub(crate) near:             u16,
    /// MCUs between restart markers, zero disables them.
    pub(crate) restart_interval: u16,
    /// Design optimal Huffman tables in a measurement pass instead of
    /// installing the Annex K defaults. Lossless scans always measure.
    pub(crate) optimize_huffman: bool,
    /// Number of hierarchical levels; zero or one emits a flat frame.
    pub(crate) levels:           u8,
    /// Chroma subsampling factor for color DCT frames (1 = 4:4:4,
    /// 2 = 4:2:0).
    pub(crate) subsampling:      u8,
    /// Declare the height via a trailing DNL segment instead of the
    /// frame header.
    pub(crate) deferred_height:  bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        EncoderOptions {
            sof:              SOFMarkers::BaselineDct,
            quality:          75,
            predictor:        1,
            point_transform:  0,
            near:             0,
            restart_interval: 0,
            optimize_huffman: false,
            levels:           1,
            subsampling:      1,
            deferred_height:  false,
        }
    }
}

impl EncoderOptions {
    pub fn new() -> EncoderOptions {
        EncoderOptions::default()
    }

    pub fn set_scan_type(mut self, sof: SOFMarkers) -> EncoderOptions {
        self.sof = sof;
        self
    }

    pub fn set_quality(mut self, quality: u8) -> EncoderOptions {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn set_predictor(mut self, predictor: u8) -> EncoderOptions {
        self.predictor = predictor.clamp(1, 7);
        self
    }

    pub fn set_point_transform(mut self, point_transform: u8) -> EncoderOptions {
        self.point_transform = point_transform & 0x0f;
        self
    }

    pub fn set_near(mut self, near: u16) -> EncoderOptions {
        self.near = near;
        self
    }

    pub fn set_restart_interval(mut self, interval: u16) -> EncoderOptions {
        self.restart_interval = interval;
        self
    }

    pub fn set_optimize_huffman(mut self, optimize: bool) -> EncoderOptions {
        self.optimize_huffman = optimize;
        self
    }

    pub fn set_levels(mut self, levels: u8) -> EncoderOptions {
        self.levels = levels.max(1);
        self
    }

    pub fn set_subsampling(mut self, subsampling: u8) -> EncoderOptions {
        debug_assert!(subsampling == 1 || subsampling == 2);
        self.subsampling = subsampling.clamp(1, 2);
        self
    }

    pub fn set_deferred_height(mut self, deferred: bool) -> EncoderOptions {
        self.deferred_height = deferred;
        self
    }
}
