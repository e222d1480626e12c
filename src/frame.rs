//! The frame and scan data model.
//!
//! A frame is created when a start-of-frame segment is parsed (or
//! configured for encoding) and owns its components. Scans reference
//! components by index; the entropy tables they use are borrowed from
//! the codec-wide [`crate::tables::Tables`] for the duration of the
//! scan.

use crate::components::Component;
use crate::errors::{JpgError, JpgResult};
use crate::misc::SOFMarkers;

/// A single frame of the codestream.
#[derive(Clone)]
pub struct Frame {
    /// The coding process of this frame.
    pub sof:        SOFMarkers,
    /// Sample precision in bits.
    pub precision:  u8,
    /// Frame width in pixels; never zero.
    pub width:      usize,
    /// Frame height in pixels; zero until a DNL segment resolves it.
    pub height:     usize,
    pub components: Vec<Component>,
    /// Maximum horizontal sampling factor across components.
    pub h_max:      usize,
    /// Maximum vertical sampling factor across components.
    pub v_max:      usize,
}

impl Frame {
    pub fn new(
        sof: SOFMarkers, precision: u8, width: usize, height: usize,
        mut components: Vec<Component>,
    ) -> JpgResult<Frame> {
        if components.is_empty() || components.len() > 4 {
            return Err(JpgError::malformed(
                "Frame::new",
                format!("a frame needs 1..=4 components, got {}", components.len()),
            ));
        }
        if width == 0 {
            return Err(JpgError::malformed("Frame::new", "image width is zero"));
        }

        let valid_precision = if sof.is_lossless() {
            // predictive and JPEG-LS processes go up to 16 bits
            (2..=16).contains(&precision)
        } else {
            precision == 8 || precision == 12
        };
        if !valid_precision {
            return Err(JpgError::malformed(
                "Frame::new",
                format!("precision {precision} is not allowed for {sof:?}"),
            ));
        }

        let h_max = components.iter().map(|c| c.horizontal_sample).max().unwrap();
        let v_max = components.iter().map(|c| c.vertical_sample).max().unwrap();
        for c in &mut components {
            if h_max % c.horizontal_sample != 0 || v_max % c.vertical_sample != 0 {
                return Err(JpgError::malformed(
                    "Frame::new",
                    format!(
                        "sampling {}x{} of component {} does not divide the maximum {}x{}",
                        c.horizontal_sample, c.vertical_sample, c.index, h_max, v_max
                    ),
                ));
            }
            c.sub_x = h_max / c.horizontal_sample;
            c.sub_y = v_max / c.vertical_sample;
        }

        Ok(Frame {
            sof,
            precision,
            width,
            height,
            components,
            h_max,
            v_max,
        })
    }

    /// MCU columns across the image for an interleaved scan.
    pub fn mcus_per_line(&self) -> usize {
        (self.width + self.h_max * 8 - 1) / (self.h_max * 8)
    }

    /// MCU rows down the image for an interleaved scan.
    pub fn mcus_per_column(&self) -> usize {
        (self.height + self.v_max * 8 - 1) / (self.v_max * 8)
    }

    /// The mid-grey value predictive scans start from:
    /// `2^(precision - point_transform - 1)`.
    pub fn neutral_value(&self, point_transform: u8) -> i32 {
        1 << (self.precision - point_transform - 1)
    }

    pub fn component_by_label(&self, label: u8) -> Option<usize> {
        self.components.iter().position(|c| c.label == label)
    }

    /// Update the height from a DNL segment.
    pub fn resolve_height(&mut self, height: usize, method: &'static str) -> JpgResult<()> {
        if self.height != 0 {
            return Err(JpgError::malformed(
                method,
                "DNL found although the frame height was already known",
            ));
        }
        if height == 0 {
            return Err(JpgError::malformed(method, "DNL declares zero lines"));
        }
        self.height = height;
        Ok(())
    }
}

/// One scan of a frame.
#[derive(Clone)]
pub struct Scan {
    /// Indices into `Frame::components`, in scan order.
    pub components:      Vec<usize>,
    /// DC (or JPEG-LS mapping) table selector per scan component.
    pub dc_table:        [usize; 4],
    /// AC table selector per scan component.
    pub ac_table:        [usize; 4],
    /// Spectral selection start; predictor selection for lossless,
    /// the near value for JPEG-LS.
    pub spectral_start:  u8,
    /// Spectral selection end; interleave shape for JPEG-LS.
    pub spectral_end:    u8,
    /// Successive approximation high nibble.
    pub approx_high:     u8,
    /// Successive approximation low nibble; the point transform for
    /// lossless scans.
    pub approx_low:      u8,
}

impl Scan {
    /// Validate the scan header against its frame. The checks follow
    /// B.2.3: component count, duplicate references and the scan
    /// parameter ranges of the coding process in use.
    pub fn validate(&self, frame: &Frame) -> JpgResult<()> {
        if self.components.is_empty() || self.components.len() > 4 {
            return Err(JpgError::malformed(
                "Scan::validate",
                format!("a scan needs 1..=4 components, got {}", self.components.len()),
            ));
        }

        // interleave load limit of B.2.3: at most ten data units per MCU
        if self.components.len() > 1 {
            let units: usize = self
                .components
                .iter()
                .map(|i| {
                    let c = &frame.components[*i];
                    c.horizontal_sample * c.vertical_sample
                })
                .sum();
            if units > 10 {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    format!("interleaved scan carries {units} data units per MCU, maximum is 10"),
                ));
            }
        }

        let sof = frame.sof;
        if sof == SOFMarkers::JpegLs {
            if self.spectral_end > 2 {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    format!("JPEG-LS interleave mode {} is undefined", self.spectral_end),
                ));
            }
        } else if sof.is_lossless() {
            if self.spectral_start > 7 || self.spectral_end != 0 {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    format!(
                        "lossless scan has predictor {} / Se {}",
                        self.spectral_start, self.spectral_end
                    ),
                ));
            }
            if self.approx_low >= frame.precision {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    "point transform must be smaller than the sample precision",
                ));
            }
        } else if sof.is_progressive() {
            if self.spectral_start > 63 || self.spectral_end > 63
                || self.spectral_start > self.spectral_end
            {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    format!(
                        "spectral selection {}..{} is out of range",
                        self.spectral_start, self.spectral_end
                    ),
                ));
            }
            if self.spectral_start == 0 && self.spectral_end != 0 {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    "progressive DC and AC coefficients cannot share a scan",
                ));
            }
            if self.spectral_start != 0 && self.components.len() != 1 {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    "progressive AC scans must be non-interleaved",
                ));
            }
        } else {
            // sequential
            if (self.spectral_start, self.spectral_end) != (0, 63)
                || (self.approx_high, self.approx_low) != (0, 0)
            {
                return Err(JpgError::malformed(
                    "Scan::validate",
                    "sequential scans must cover 0..63 with no approximation",
                ));
            }
        }
        Ok(())
    }

    /// The predictor selection of a lossless scan.
    pub fn predictor(&self) -> u8 {
        self.spectral_start
    }

    /// The point transform of a lossless scan.
    pub fn point_transform(&self) -> u8 {
        self.approx_low
    }

    /// The near parameter of a JPEG-LS scan.
    pub fn near(&self) -> u16 {
        u16::from(self.spectral_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(sof: SOFMarkers) -> Frame {
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        Frame::new(sof, 8, 16, 16, vec![c]).unwrap()
    }

    #[test]
    fn sequential_scan_shape() {
        let frame = gray_frame(SOFMarkers::BaselineDct);
        let scan = Scan {
            components:     vec![0],
            dc_table:       [0; 4],
            ac_table:       [0; 4],
            spectral_start: 0,
            spectral_end:   63,
            approx_high:    0,
            approx_low:     0,
        };
        assert!(scan.validate(&frame).is_ok());

        let bad = Scan {
            spectral_end: 62,
            ..scan
        };
        assert!(bad.validate(&frame).is_err());
    }

    #[test]
    fn lossless_scan_shape() {
        let frame = gray_frame(SOFMarkers::LosslessHuffman);
        let scan = Scan {
            components:     vec![0],
            dc_table:       [0; 4],
            ac_table:       [0; 4],
            spectral_start: 1,
            spectral_end:   0,
            approx_high:    0,
            approx_low:     0,
        };
        assert!(scan.validate(&frame).is_ok());
        assert_eq!(scan.predictor(), 1);

        let bad = Scan {
            spectral_start: 8,
            ..scan
        };
        assert!(bad.validate(&frame).is_err());
    }

    #[test]
    fn neutral_tracks_point_transform() {
        let frame = gray_frame(SOFMarkers::LosslessHuffman);
        assert_eq!(frame.neutral_value(0), 128);
        assert_eq!(frame.neutral_value(2), 32);
    }

    #[test]
    fn mcu_unit_limit() {
        let a = Component::from([1, 0x44, 0], 0).unwrap();
        let b = Component::from([2, 0x11, 1], 1).unwrap();
        let frame = Frame::new(SOFMarkers::BaselineDct, 8, 32, 32, vec![a, b]).unwrap();
        let scan = Scan {
            components:     vec![0, 1],
            dc_table:       [0; 4],
            ac_table:       [0; 4],
            spectral_start: 0,
            spectral_end:   63,
            approx_high:    0,
            approx_low:     0,
        };
        // 16 + 1 units exceeds the limit of ten
        assert!(scan.validate(&frame).is_err());
    }
}
