//! Per-component records extracted from a start-of-frame segment.

use crate::errors::{JpgError, JpgResult};

/// One image component of a frame.
#[derive(Clone)]
pub struct Component {
    /// The identifier byte from the frame header (`Ci`).
    pub label:             u8,
    /// Position of this component within the frame.
    pub index:             usize,
    /// Sampling factor in the x direction (`Hi`), 1..=4. This is the
    /// number of data units the component contributes to one MCU
    /// column, and equals `h_max / sub_x`.
    pub horizontal_sample: usize,
    /// Sampling factor in the y direction (`Vi`), 1..=4.
    pub vertical_sample:   usize,
    /// Subsampling divisor in x: `h_max / horizontal_sample`.
    pub sub_x:             usize,
    /// Subsampling divisor in y.
    pub sub_y:             usize,
    /// Quantization table slot from the frame header.
    pub quantization_table_number: u8,
    /// DC entropy table slot, set by the scan header.
    pub dc_huff_table:     usize,
    /// AC entropy table slot, set by the scan header.
    pub ac_huff_table:     usize,
}

impl Component {
    /// Build from the three bytes of a frame header entry.
    pub fn from(bytes: [u8; 3], index: usize) -> JpgResult<Component> {
        let horizontal_sample = usize::from(bytes[1] >> 4);
        let vertical_sample = usize::from(bytes[1] & 0x0f);
        let quantization_table_number = bytes[2];

        if !(1..=4).contains(&horizontal_sample) || !(1..=4).contains(&vertical_sample) {
            return Err(JpgError::malformed(
                "Component::from",
                format!(
                    "sampling factors must lie in 1..=4, got {horizontal_sample}x{vertical_sample}"
                ),
            ));
        }
        if quantization_table_number > 3 {
            return Err(JpgError::malformed(
                "Component::from",
                format!(
                    "quantization table {quantization_table_number} out of range, expected 0..=3"
                ),
            ));
        }

        trace!(
            "component {}: id {} sampling {}x{} quantization table {}",
            index,
            bytes[0],
            horizontal_sample,
            vertical_sample,
            quantization_table_number
        );

        Ok(Component {
            label: bytes[0],
            index,
            horizontal_sample,
            vertical_sample,
            // derived once all components are known
            sub_x: 1,
            sub_y: 1,
            quantization_table_number,
            dc_huff_table: 0,
            ac_huff_table: 0,
        })
    }

    /// Number of samples per line for a frame `width` pixels wide.
    pub fn width_for(&self, width: usize) -> usize {
        (width + self.sub_x - 1) / self.sub_x
    }

    /// Number of sample lines for a frame `height` pixels tall.
    pub fn height_for(&self, height: usize) -> usize {
        (height + self.sub_y - 1) / self.sub_y
    }

    /// Number of 8x8 blocks per line, padded to whole MCUs when the
    /// scan is interleaved.
    pub fn blocks_per_line(&self, width: usize, interleaved: bool) -> usize {
        let blocks = (self.width_for(width) + 7) / 8;
        if interleaved {
            // round up to a whole MCU column
            let cells = self.horizontal_sample;
            (blocks + cells - 1) / cells * cells
        } else {
            blocks
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_sampling() {
        assert!(Component::from([1, 0x05, 0], 0).is_err());
        assert!(Component::from([1, 0x50, 0], 0).is_err());
        assert!(Component::from([1, 0x11, 4], 0).is_err());
        assert!(Component::from([1, 0x22, 1], 0).is_ok());
    }

    #[test]
    fn derived_dimensions() {
        let mut c = Component::from([2, 0x11, 1], 1).unwrap();
        c.sub_x = 2;
        c.sub_y = 2;
        assert_eq!(c.width_for(17), 9);
        assert_eq!(c.height_for(16), 8);
    }
}
