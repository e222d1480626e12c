//! Coefficient storage for the DCT processes.
//!
//! Each component keeps rows of 8x8 blocks in zigzag-independent
//! raster layout; progressive scans revisit the same blocks several
//! times, so the buffer lives for the whole frame and scans only move
//! a cursor over it.

use crate::frame::{Frame, Scan};
use crate::misc::DCT_BLOCK;

/// The quantized blocks of one component.
pub struct ComponentBlocks {
    /// Blocks per row, padded to whole MCUs.
    pub blocks_per_line: usize,
    /// Block rows, padded to whole MCUs.
    pub rows:            usize,
    data:                Vec<i32>,
    /// Codestream cursor, in block rows.
    current_row:         usize,
}

impl ComponentBlocks {
    pub fn block(&self, row: usize, column: usize) -> &[i32] {
        let at = (row * self.blocks_per_line + column) * DCT_BLOCK;
        &self.data[at..at + DCT_BLOCK]
    }

    pub fn block_mut(&mut self, row: usize, column: usize) -> &mut [i32] {
        let at = (row * self.blocks_per_line + column) * DCT_BLOCK;
        &mut self.data[at..at + DCT_BLOCK]
    }
}

/// The block buffer of a frame.
pub struct BlockBuffer {
    components: Vec<ComponentBlocks>,
}

impl BlockBuffer {
    /// Allocate for a frame whose height is already known. DCT frames
    /// with deferred height grow by `ensure_rows` during the scan.
    pub fn new(frame: &Frame) -> BlockBuffer {
        let components = frame
            .components
            .iter()
            .map(|c| {
                // pad to whole MCUs so interleaved scans can write
                // their full cell pattern
                let blocks_per_line =
                    (c.width_for(frame.width) + 7) / 8;
                let blocks_per_line = pad_to(blocks_per_line, c.horizontal_sample);
                let rows = (c.height_for(frame.height) + 7) / 8;
                let rows = pad_to(rows, c.vertical_sample);
                ComponentBlocks {
                    blocks_per_line,
                    rows,
                    data: vec![0; blocks_per_line * rows * DCT_BLOCK],
                    current_row: 0,
                }
            })
            .collect();
        BlockBuffer { components }
    }

    pub fn component(&self, index: usize) -> &ComponentBlocks {
        &self.components[index]
    }

    pub fn component_mut(&mut self, index: usize) -> &mut ComponentBlocks {
        &mut self.components[index]
    }

    pub fn reset_to_start_of_scan(&mut self, scan: &Scan) {
        for index in &scan.components {
            self.components[*index].current_row = 0;
        }
    }

    /// Advance the cursor by one MCU row of blocks. Returns false when
    /// every scan component is done.
    pub fn start_mcu_row(&mut self, scan: &Scan, rows: &[usize]) -> bool {
        let mut more = false;
        for (slot, index) in scan.components.iter().enumerate() {
            let comp = &mut self.components[*index];
            let needed = comp.current_row + rows[slot];
            if comp.data.len() < needed * comp.blocks_per_line * DCT_BLOCK {
                comp.data
                    .resize(needed * comp.blocks_per_line * DCT_BLOCK, 0);
                comp.rows = needed;
            }
            if comp.current_row < comp.rows {
                more = true;
            }
        }
        more
    }

    pub fn advance_mcu_row(&mut self, scan: &Scan, rows: &[usize]) {
        for (slot, index) in scan.components.iter().enumerate() {
            self.components[*index].current_row += rows[slot];
        }
    }

    pub fn current_row(&self, index: usize) -> usize {
        self.components[index].current_row
    }

    /// Fully decoded sample lines available, the block analogue of
    /// [`crate::linebuffer::LineBuffer::buffered_lines`].
    pub fn buffered_lines(&self, scan: &Scan) -> usize {
        scan.components
            .iter()
            .map(|index| {
                let comp = &self.components[*index];
                comp.current_row.min(comp.rows) * 8
            })
            .min()
            .unwrap_or(0)
    }
}

fn pad_to(value: usize, unit: usize) -> usize {
    (value + unit - 1) / unit * unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::misc::SOFMarkers;

    #[test]
    fn mcu_padding() {
        let a = Component::from([1, 0x22, 0], 0).unwrap();
        let b = Component::from([2, 0x11, 1], 1).unwrap();
        let frame = Frame::new(SOFMarkers::BaselineDct, 8, 17, 17, vec![a, b]).unwrap();
        let buffer = BlockBuffer::new(&frame);

        // luma: ceil(17/8) = 3 blocks, padded to 4 for 2x2 MCUs
        assert_eq!(buffer.component(0).blocks_per_line, 4);
        assert_eq!(buffer.component(0).rows, 4);
        // chroma: ceil(9/8) = 2 blocks
        assert_eq!(buffer.component(1).blocks_per_line, 2);
    }

    #[test]
    fn cursor_walk() {
        let a = Component::from([1, 0x11, 0], 0).unwrap();
        let frame = Frame::new(SOFMarkers::BaselineDct, 8, 64, 32, vec![a]).unwrap();
        let mut buffer = BlockBuffer::new(&frame);
        let scan = Scan {
            components:     vec![0],
            dc_table:       [0; 4],
            ac_table:       [0; 4],
            spectral_start: 0,
            spectral_end:   63,
            approx_high:    0,
            approx_low:     0,
        };

        buffer.reset_to_start_of_scan(&scan);
        assert!(buffer.start_mcu_row(&scan, &[1]));
        buffer.component_mut(0).block_mut(0, 0)[0] = 42;
        buffer.advance_mcu_row(&scan, &[1]);
        assert_eq!(buffer.buffered_lines(&scan), 8);
        assert_eq!(buffer.component(0).block(0, 0)[0], 42);
    }
}
