#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

//! Sequential DCT scans with Huffman coding (SOF0/SOF1) and the
//! differential variant used by hierarchical frames (SOF5).
//!
//! Per 8x8 block the DC difference is coded as a magnitude category
//! through the DC table plus raw bits, and the 63 AC coefficients as
//! run/size pairs through the AC table in zigzag order, with EOB and
//! ZRL escapes.

use crate::bitstream::{BitReader, BitWriter, Stuffing};
use crate::blockbuffer::BlockBuffer;
use crate::bytestream::{ByteReader, ByteWriter};
use crate::errors::JpgResult;
use crate::frame::{Frame, Scan};
use crate::huffman::{HuffmanCoder, HuffmanDecoder, HuffmanStatistics};
use crate::markers::Marker;
use crate::misc::UN_ZIGZAG;
use crate::scans::{scan_components, RestartMachine, RestartOutcome, ScanComponent};
use crate::tables::Tables;

/// Sign-extend `r`, the `s` raw bits following a magnitude category.
#[inline]
pub(crate) fn huff_extend(r: i32, s: u8) -> i32 {
    if s == 0 {
        return 0;
    }
    if r < (1 << (s - 1)) {
        r + ((-1) << s) + 1
    } else {
        r
    }
}

/// Emit the category and raw bits of a DC difference or coefficient.
#[inline]
pub(crate) fn put_magnitude(
    stream: &mut BitWriter, writer: &mut ByteWriter, coder: &HuffmanCoder, run: u8, v: i32,
) -> JpgResult<()> {
    let s = if v == 0 {
        0
    } else {
        crate::scans::lossless::category_of(v)
    };
    coder.put(stream, writer, (run << 4) | s)?;
    if s > 0 {
        let bits = if v >= 0 { v } else { v - 1 };
        stream.put_bits(writer, s, bits);
    }
    Ok(())
}

pub struct SequentialScan {
    scan:         Scan,
    components:   Vec<ScanComponent>,
    interleaved:  bool,
    mcus_x:       usize,
    mcus_y:       usize,
    restart:      RestartMachine,
    /// DC predictor per scan component.
    dc_pred:      [i32; 4],
    /// Differential frames code raw DC values, no prediction.
    differential: bool,
}

impl SequentialScan {
    pub fn new(
        frame: &Frame, scan: &Scan, restart_interval: u16, differential: bool,
    ) -> SequentialScan {
        let components = scan_components(frame, scan);
        let interleaved = scan.components.len() > 1;
        let (mcus_x, mcus_y) = if interleaved {
            (frame.mcus_per_line(), frame.mcus_per_column())
        } else {
            let c = &components[0];
            ((c.width + 7) / 8, (c.height + 7) / 8)
        };
        SequentialScan {
            scan: scan.clone(),
            components,
            interleaved,
            mcus_x,
            mcus_y,
            restart: RestartMachine::new(restart_interval),
            dc_pred: [0; 4],
            differential,
        }
    }

    /// Block rows one MCU row covers, per scan component.
    fn row_heights(&self) -> Vec<usize> {
        self.components.iter().map(|c| c.mcu_h).collect()
    }

    pub fn parse_scan(
        &mut self, reader: &mut ByteReader, frame: &mut Frame, tables: &Tables,
        blocks: &mut BlockBuffer,
    ) -> JpgResult<()> {
        let mut dc = Vec::new();
        let mut ac = Vec::new();
        for c in &self.components {
            dc.push(HuffmanDecoder::new(
                tables.dc_template(c.dc_table, "SequentialScan::parse_scan")?,
            ));
            ac.push(HuffmanDecoder::new(
                tables.ac_template(c.ac_table, "SequentialScan::parse_scan")?,
            ));
        }

        let rows = self.row_heights();
        let mut stream = BitReader::new(Stuffing::Jpeg);
        let mut starved = false;

        blocks.reset_to_start_of_scan(&self.scan);
        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.dc_pred = [0; 4];

        let mut mcu_y = 0usize;
        'rows: loop {
            if !blocks.start_mcu_row(&self.scan, &rows) && frame.height != 0 {
                break;
            }
            if frame.height != 0 && mcu_y >= self.mcus_y {
                break;
            }
            for mcu_x in 0..self.mcus_x {
                if self.restart.due() {
                    stream.align_to_reader(reader);
                    match self.restart.parse_marker(reader)? {
                        RestartOutcome::Restarted => {
                            stream.reset();
                            self.dc_pred = [0; 4];
                            starved = false;
                        }
                        RestartOutcome::LinesDefined(height) => {
                            frame.resolve_height(height, "SequentialScan::parse_scan")?;
                            break 'rows;
                        }
                        RestartOutcome::EndOfScan => starved = true,
                    }
                }

                for (slot, c) in self.components.iter().enumerate() {
                    let base_row = blocks.current_row(c.index);
                    for v in 0..c.mcu_h {
                        for h in 0..c.mcu_w {
                            let row = base_row + v;
                            let column = mcu_x * c.mcu_w + h;
                            let comp = blocks.component_mut(c.index);
                            let block = comp.block_mut(row, column);
                            if starved || stream.saw_marker() {
                                block.fill(0);
                            } else {
                                Self::parse_block(
                                    reader,
                                    &mut stream,
                                    &dc[slot],
                                    &ac[slot],
                                    block,
                                    &mut self.dc_pred[slot],
                                    self.differential,
                                );
                            }
                        }
                    }
                }
                self.restart.advance();
            }
            blocks.advance_mcu_row(&self.scan, &rows);
            mcu_y += 1;

            if frame.height == 0 {
                match stream.marker {
                    Some(Marker::DNL) => {
                        stream.align_to_reader(reader);
                        if let RestartOutcome::LinesDefined(height) =
                            self.restart.parse_marker(reader)?
                        {
                            frame.resolve_height(height, "SequentialScan::parse_scan")?;
                        }
                        break;
                    }
                    Some(_) => {
                        warn!("scan with deferred height ended without a DNL segment");
                        frame.height = mcu_y * 8 * self.components[0].mcu_h;
                        break;
                    }
                    None if stream.at_eof() => {
                        warn!("input exhausted before the DNL segment");
                        frame.height = mcu_y * 8 * self.components[0].mcu_h;
                        break;
                    }
                    None => {}
                }
            }
        }

        stream.align_to_reader(reader);
        Ok(())
    }

    fn parse_block(
        reader: &mut ByteReader, stream: &mut BitReader, dc: &HuffmanDecoder,
        ac: &HuffmanDecoder, block: &mut [i32], dc_pred: &mut i32, differential: bool,
    ) {
        block.fill(0);

        // DC difference
        let s = dc.get(stream, reader);
        let diff = if s > 0 && s <= 15 {
            let r = stream.get_bits(reader, s);
            huff_extend(r, s)
        } else {
            0
        };
        if differential {
            block[0] = diff;
        } else {
            *dc_pred += diff;
            block[0] = *dc_pred;
        }

        // AC run/size pairs
        let mut k = 1usize;
        while k < 64 {
            let rs = ac.get(stream, reader);
            let r = usize::from(rs >> 4);
            let s = rs & 15;
            if s == 0 {
                if r == 15 {
                    k += 16; // ZRL
                    continue;
                }
                break; // EOB
            }
            k += r;
            if k > 63 {
                break; // damaged stream
            }
            let bits = stream.get_bits(reader, s);
            block[UN_ZIGZAG[k]] = huff_extend(bits, s);
            k += 1;
        }
    }

    /// Measurement pass for Huffman optimization: per scan slot,
    /// (DC statistics, AC statistics).
    pub fn measure_scan(
        &mut self, tables: &Tables, blocks: &BlockBuffer,
    ) -> Vec<(HuffmanStatistics, HuffmanStatistics)> {
        let mut statistics: Vec<(HuffmanStatistics, HuffmanStatistics)> = self
            .components
            .iter()
            .map(|_| (HuffmanStatistics::new(), HuffmanStatistics::new()))
            .collect();

        self.drive(tables, blocks, &mut |slot, block, dc_pred, differential, stats| {
            let (dc_stat, ac_stat) = &mut stats[slot];
            let diff = if differential {
                block[0]
            } else {
                let d = block[0] - *dc_pred;
                *dc_pred = block[0];
                d
            };
            dc_stat.put(dc_symbol(diff));

            let mut run = 0u8;
            for k in 1..64usize {
                let v = block[UN_ZIGZAG[k]];
                if v == 0 {
                    run += 1;
                } else {
                    while run >= 16 {
                        ac_stat.put(0xf0);
                        run -= 16;
                    }
                    ac_stat.put((run << 4) | crate::scans::lossless::category_of(v));
                    run = 0;
                }
            }
            if run > 0 {
                ac_stat.put(0x00);
            }
            Ok(())
        }, &mut statistics)
        .expect("statistics collection cannot fail");
        statistics
    }

    pub fn write_scan(
        &mut self, writer: &mut ByteWriter, tables: &Tables, blocks: &BlockBuffer,
    ) -> JpgResult<()> {
        let mut dc = Vec::new();
        let mut ac = Vec::new();
        for c in &self.components {
            dc.push(HuffmanCoder::new(
                tables.dc_template(c.dc_table, "SequentialScan::write_scan")?,
            ));
            ac.push(HuffmanCoder::new(
                tables.ac_template(c.ac_table, "SequentialScan::write_scan")?,
            ));
        }

        let rows = self.row_heights();
        let mut stream = BitWriter::new(Stuffing::Jpeg);
        let mut cursor: Vec<usize> = vec![0; self.components.len()];

        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.dc_pred = [0; 4];

        for _ in 0..self.mcus_y {
            for mcu_x in 0..self.mcus_x {
                if self.restart.due() {
                    stream.flush(writer);
                    self.restart.put_marker(writer);
                    self.dc_pred = [0; 4];
                }

                let components = self.components.clone();
                for (slot, c) in components.iter().enumerate() {
                    for v in 0..c.mcu_h {
                        for h in 0..c.mcu_w {
                            let row = cursor[slot] + v;
                            let column = mcu_x * c.mcu_w + h;
                            let block = blocks.component(c.index).block(row, column);
                            self.write_block(
                                writer,
                                &mut stream,
                                &dc[slot],
                                &ac[slot],
                                block,
                                slot,
                            )?;
                        }
                    }
                }
                self.restart.advance();
            }
            for (slot, c) in self.components.iter().enumerate() {
                cursor[slot] += c.mcu_h;
            }
        }

        stream.flush(writer);
        Ok(())
    }

    fn write_block(
        &mut self, writer: &mut ByteWriter, stream: &mut BitWriter, dc: &HuffmanCoder,
        ac: &HuffmanCoder, block: &[i32], slot: usize,
    ) -> JpgResult<()> {
        let diff = if self.differential {
            block[0]
        } else {
            let d = block[0] - self.dc_pred[slot];
            self.dc_pred[slot] = block[0];
            d
        };
        put_magnitude(stream, writer, dc, 0, diff)?;

        let mut run = 0u8;
        for k in 1..64usize {
            let v = block[UN_ZIGZAG[k]];
            if v == 0 {
                run += 1;
            } else {
                while run >= 16 {
                    ac.put(stream, writer, 0xf0)?; // ZRL
                    run -= 16;
                }
                put_magnitude(stream, writer, ac, run, v)?;
                run = 0;
            }
        }
        if run > 0 {
            ac.put(stream, writer, 0x00)?; // EOB
        }
        Ok(())
    }

    /// Walk every block in codestream order and feed it to `visit`,
    /// mirroring the write path including restart resets.
    fn drive(
        &mut self, tables: &Tables, blocks: &BlockBuffer,
        visit: &mut dyn FnMut(
            usize,
            &[i32],
            &mut i32,
            bool,
            &mut Vec<(HuffmanStatistics, HuffmanStatistics)>,
        ) -> JpgResult<()>,
        statistics: &mut Vec<(HuffmanStatistics, HuffmanStatistics)>,
    ) -> JpgResult<()> {
        let mut cursor: Vec<usize> = vec![0; self.components.len()];
        let mut dc_pred = [0i32; 4];
        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);

        for _ in 0..self.mcus_y {
            for mcu_x in 0..self.mcus_x {
                if self.restart.due() {
                    self.restart.togo = self.restart.interval;
                    dc_pred = [0; 4];
                }
                for (slot, c) in self.components.iter().enumerate() {
                    for v in 0..c.mcu_h {
                        for h in 0..c.mcu_w {
                            let row = cursor[slot] + v;
                            let column = mcu_x * c.mcu_w + h;
                            let block = blocks.component(c.index).block(row, column);
                            visit(
                                slot,
                                block,
                                &mut dc_pred[slot],
                                self.differential,
                                statistics,
                            )?;
                        }
                    }
                }
                self.restart.advance();
            }
            for (slot, c) in self.components.iter().enumerate() {
                cursor[slot] += c.mcu_h;
            }
        }
        Ok(())
    }
}

/// DC difference category, including the 16 bit escape.
fn dc_symbol(diff: i32) -> u8 {
    if diff == 0 {
        0
    } else {
        crate::scans::lossless::category_of(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::misc::SOFMarkers;

    fn gray(width: usize, height: usize) -> (Frame, Scan) {
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        let frame = Frame::new(SOFMarkers::BaselineDct, 8, width, height, vec![c]).unwrap();
        let scan = Scan {
            components:     vec![0],
            dc_table:       [0; 4],
            ac_table:       [0; 4],
            spectral_start: 0,
            spectral_end:   63,
            approx_high:    0,
            approx_low:     0,
        };
        (frame, scan)
    }

    fn fill_pattern(blocks: &mut BlockBuffer, seed: i32) {
        let comp = blocks.component_mut(0);
        let (rows, cols) = (comp.rows, comp.blocks_per_line);
        for r in 0..rows {
            for c in 0..cols {
                let block = comp.block_mut(r, c);
                block[0] = (seed + r as i32 * 17 + c as i32 * 5) % 512 - 256;
                for k in 1..64 {
                    // sparse AC pattern with long zero runs
                    block[k] = if (k + r + c) % 13 == 0 {
                        ((k as i32 * seed) % 64) - 32
                    } else {
                        0
                    };
                }
            }
        }
    }

    fn roundtrip(tables: &Tables, frame: &mut Frame, scan: &Scan) {
        let mut blocks = BlockBuffer::new(frame);
        fill_pattern(&mut blocks, 3);

        let mut driver = SequentialScan::new(frame, scan, tables.restart_interval, false);
        let mut writer = ByteWriter::new();
        driver.write_scan(&mut writer, tables, &blocks).unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = BlockBuffer::new(frame);
        let mut parser = SequentialScan::new(frame, scan, tables.restart_interval, false);
        parser
            .parse_scan(&mut reader, frame, tables, &mut decoded)
            .unwrap();

        let original = blocks.component(0);
        let parsed = decoded.component(0);
        for r in 0..original.rows {
            for c in 0..original.blocks_per_line {
                assert_eq!(original.block(r, c), parsed.block(r, c), "block {r},{c}");
            }
        }
    }

    fn default_tables() -> Tables {
        let mut tables = Tables::new();
        tables.dc_huffman[0] = Some(crate::huffman::default_luma_dc());
        tables.ac_huffman[0] = Some(crate::huffman::default_luma_ac());
        tables
    }

    #[test]
    fn coefficients_roundtrip() {
        let (mut frame, scan) = gray(64, 48);
        roundtrip(&default_tables(), &mut frame, &scan);
    }

    #[test]
    fn restart_interval_roundtrip() {
        let (mut frame, scan) = gray(64, 16);
        let mut tables = default_tables();
        tables.restart_interval = 4;
        roundtrip(&tables, &mut frame, &scan);
    }

    #[test]
    fn optimized_tables_roundtrip() {
        let (mut frame, scan) = gray(40, 24);
        let mut tables = Tables::new();
        let mut blocks = BlockBuffer::new(&frame);
        fill_pattern(&mut blocks, 7);

        let mut driver = SequentialScan::new(&frame, &scan, 0, false);
        let stats = driver.measure_scan(&tables, &blocks);
        tables.dc_huffman[0] = Some(stats[0].0.build_template().unwrap());
        tables.ac_huffman[0] = Some(stats[0].1.build_template().unwrap());

        let mut writer = ByteWriter::new();
        driver.write_scan(&mut writer, &tables, &blocks).unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = BlockBuffer::new(&frame);
        let mut parser = SequentialScan::new(&frame, &scan, 0, false);
        parser
            .parse_scan(&mut reader, &mut frame, &tables, &mut decoded)
            .unwrap();
        assert_eq!(
            blocks.component(0).block(1, 1),
            decoded.component(0).block(1, 1)
        );
    }

    #[test]
    fn empty_alphabet_block_is_all_zero() {
        // an AC table knowing only EOB decodes an all-zero block
        let (mut frame, scan) = gray(8, 8);
        let mut tables = Tables::new();
        tables.dc_huffman[0] = Some(crate::huffman::default_luma_dc());
        let mut stats = HuffmanStatistics::new();
        stats.put(0x00);
        tables.ac_huffman[0] = Some(stats.build_template().unwrap());

        let mut blocks = BlockBuffer::new(&frame);
        let mut driver = SequentialScan::new(&frame, &scan, 0, false);
        let mut writer = ByteWriter::new();
        driver.write_scan(&mut writer, &tables, &blocks).unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut parser = SequentialScan::new(&frame, &scan, 0, false);
        blocks.component_mut(0).block_mut(0, 0)[5] = 99; // must be overwritten
        parser
            .parse_scan(&mut reader, &mut frame, &tables, &mut blocks)
            .unwrap();
        assert!(blocks.component(0).block(0, 0).iter().all(|v| *v == 0));
    }
}
