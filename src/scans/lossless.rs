#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

//! The Huffman coded lossless predictive scan (SOF3) and its
//! differential variant (SOF7) used inside hierarchical frames.
//!
//! A "MCU" is a small group of samples here, not a DCT block: the
//! interleave cell of the scan, one sample per component for
//! non-interleaved scans. Differences between a sample and its
//! prediction are coded as a magnitude category through the DC table
//! followed by that many raw bits, all in 16 bit wrap-around
//! arithmetic.

use crate::bitstream::{BitReader, BitWriter, Stuffing};
use crate::bytestream::{ByteReader, ByteWriter};
use crate::errors::JpgResult;
use crate::frame::{Frame, Scan};
use crate::huffman::{HuffmanCoder, HuffmanDecoder, HuffmanStatistics};
use crate::linebuffer::LineBuffer;
use crate::markers::Marker;
use crate::predictor::{modulo_difference, reconstruct, PredictorChain};
use crate::scans::{
    mcus_per_line, scan_components, RestartMachine, RestartOutcome, ScanComponent,
};
use crate::tables::Tables;

/// The smallest magnitude category holding `v`; `v` must be neither
/// zero nor -32768, both of which have dedicated symbols.
#[inline]
pub(crate) fn category_of(v: i32) -> u8 {
    let mut symbol = 0u8;
    loop {
        symbol += 1;
        if v > -(1 << symbol) && v < (1 << symbol) {
            return symbol;
        }
    }
}

pub struct LosslessScan {
    scan:          Scan,
    components:    Vec<ScanComponent>,
    chain:         PredictorChain,
    preshift:      u8,
    restart:       RestartMachine,
    /// Treat the next lines as the first line of the image, which is
    /// how prediction resumes behind a restart marker.
    no_prediction: bool,
}

impl LosslessScan {
    pub fn new(
        frame: &Frame, scan: &Scan, restart_interval: u16, differential: bool,
    ) -> LosslessScan {
        let neutral = if differential {
            0
        } else {
            1 << (frame.precision - 1)
        };
        LosslessScan {
            scan:          scan.clone(),
            components:    scan_components(frame, scan),
            chain:         PredictorChain::new(scan.predictor(), differential, neutral),
            preshift:      scan.point_transform(),
            restart:       RestartMachine::new(restart_interval),
            no_prediction: false,
        }
    }

    /// Decode the whole scan into the line buffer.
    pub fn parse_scan(
        &mut self, reader: &mut ByteReader, frame: &mut Frame, tables: &Tables,
        lines: &mut LineBuffer,
    ) -> JpgResult<()> {
        let mut decoders = Vec::with_capacity(self.components.len());
        for c in &self.components {
            decoders.push(HuffmanDecoder::new(
                tables.dc_template(c.dc_table, "LosslessScan::parse_scan")?,
            ));
        }

        let mcus_x = mcus_per_line(&self.components);
        let rows: Vec<usize> = self.components.iter().map(|c| c.mcu_h).collect();
        let mut stream = BitReader::new(Stuffing::Jpeg);
        let mut starved = false;

        lines.reset_to_start_of_scan(&self.scan);
        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.no_prediction = false;

        'rows: loop {
            if !lines.start_mcu_row(&self.scan, &rows) {
                break;
            }
            for mcu_x in 0..mcus_x {
                if self.restart.due() {
                    stream.align_to_reader(reader);
                    match self.restart.parse_marker(reader)? {
                        RestartOutcome::Restarted => {
                            stream.reset();
                            self.no_prediction = true;
                            starved = false;
                            if mcu_x != 0 {
                                warn!("restart marker in the middle of a line");
                            }
                        }
                        RestartOutcome::LinesDefined(height) => {
                            frame.resolve_height(height, "LosslessScan::parse_scan")?;
                            lines.resolve_height(frame);
                            break 'rows;
                        }
                        RestartOutcome::EndOfScan => starved = true,
                    }
                }

                if starved || stream.saw_marker() {
                    self.clear_mcu(lines, mcu_x);
                } else {
                    self.parse_mcu(reader, &mut stream, &decoders, lines, mcu_x);
                }
                self.restart.advance();
            }
            self.no_prediction = false;
            lines.advance_mcu_row(&self.scan, &rows);

            if frame.height == 0 {
                match stream.marker {
                    Some(Marker::DNL) => {
                        stream.align_to_reader(reader);
                        if let RestartOutcome::LinesDefined(height) =
                            self.restart.parse_marker(reader)?
                        {
                            frame.resolve_height(height, "LosslessScan::parse_scan")?;
                            lines.resolve_height(frame);
                        }
                        break;
                    }
                    Some(_) => {
                        warn!("scan with deferred height ended without a DNL segment");
                        frame.height = lines.buffered_lines(&self.scan);
                        lines.resolve_height(frame);
                        break;
                    }
                    None if stream.at_eof() => {
                        warn!("input exhausted before the DNL segment");
                        frame.height = lines.buffered_lines(&self.scan);
                        lines.resolve_height(frame);
                        break;
                    }
                    None => {}
                }
            }
        }

        stream.align_to_reader(reader);
        Ok(())
    }

    fn parse_mcu(
        &mut self, reader: &mut ByteReader, stream: &mut BitReader,
        decoders: &[HuffmanDecoder], lines: &mut LineBuffer, mcu_x: usize,
    ) {
        for (slot, c) in self.components.iter().enumerate() {
            let dc = &decoders[slot];
            let comp_y = lines.current_y(c.index);

            for ym in 0..c.mcu_h {
                let y = comp_y + ym;
                let (prev, cur) = lines.component_mut(c.index).line_pair_mut(y);
                let y_for_mode = if self.no_prediction { ym } else { y };

                for xm in 0..c.mcu_w {
                    let x = mcu_x * c.mcu_w + xm;
                    let mode = self.chain.prediction_mode(x as u32, y_for_mode as u32);
                    let pred = self.chain.predict_sample(mode, self.preshift, cur, x, prev);

                    let symbol = dc.get(stream, reader);
                    let v = match symbol {
                        0 => 0,
                        16 => -32768,
                        s if s <= 15 => {
                            let threshold = 1i32 << (s - 1);
                            let diff = stream.get_bits(reader, s);
                            if diff < threshold {
                                diff + (-1i32 << s) + 1
                            } else {
                                diff
                            }
                        }
                        _ => 0, // damaged stream, recovered at the next restart
                    };

                    cur[x] = reconstruct(pred, v, self.preshift);
                }
            }
        }
    }

    /// Neutral-fill one MCU when its entropy data is missing.
    fn clear_mcu(&mut self, lines: &mut LineBuffer, mcu_x: usize) {
        for c in &self.components {
            let comp_y = lines.current_y(c.index);
            for ym in 0..c.mcu_h {
                let line = lines.component_mut(c.index).line_mut(comp_y + ym);
                for xm in 0..c.mcu_w {
                    line[mcu_x * c.mcu_w + xm] = self.chain.neutral();
                }
            }
        }
    }

    /// First encoder pass: collect the difference category statistics
    /// that the optimal table construction feeds on. The traversal and
    /// prediction state mirror `write_scan` exactly, restart resets
    /// included, so the designed table fits the later bit stream.
    pub fn measure_scan(
        &mut self, _frame: &Frame, tables: &Tables, lines: &LineBuffer,
    ) -> Vec<HuffmanStatistics> {
        let mut statistics = vec![HuffmanStatistics::new(); self.components.len()];
        let mcus_x = mcus_per_line(&self.components);
        let mcus_y = super::mcus_per_column(&self.components);
        let mut cursor: Vec<usize> = vec![0; self.components.len()];

        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.no_prediction = false;

        for _ in 0..mcus_y {
            for mcu_x in 0..mcus_x {
                if self.restart.due() {
                    self.restart.togo = self.restart.interval;
                    self.no_prediction = true;
                }
                for (slot, c) in self.components.iter().enumerate() {
                    for ym in 0..c.mcu_h {
                        let y = cursor[slot] + ym;
                        let comp = lines.component(c.index);
                        let cur = comp.line(y);
                        let prev = if y > 0 { comp.line(y - 1) } else { &[][..] };
                        let y_for_mode = if self.no_prediction { ym } else { y };

                        for xm in 0..c.mcu_w {
                            let x = mcu_x * c.mcu_w + xm;
                            let mode = self.chain.prediction_mode(x as u32, y_for_mode as u32);
                            let pred =
                                self.chain.predict_sample(mode, self.preshift, cur, x, prev);
                            let v = modulo_difference(cur[x] >> self.preshift, pred);
                            let symbol = if v == 0 {
                                0
                            } else if v == -32768 {
                                16
                            } else {
                                category_of(v)
                            };
                            statistics[slot].put(symbol);
                        }
                    }
                }
                self.restart.advance();
            }
            self.no_prediction = false;
            for (slot, c) in self.components.iter().enumerate() {
                cursor[slot] += c.mcu_h;
            }
        }
        statistics
    }

    /// Second encoder pass: emit the entropy coded data. The scan
    /// header and tables are already on the stream.
    pub fn write_scan(
        &mut self, writer: &mut ByteWriter, tables: &Tables, lines: &LineBuffer,
    ) -> JpgResult<()> {
        let mut coders = Vec::with_capacity(self.components.len());
        for c in &self.components {
            coders.push(HuffmanCoder::new(
                tables.dc_template(c.dc_table, "LosslessScan::write_scan")?,
            ));
        }

        let mcus_x = mcus_per_line(&self.components);
        let mut stream = BitWriter::new(Stuffing::Jpeg);
        let mut cursor: Vec<usize> = vec![0; self.components.len()];
        let mcus_y = super::mcus_per_column(&self.components);

        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.no_prediction = false;

        for _ in 0..mcus_y {
            for mcu_x in 0..mcus_x {
                if self.restart.due() {
                    stream.flush(writer);
                    self.restart.put_marker(writer);
                    self.no_prediction = true;
                    if mcu_x != 0 {
                        warn!("restart interval does not divide the line width");
                    }
                }

                self.write_mcu(writer, &mut stream, &coders, lines, &cursor, mcu_x)?;
                self.restart.advance();
            }
            self.no_prediction = false;
            for (slot, c) in self.components.iter().enumerate() {
                cursor[slot] += c.mcu_h;
            }
        }

        stream.flush(writer);
        Ok(())
    }

    fn write_mcu(
        &mut self, writer: &mut ByteWriter, stream: &mut BitWriter, coders: &[HuffmanCoder],
        lines: &LineBuffer, cursor: &[usize], mcu_x: usize,
    ) -> JpgResult<()> {
        for (slot, c) in self.components.iter().enumerate() {
            let dc = &coders[slot];
            for ym in 0..c.mcu_h {
                let y = cursor[slot] + ym;
                let comp = lines.component(c.index);
                let cur = comp.line(y);
                let prev = if y > 0 { comp.line(y - 1) } else { &[][..] };
                let y_for_mode = if self.no_prediction { ym } else { y };

                for xm in 0..c.mcu_w {
                    let x = mcu_x * c.mcu_w + xm;
                    let mode = self.chain.prediction_mode(x as u32, y_for_mode as u32);
                    let pred = self.chain.predict_sample(mode, self.preshift, cur, x, prev);
                    let v = modulo_difference(cur[x] >> self.preshift, pred);

                    if v == 0 {
                        dc.put(stream, writer, 0)?;
                    } else if v == -32768 {
                        // the one value whose category carries no bits
                        dc.put(stream, writer, 16)?;
                    } else {
                        let symbol = category_of(v);
                        dc.put(stream, writer, symbol)?;
                        let bits = if v >= 0 { v } else { v - 1 };
                        stream.put_bits(writer, symbol, bits);
                    }
                }
            }
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::misc::SOFMarkers;

    fn build(
        width: usize, height: usize, predictor: u8, point_transform: u8,
    ) -> (Frame, Scan, Tables) {
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        let frame =
            Frame::new(SOFMarkers::LosslessHuffman, 8, width, height, vec![c]).unwrap();
        let scan = Scan {
            components:     vec![0],
            dc_table:       [0; 4],
            ac_table:       [0; 4],
            spectral_start: predictor,
            spectral_end:   0,
            approx_high:    0,
            approx_low:     point_transform,
        };
        (frame, scan, Tables::new())
    }

    fn roundtrip(frame: &mut Frame, scan: &Scan, tables: &mut Tables, samples: &[i32]) -> Vec<i32> {
        let mut lines = LineBuffer::new(frame);
        {
            let comp = lines.component_mut(0);
            comp.ensure_rows(frame.height);
            for y in 0..frame.height {
                let line = comp.line_mut(y);
                line[..frame.width].copy_from_slice(&samples[y * frame.width..][..frame.width]);
            }
        }

        let mut scan_driver = LosslessScan::new(frame, scan, tables.restart_interval, false);
        let stats = scan_driver.measure_scan(frame, tables, &lines);
        tables.dc_huffman[0] = Some(stats[0].build_template().unwrap());

        let mut writer = ByteWriter::new();
        scan_driver.write_scan(&mut writer, tables, &lines).unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = LineBuffer::new(frame);
        let mut parse_driver = LosslessScan::new(frame, scan, tables.restart_interval, false);
        parse_driver
            .parse_scan(&mut reader, frame, tables, &mut decoded)
            .unwrap();

        let mut out = Vec::new();
        for y in 0..frame.height {
            out.extend_from_slice(&decoded.component(0).line(y)[..frame.width]);
        }
        out
    }

    #[test]
    fn ramp_roundtrips_with_left_predictor() {
        let (mut frame, scan, mut tables) = build(8, 8, 1, 0);
        let samples: Vec<i32> = (0..64).collect();
        let decoded = roundtrip(&mut frame, &scan, &mut tables, &samples);
        assert_eq!(decoded, samples);
    }

    #[test]
    fn all_predictors_roundtrip() {
        for predictor in 1..=7u8 {
            let (mut frame, scan, mut tables) = build(13, 9, predictor, 0);
            let samples: Vec<i32> =
                (0..13 * 9).map(|i| (i * 37 + i / 13 * 11) % 256).collect();
            let decoded = roundtrip(&mut frame, &scan, &mut tables, &samples);
            assert_eq!(decoded, samples, "predictor {predictor}");
        }
    }

    #[test]
    fn point_transform_drops_low_bits() {
        let (mut frame, scan, mut tables) = build(8, 4, 1, 2);
        let samples: Vec<i32> = (0..32).map(|i| i * 7 % 256).collect();
        let decoded = roundtrip(&mut frame, &scan, &mut tables, &samples);
        for (d, s) in decoded.iter().zip(samples.iter()) {
            assert_eq!(*d, (s >> 2) << 2);
        }
    }

    #[test]
    fn restart_markers_divide_the_scan() {
        let (mut frame, scan, mut tables) = build(16, 8, 4, 0);
        tables.restart_interval = 16; // one marker per line
        let samples: Vec<i32> = (0..16 * 8).map(|i| (i * 13) % 256).collect();
        let decoded = roundtrip(&mut frame, &scan, &mut tables, &samples);
        assert_eq!(decoded, samples);
    }
}
