#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

//! The arithmetic coded lossless predictive scan (SOF11) and its
//! differential variant (SOF15).
//!
//! Differences are decomposed into zero flag, sign, magnitude category
//! and magnitude bits, each coded by the QM coder in a context chosen
//! from the classified differences of the left neighbour (Da) and the
//! upper neighbour (Db). The DC conditioning thresholds (L, U) of the
//! DAC segment split the classification into zero, small and large
//! buckets of either sign.

use crate::bytestream::{ByteReader, ByteWriter};
use crate::errors::JpgResult;
use crate::frame::{Frame, Scan};
use crate::linebuffer::LineBuffer;
use crate::predictor::{modulo_difference, reconstruct, PredictorChain};
use crate::qmcoder::{QmCoder, QmContext};
use crate::scans::{
    mcus_per_line, scan_components, RestartMachine, RestartOutcome, ScanComponent,
};
use crate::tables::Tables;

/// The sign/zero coding contexts of one (Da, Db) classification cell.
#[derive(Clone, Copy, Default)]
struct ContextZeroSet {
    s0: QmContext,
    ss: QmContext,
    sp: QmContext,
    sn: QmContext,
}

/// Magnitude category and refinement contexts, one ladder of fifteen
/// each.
#[derive(Clone, Copy)]
struct MagnitudeSet {
    x: [QmContext; 15],
    m: [QmContext; 15],
}

impl Default for MagnitudeSet {
    fn default() -> Self {
        MagnitudeSet {
            x: [QmContext::new(); 15],
            m: [QmContext::new(); 15],
        }
    }
}

/// The full context set of one conditioning table.
#[derive(Clone, Copy, Default)]
struct QmContextSet {
    /// 5x5 cells over the classifications of Da and Db.
    sign_zero:      [[ContextZeroSet; 5]; 5],
    magnitude_low:  MagnitudeSet,
    magnitude_high: MagnitudeSet,
}

impl QmContextSet {
    fn init(&mut self) {
        *self = QmContextSet::default();
    }

    /// Classify one difference against the conditioning thresholds:
    /// 0 for the zero bucket, +-1 for small, +-2 for large.
    fn classify(diff: i32, lower: u8, upper: u8) -> i32 {
        let abs = diff.abs();
        if abs <= ((1 << lower) >> 1) {
            return 0;
        }
        if abs <= (1 << upper) {
            return if diff < 0 { -1 } else { 1 };
        }
        if diff < 0 {
            -2
        } else {
            2
        }
    }

    fn sign_zero_cell(
        &mut self, da: i32, db: i32, lower: u8, upper: u8,
    ) -> &mut ContextZeroSet {
        let row = (Self::classify(da, lower, upper) + 2) as usize;
        let column = (Self::classify(db, lower, upper) + 2) as usize;
        &mut self.sign_zero[row][column]
    }

    fn magnitude(&mut self, db: i32, upper: u8) -> &mut MagnitudeSet {
        if db > (1 << upper) || -db > (1 << upper) {
            &mut self.magnitude_high
        } else {
            &mut self.magnitude_low
        }
    }
}

pub struct AcLosslessScan {
    scan:          Scan,
    components:    Vec<ScanComponent>,
    chain:         PredictorChain,
    preshift:      u8,
    restart:       RestartMachine,
    no_prediction: bool,
    /// Conditioning thresholds per scan component.
    small:         [u8; 4],
    large:         [u8; 4],
    /// Context set selector per scan component (the DC table index).
    context_of:    [usize; 4],
    contexts:      [QmContextSet; 4],
    /// Da per component: the difference coded one MCU cell to the
    /// left, one entry per MCU line.
    da:            Vec<Vec<i32>>,
    /// Db per component: the difference coded one line above, one
    /// entry per column.
    db:            Vec<Vec<i32>>,
}

impl AcLosslessScan {
    pub fn new(
        frame: &Frame, scan: &Scan, restart_interval: u16, differential: bool,
    ) -> AcLosslessScan {
        let components = scan_components(frame, scan);
        let neutral = if differential {
            0
        } else {
            1 << (frame.precision - 1)
        };
        let da = components.iter().map(|c| vec![0; c.mcu_h]).collect();
        let db = components.iter().map(|c| vec![0; c.width + c.mcu_w]).collect();

        let mut context_of = [0usize; 4];
        for (slot, c) in components.iter().enumerate() {
            context_of[slot] = c.dc_table & 3;
        }

        AcLosslessScan {
            scan: scan.clone(),
            components,
            chain: PredictorChain::new(scan.predictor(), differential, neutral),
            preshift: scan.point_transform(),
            restart: RestartMachine::new(restart_interval),
            no_prediction: true,
            small: [0; 4],
            large: [1; 4],
            context_of,
            contexts: [QmContextSet::default(); 4],
            da,
            db,
        }
    }

    /// Install conditioning and reset all adaptive state; shared by
    /// both directions.
    fn start_scan(&mut self, tables: &Tables) {
        for (slot, c) in self.components.iter().enumerate() {
            let conditioning = tables.dc_conditioning_or_default(c.dc_table);
            self.small[slot] = conditioning.lower;
            self.large[slot] = conditioning.upper;
        }
        for set in self.contexts.iter_mut() {
            set.init();
        }
        for da in self.da.iter_mut() {
            da.iter_mut().for_each(|v| *v = 0);
        }
        for db in self.db.iter_mut() {
            db.iter_mut().for_each(|v| *v = 0);
        }
        self.no_prediction = true;
        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
    }

    /// Reset entropy state at a restart boundary.
    fn restart_state(&mut self) {
        for set in self.contexts.iter_mut() {
            set.init();
        }
        for da in self.da.iter_mut() {
            da.iter_mut().for_each(|v| *v = 0);
        }
        for db in self.db.iter_mut() {
            db.iter_mut().for_each(|v| *v = 0);
        }
        self.no_prediction = true;
    }

    pub fn parse_scan(
        &mut self, reader: &mut ByteReader, frame: &mut Frame, tables: &Tables,
        lines: &mut LineBuffer,
    ) -> JpgResult<()> {
        self.start_scan(tables);

        let mcus_x = mcus_per_line(&self.components);
        let rows: Vec<usize> = self.components.iter().map(|c| c.mcu_h).collect();
        let mut coder = QmCoder::new();
        let mut starved = false;

        lines.reset_to_start_of_scan(&self.scan);
        coder.open_for_read(reader);

        'rows: loop {
            if !lines.start_mcu_row(&self.scan, &rows) {
                break;
            }
            for mcu_x in 0..mcus_x {
                if self.restart.due() {
                    match self.restart.parse_marker(reader)? {
                        RestartOutcome::Restarted => {
                            self.restart_state();
                            coder.open_for_read(reader);
                            starved = false;
                            if mcu_x != 0 {
                                warn!("restart marker in the middle of a line");
                            }
                        }
                        RestartOutcome::LinesDefined(height) => {
                            frame.resolve_height(height, "AcLosslessScan::parse_scan")?;
                            lines.resolve_height(frame);
                            break 'rows;
                        }
                        RestartOutcome::EndOfScan => starved = true,
                    }
                }

                if starved {
                    self.clear_mcu(lines, mcu_x);
                } else {
                    self.parse_mcu(reader, &mut coder, lines, mcu_x);
                }
                self.restart.advance();
            }
            self.no_prediction = false;
            // Da resets at the left edge of every MCU row.
            for da in self.da.iter_mut() {
                da.iter_mut().for_each(|v| *v = 0);
            }
            lines.advance_mcu_row(&self.scan, &rows);

            if frame.height == 0 {
                // with no bit-level marker detection the QM coder
                // stalls at markers; probe the byte stream directly
                if let Some(word) = reader.peek_word() {
                    if word == 0xffdc {
                        reader.skip(2);
                        let height = crate::headers::parse_dnl(reader)?;
                        frame.resolve_height(height, "AcLosslessScan::parse_scan")?;
                        lines.resolve_height(frame);
                        break;
                    }
                } else {
                    warn!("input exhausted before the DNL segment");
                    frame.height = lines.buffered_lines(&self.scan);
                    lines.resolve_height(frame);
                    break;
                }
            }
        }
        Ok(())
    }

    fn parse_mcu(
        &mut self, reader: &mut ByteReader, coder: &mut QmCoder, lines: &mut LineBuffer,
        mcu_x: usize,
    ) {
        for slot in 0..self.components.len() {
            let c = self.components[slot];
            let comp_y = lines.current_y(c.index);
            let set = self.context_of[slot];

            for ym in 0..c.mcu_h {
                let y = comp_y + ym;
                let (prev, cur) = lines.component_mut(c.index).line_pair_mut(y);
                let y_for_mode = if self.no_prediction { ym } else { y };

                for xm in 0..c.mcu_w {
                    let x = mcu_x * c.mcu_w + xm;
                    let mode = self.chain.prediction_mode(x as u32, y_for_mode as u32);
                    let pred = self.chain.predict_sample(mode, self.preshift, cur, x, prev);

                    let da = self.da[slot][ym];
                    let db = self.db[slot][x];
                    let contexts = &mut self.contexts[set];

                    let v;
                    {
                        let cell =
                            contexts.sign_zero_cell(da, db, self.small[slot], self.large[slot]);
                        if coder.get(reader, &mut cell.s0) {
                            let negative = coder.get(reader, &mut cell.ss);
                            let mut sz = 0i32;
                            let first = if negative {
                                coder.get(reader, &mut cell.sn)
                            } else {
                                coder.get(reader, &mut cell.sp)
                            };
                            if first {
                                let mset = contexts.magnitude(db, self.large[slot]);
                                let mut i = 0usize;
                                let mut m = 2i32;
                                while coder.get(reader, &mut mset.x[i]) {
                                    m <<= 1;
                                    i += 1;
                                    if i >= 15 {
                                        break;
                                    }
                                }
                                m >>= 1;
                                sz = m;
                                while {
                                    m >>= 1;
                                    m != 0
                                } {
                                    if coder.get(reader, &mut mset.m[i]) {
                                        sz |= m;
                                    }
                                }
                            }
                            v = if negative { -sz - 1 } else { sz + 1 };
                        } else {
                            v = 0;
                        }
                    }

                    cur[x] = reconstruct(pred, v, self.preshift);
                    self.db[slot][x] = v;
                    self.da[slot][ym] = v;
                }
            }
        }
    }

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

    pub fn write_scan(
        &mut self, writer: &mut ByteWriter, tables: &Tables, lines: &LineBuffer,
    ) -> JpgResult<()> {
        self.start_scan(tables);

        let mcus_x = mcus_per_line(&self.components);
        let mcus_y = super::mcus_per_column(&self.components);
        let mut cursor: Vec<usize> = vec![0; self.components.len()];
        let mut coder = QmCoder::new();

        coder.open_for_write();

        for _ in 0..mcus_y {
            for mcu_x in 0..mcus_x {
                if self.restart.due() {
                    coder.flush(writer);
                    self.restart.put_marker(writer);
                    self.restart_state();
                    coder.open_for_write();
                    if mcu_x != 0 {
                        warn!("restart interval does not divide the line width");
                    }
                }
                self.write_mcu(writer, &mut coder, lines, &cursor, mcu_x);
                self.restart.advance();
            }
            self.no_prediction = false;
            for da in self.da.iter_mut() {
                da.iter_mut().for_each(|v| *v = 0);
            }
            for (slot, c) in self.components.iter().enumerate() {
                cursor[slot] += c.mcu_h;
            }
        }

        coder.flush(writer);
        Ok(())
    }

    fn write_mcu(
        &mut self, writer: &mut ByteWriter, coder: &mut QmCoder, lines: &LineBuffer,
        cursor: &[usize], mcu_x: usize,
    ) {
        for slot in 0..self.components.len() {
            let c = self.components[slot];
            let set = self.context_of[slot];

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

                    let da = self.da[slot][ym];
                    let db = self.db[slot][x];
                    let contexts = &mut self.contexts[set];
                    let cell =
                        contexts.sign_zero_cell(da, db, self.small[slot], self.large[slot]);

                    if v != 0 {
                        coder.put(writer, &mut cell.s0, true);
                        let (negative, sz) = if v < 0 {
                            coder.put(writer, &mut cell.ss, true);
                            (true, -(v + 1))
                        } else {
                            coder.put(writer, &mut cell.ss, false);
                            (false, v - 1)
                        };

                        if sz >= 1 {
                            if negative {
                                coder.put(writer, &mut cell.sn, true);
                            } else {
                                coder.put(writer, &mut cell.sp, true);
                            }
                            let mset = contexts.magnitude(db, self.large[slot]);
                            let mut i = 0usize;
                            let mut m = 2i32;
                            while sz >= m {
                                coder.put(writer, &mut mset.x[i], true);
                                m <<= 1;
                                i += 1;
                            }
                            coder.put(writer, &mut mset.x[i], false);
                            m >>= 1;
                            while {
                                m >>= 1;
                                m != 0
                            } {
                                coder.put(writer, &mut mset.m[i], m & sz != 0);
                            }
                        } else if negative {
                            coder.put(writer, &mut cell.sn, false);
                        } else {
                            coder.put(writer, &mut cell.sp, false);
                        }
                    } else {
                        coder.put(writer, &mut cell.s0, false);
                    }

                    self.db[slot][x] = v;
                    self.da[slot][ym] = v;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::misc::SOFMarkers;

    fn build(width: usize, height: usize, predictor: u8) -> (Frame, Scan, Tables) {
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        let frame =
            Frame::new(SOFMarkers::LosslessArithmetic, 8, width, height, vec![c]).unwrap();
        let scan = Scan {
            components:     vec![0],
            dc_table:       [0; 4],
            ac_table:       [0; 4],
            spectral_start: predictor,
            spectral_end:   0,
            approx_high:    0,
            approx_low:     0,
        };
        (frame, scan, Tables::new())
    }

    fn roundtrip(frame: &mut Frame, scan: &Scan, tables: &Tables, samples: &[i32]) -> Vec<i32> {
        let mut lines = LineBuffer::new(frame);
        {
            let comp = lines.component_mut(0);
            comp.ensure_rows(frame.height);
            for y in 0..frame.height {
                comp.line_mut(y)[..frame.width]
                    .copy_from_slice(&samples[y * frame.width..][..frame.width]);
            }
        }

        let mut writer = ByteWriter::new();
        let mut encoder = AcLosslessScan::new(frame, scan, tables.restart_interval, false);
        encoder.write_scan(&mut writer, tables, &lines).unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = LineBuffer::new(frame);
        let mut decoder = AcLosslessScan::new(frame, scan, tables.restart_interval, false);
        decoder
            .parse_scan(&mut reader, frame, tables, &mut decoded)
            .unwrap();

        let mut out = Vec::new();
        for y in 0..frame.height {
            out.extend_from_slice(&decoded.component(0).line(y)[..frame.width]);
        }
        out
    }

    #[test]
    fn flat_image_roundtrips() {
        let (mut frame, scan, tables) = build(16, 8, 1);
        let samples = vec![128i32; 16 * 8];
        assert_eq!(roundtrip(&mut frame, &scan, &tables, &samples), samples);
    }

    #[test]
    fn textured_image_roundtrips_all_predictors() {
        for predictor in 1..=7u8 {
            let (mut frame, scan, tables) = build(11, 7, predictor);
            let samples: Vec<i32> =
                (0..11 * 7).map(|i| (i * 53 + (i / 11) * 29) % 256).collect();
            assert_eq!(
                roundtrip(&mut frame, &scan, &tables, &samples),
                samples,
                "predictor {predictor}"
            );
        }
    }

    #[test]
    fn custom_conditioning_roundtrips() {
        let (mut frame, scan, mut tables) = build(16, 16, 4);
        tables.dc_conditioning[0] = Some(crate::tables::ACConditioning::dc(2, 6).unwrap());
        let samples: Vec<i32> = (0..256).map(|i| (i * i) % 256).collect();
        assert_eq!(roundtrip(&mut frame, &scan, &tables, &samples), samples);
    }

    #[test]
    fn restart_interval_roundtrips() {
        let (mut frame, scan, mut tables) = build(64, 16, 1);
        tables.restart_interval = 64;
        let samples: Vec<i32> = (0..64 * 16).map(|i| (i * 7) % 256).collect();
        assert_eq!(roundtrip(&mut frame, &scan, &tables, &samples), samples);
    }
}
