#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

//! Arithmetic coded DCT scans: sequential (SOF9), progressive (SOF10)
//! and the differential variant (SOF13), all through the QM coder
//! with the conditioning contexts of T.81 Annex F.
//!
//! Statistics areas follow the layout of Table F.4: per DC table a
//! 64-bin area (four bins per conditioning class, the X ladder at 20,
//! its M partners 14 above), per AC table a 256-bin area (three bins
//! per coefficient index, magnitude ladders at 189 and 217 split by
//! the Kx discriminator). Signs of AC coefficients and all refinement
//! bits ride on the non-adapting uniform state.

use crate::blockbuffer::BlockBuffer;
use crate::bytestream::{ByteReader, ByteWriter};
use crate::errors::JpgResult;
use crate::frame::{Frame, Scan};
use crate::misc::UN_ZIGZAG;
use crate::qmcoder::{QmCoder, QmContext};
use crate::scans::{scan_components, RestartMachine, RestartOutcome, ScanComponent};
use crate::tables::Tables;

const DC_STAT_BINS: usize = 64;
const AC_STAT_BINS: usize = 256;
/// First bin of the DC magnitude-category ladder (X1).
const DC_X1: usize = 20;
/// Magnitude ladders of the AC area, low and high band.
const AC_X2_LOW: usize = 189;
const AC_X2_HIGH: usize = 217;

pub struct ArithDctScan {
    scan:         Scan,
    components:   Vec<ScanComponent>,
    mcus_x:       usize,
    mcus_y:       usize,
    restart:      RestartMachine,
    progressive:  bool,
    differential: bool,
    /// DC statistics per table slot.
    dc_stats:     [Vec<QmContext>; 4],
    /// AC statistics per table slot.
    ac_stats:     [Vec<QmContext>; 4],
    /// Uniform bin for signs and refinement bits.
    fixed_bin:    QmContext,
    /// Conditioning classification per scan slot, 0/4/8/12/16.
    dc_context:   [usize; 4],
    last_dc:      [i32; 4],
}

impl ArithDctScan {
    pub fn new(
        frame: &Frame, scan: &Scan, restart_interval: u16, progressive: bool,
        differential: bool,
    ) -> ArithDctScan {
        let components = scan_components(frame, scan);
        let interleaved = scan.components.len() > 1;
        let (mcus_x, mcus_y) = if interleaved {
            (frame.mcus_per_line(), frame.mcus_per_column())
        } else {
            let c = &components[0];
            ((c.width + 7) / 8, (c.height + 7) / 8)
        };
        ArithDctScan {
            scan: scan.clone(),
            components,
            mcus_x,
            mcus_y,
            restart: RestartMachine::new(restart_interval),
            progressive,
            differential,
            dc_stats: Default::default(),
            ac_stats: Default::default(),
            fixed_bin: QmContext::uniform(),
            dc_context: [0; 4],
            last_dc: [0; 4],
        }
    }

    fn is_dc(&self) -> bool {
        !self.progressive || self.scan.spectral_start == 0
    }

    fn is_refinement(&self) -> bool {
        self.scan.approx_high > 0
    }

    /// Reset every adaptive bin; runs at scan start and behind each
    /// restart marker.
    fn reset_statistics(&mut self) {
        for area in self.dc_stats.iter_mut() {
            *area = vec![QmContext::new(); DC_STAT_BINS];
        }
        for area in self.ac_stats.iter_mut() {
            *area = vec![QmContext::new(); AC_STAT_BINS];
        }
        self.fixed_bin = QmContext::uniform();
        self.dc_context = [0; 4];
        self.last_dc = [0; 4];
    }

    fn row_heights(&self) -> Vec<usize> {
        self.components.iter().map(|c| c.mcu_h).collect()
    }

    pub fn parse_scan(
        &mut self, reader: &mut ByteReader, _frame: &mut Frame, tables: &Tables,
        blocks: &mut BlockBuffer,
    ) -> JpgResult<()> {
        let rows = self.row_heights();
        let mut coder = QmCoder::new();
        let mut starved = false;

        blocks.reset_to_start_of_scan(&self.scan);
        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.reset_statistics();
        coder.open_for_read(reader);

        for _ in 0..self.mcus_y {
            if !blocks.start_mcu_row(&self.scan, &rows) {
                break;
            }
            for mcu_x in 0..self.mcus_x {
                if self.restart.due() {
                    match self.restart.parse_marker(reader)? {
                        RestartOutcome::Restarted => {
                            self.reset_statistics();
                            coder.open_for_read(reader);
                            starved = false;
                        }
                        RestartOutcome::LinesDefined(_) | RestartOutcome::EndOfScan => {
                            starved = true;
                        }
                    }
                }

                let components = self.components.clone();
                for (slot, c) in components.iter().enumerate() {
                    let c = *c;
                    let base_row = blocks.current_row(c.index);
                    for v in 0..c.mcu_h {
                        for h in 0..c.mcu_w {
                            let row = base_row + v;
                            let column = mcu_x * c.mcu_w + h;
                            let dc_cond = tables.dc_conditioning_or_default(c.dc_table);
                            let ac_cond = tables.ac_conditioning_or_default(c.ac_table);
                            let comp = blocks.component_mut(c.index);
                            let block = comp.block_mut(row, column);
                            if starved {
                                if !self.progressive {
                                    block.fill(0);
                                }
                                continue;
                            }
                            self.parse_block(
                                reader,
                                &mut coder,
                                block,
                                slot,
                                c.dc_table & 3,
                                c.ac_table & 3,
                                (dc_cond.lower, dc_cond.upper),
                                ac_cond.kx,
                            );
                        }
                    }
                }
                self.restart.advance();
            }
            blocks.advance_mcu_row(&self.scan, &rows);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_block(
        &mut self, reader: &mut ByteReader, coder: &mut QmCoder, block: &mut [i32],
        slot: usize, dc_tbl: usize, ac_tbl: usize, dc_lu: (u8, u8), kx: u8,
    ) {
        if self.progressive {
            match (self.is_dc(), self.is_refinement()) {
                (true, false) => self.parse_dc(reader, coder, block, slot, dc_tbl, dc_lu),
                (true, true) => {
                    if coder.get(reader, &mut self.fixed_bin) {
                        block[0] |= 1 << self.scan.approx_low;
                    }
                }
                (false, false) => self.parse_ac_first(reader, coder, block, ac_tbl, kx),
                (false, true) => self.parse_ac_refine(reader, coder, block, ac_tbl),
            }
        } else {
            block.fill(0);
            self.parse_dc(reader, coder, block, slot, dc_tbl, dc_lu);
            self.parse_ac_first(reader, coder, block, ac_tbl, kx);
        }
    }

    /// F.1.4.4.1: decode a DC difference.
    fn parse_dc(
        &mut self, reader: &mut ByteReader, coder: &mut QmCoder, block: &mut [i32],
        slot: usize, tbl: usize, (lower, upper): (u8, u8),
    ) {
        let al = if self.progressive {
            self.scan.approx_low
        } else {
            0
        };
        let base = self.dc_context[slot];
        let stats = &mut self.dc_stats[tbl];

        if !coder.get(reader, &mut stats[base]) {
            self.dc_context[slot] = 0;
        } else {
            let sign = coder.get(reader, &mut stats[base + 1]);
            let mut st = base + 2 + usize::from(sign);
            let mut m = i32::from(coder.get(reader, &mut stats[st]));
            if m != 0 {
                st = DC_X1;
                while coder.get(reader, &mut stats[st]) {
                    m <<= 1;
                    if m == 0x8000 {
                        break; // damaged stream
                    }
                    st += 1;
                }
            }

            // establish the conditioning category for the next block
            self.dc_context[slot] = if m < (1 << lower) >> 1 {
                0
            } else if m > (1 << upper) >> 1 {
                12 + usize::from(sign) * 4
            } else {
                4 + usize::from(sign) * 4
            };

            let mut v = m;
            st += 14;
            while {
                m >>= 1;
                m != 0
            } {
                if coder.get(reader, &mut stats[st]) {
                    v |= m;
                }
            }
            v += 1;
            if sign {
                v = -v;
            }
            if self.differential {
                self.last_dc[slot] = v;
            } else {
                self.last_dc[slot] += v;
            }
        }
        block[0] = self.last_dc[slot] << al;
    }

    /// F.1.4.4.2 / G.2: decode the AC band of a first pass.
    fn parse_ac_first(
        &mut self, reader: &mut ByteReader, coder: &mut QmCoder, block: &mut [i32],
        tbl: usize, kx: u8,
    ) {
        let (ss, se, al) = if self.progressive {
            (
                usize::from(self.scan.spectral_start),
                usize::from(self.scan.spectral_end),
                self.scan.approx_low,
            )
        } else {
            (1, 63, 0)
        };
        let stats = &mut self.ac_stats[tbl];

        let mut k = ss;
        while k <= se {
            let mut st = 3 * (k - 1);
            if coder.get(reader, &mut stats[st]) {
                break; // EOB
            }
            while !coder.get(reader, &mut stats[st + 1]) {
                st += 3;
                k += 1;
                if k > se {
                    return; // damaged stream
                }
            }
            let sign = coder.get(reader, &mut self.fixed_bin);
            st += 2;

            let mut m = i32::from(coder.get(reader, &mut stats[st]));
            if m != 0 && coder.get(reader, &mut stats[st]) {
                m <<= 1;
                st = if k <= usize::from(kx) {
                    AC_X2_LOW
                } else {
                    AC_X2_HIGH
                };
                while coder.get(reader, &mut stats[st]) {
                    m <<= 1;
                    if m == 0x8000 {
                        break; // damaged stream
                    }
                    st += 1;
                }
            }

            let mut v = m;
            st += 14;
            while {
                m >>= 1;
                m != 0
            } {
                if coder.get(reader, &mut stats[st]) {
                    v |= m;
                }
            }
            v += 1;
            if sign {
                v = -v;
            }
            block[UN_ZIGZAG[k]] = v << al;
            k += 1;
        }
    }

    /// G.2.3: decode a successive approximation refinement band.
    fn parse_ac_refine(
        &mut self, reader: &mut ByteReader, coder: &mut QmCoder, block: &mut [i32],
        tbl: usize,
    ) {
        let ss = usize::from(self.scan.spectral_start);
        let se = usize::from(self.scan.spectral_end);
        let p1 = 1i32 << self.scan.approx_low;
        let m1 = -1i32 << self.scan.approx_low;
        let stats = &mut self.ac_stats[tbl];

        // end of block of the previous stage
        let mut kex = se;
        while kex > 0 {
            if block[UN_ZIGZAG[kex]] != 0 {
                break;
            }
            kex -= 1;
        }

        let mut k = ss;
        while k <= se {
            let mut st = 3 * (k - 1);
            if k > kex && coder.get(reader, &mut stats[st]) {
                break; // EOB
            }
            loop {
                let coef = &mut block[UN_ZIGZAG[k]];
                if *coef != 0 {
                    if coder.get(reader, &mut stats[st + 2]) {
                        *coef += if *coef < 0 { m1 } else { p1 };
                    }
                    break;
                }
                if coder.get(reader, &mut stats[st + 1]) {
                    *coef = if coder.get(reader, &mut self.fixed_bin) {
                        m1
                    } else {
                        p1
                    };
                    break;
                }
                st += 3;
                k += 1;
                if k > se {
                    return; // damaged stream
                }
            }
            k += 1;
        }
    }

    pub fn write_scan(
        &mut self, writer: &mut ByteWriter, tables: &Tables, blocks: &BlockBuffer,
    ) -> JpgResult<()> {
        let mut cursor: Vec<usize> = vec![0; self.components.len()];
        let mut coder = QmCoder::new();

        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.reset_statistics();
        coder.open_for_write();

        for _ in 0..self.mcus_y {
            for mcu_x in 0..self.mcus_x {
                if self.restart.due() {
                    coder.flush(writer);
                    self.restart.put_marker(writer);
                    self.reset_statistics();
                    coder.open_for_write();
                }

                let components = self.components.clone();
                for (slot, c) in components.iter().enumerate() {
                    let c = *c;
                    let dc_cond = tables.dc_conditioning_or_default(c.dc_table);
                    let ac_cond = tables.ac_conditioning_or_default(c.ac_table);
                    for v in 0..c.mcu_h {
                        for h in 0..c.mcu_w {
                            let row = cursor[slot] + v;
                            let column = mcu_x * c.mcu_w + h;
                            let block = blocks.component(c.index).block(row, column);
                            self.write_block(
                                writer,
                                &mut coder,
                                block,
                                slot,
                                c.dc_table & 3,
                                c.ac_table & 3,
                                (dc_cond.lower, dc_cond.upper),
                                ac_cond.kx,
                            );
                        }
                    }
                }
                self.restart.advance();
            }
            for (slot, c) in self.components.iter().enumerate() {
                cursor[slot] += c.mcu_h;
            }
        }

        coder.flush(writer);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_block(
        &mut self, writer: &mut ByteWriter, coder: &mut QmCoder, block: &[i32], slot: usize,
        dc_tbl: usize, ac_tbl: usize, dc_lu: (u8, u8), kx: u8,
    ) {
        if self.progressive {
            match (self.is_dc(), self.is_refinement()) {
                (true, false) => self.write_dc(writer, coder, block, slot, dc_tbl, dc_lu),
                (true, true) => {
                    let bit = (block[0] >> self.scan.approx_low) & 1;
                    coder.put(writer, &mut self.fixed_bin, bit != 0);
                }
                (false, false) => self.write_ac_first(writer, coder, block, ac_tbl, kx),
                (false, true) => self.write_ac_refine(writer, coder, block, ac_tbl),
            }
        } else {
            self.write_dc(writer, coder, block, slot, dc_tbl, dc_lu);
            self.write_ac_first(writer, coder, block, ac_tbl, kx);
        }
    }

    /// F.1.4.1: encode a DC difference.
    fn write_dc(
        &mut self, writer: &mut ByteWriter, coder: &mut QmCoder, block: &[i32], slot: usize,
        tbl: usize, (lower, upper): (u8, u8),
    ) {
        let al = if self.progressive {
            self.scan.approx_low
        } else {
            0
        };
        let value = block[0] >> al;
        let mut v = if self.differential {
            value
        } else {
            value - self.last_dc[slot]
        };
        self.last_dc[slot] = value;

        let base = self.dc_context[slot];
        let stats = &mut self.dc_stats[tbl];

        if v == 0 {
            coder.put(writer, &mut stats[base], false);
            self.dc_context[slot] = 0;
            return;
        }

        coder.put(writer, &mut stats[base], true);
        let sign = v < 0;
        let mut st;
        if sign {
            v = -v;
            coder.put(writer, &mut stats[base + 1], true);
            st = base + 3;
        } else {
            coder.put(writer, &mut stats[base + 1], false);
            st = base + 2;
        }

        let mut m = 0i32;
        v -= 1;
        if v != 0 {
            coder.put(writer, &mut stats[st], true);
            m = 1;
            let mut v2 = v;
            st = DC_X1;
            while {
                v2 >>= 1;
                v2 != 0
            } {
                coder.put(writer, &mut stats[st], true);
                m <<= 1;
                st += 1;
            }
        }
        coder.put(writer, &mut stats[st], false);

        self.dc_context[slot] = if m < (1 << lower) >> 1 {
            0
        } else if m > (1 << upper) >> 1 {
            12 + usize::from(sign) * 4
        } else {
            4 + usize::from(sign) * 4
        };

        st += 14;
        while {
            m >>= 1;
            m != 0
        } {
            coder.put(writer, &mut stats[st], m & v != 0);
        }
    }

    /// F.1.4.2 / G.1.3.2: encode the AC band of a first pass.
    fn write_ac_first(
        &mut self, writer: &mut ByteWriter, coder: &mut QmCoder, block: &[i32], tbl: usize,
        kx: u8,
    ) {
        let (ss, se, al) = if self.progressive {
            (
                usize::from(self.scan.spectral_start),
                usize::from(self.scan.spectral_end),
                self.scan.approx_low,
            )
        } else {
            (1, 63, 0)
        };
        let stats = &mut self.ac_stats[tbl];

        let shifted = |raw: i32| {
            let magnitude = raw.abs() >> al;
            if raw < 0 {
                -magnitude
            } else {
                magnitude
            }
        };

        // establish the end-of-block index
        let mut ke = se;
        while ke >= ss {
            if shifted(block[UN_ZIGZAG[ke]]) != 0 {
                break;
            }
            if ke == ss {
                ke = ss.wrapping_sub(1);
                break;
            }
            ke -= 1;
        }

        let mut k = ss;
        while k <= se && k <= ke && ke != ss.wrapping_sub(1) {
            let mut st = 3 * (k - 1);
            coder.put(writer, &mut stats[st], false); // not EOB yet
            let mut v;
            loop {
                v = shifted(block[UN_ZIGZAG[k]]);
                if v != 0 {
                    break;
                }
                coder.put(writer, &mut stats[st + 1], false);
                st += 3;
                k += 1;
            }
            coder.put(writer, &mut stats[st + 1], true);

            let sign = v < 0;
            coder.put(writer, &mut self.fixed_bin, sign);
            if sign {
                v = -v;
            }
            st += 2;

            let mut m = 0i32;
            v -= 1;
            if v != 0 {
                coder.put(writer, &mut stats[st], true);
                m = 1;
                let mut v2 = v;
                v2 >>= 1;
                if v2 != 0 {
                    coder.put(writer, &mut stats[st], true);
                    m <<= 1;
                    st = if k <= usize::from(kx) {
                        AC_X2_LOW
                    } else {
                        AC_X2_HIGH
                    };
                    while {
                        v2 >>= 1;
                        v2 != 0
                    } {
                        coder.put(writer, &mut stats[st], true);
                        m <<= 1;
                        st += 1;
                    }
                }
            }
            coder.put(writer, &mut stats[st], false);

            st += 14;
            while {
                m >>= 1;
                m != 0
            } {
                coder.put(writer, &mut stats[st], m & v != 0);
            }
            k += 1;
        }

        if k <= se {
            let st = 3 * (k - 1);
            coder.put(writer, &mut stats[st], true); // EOB
        }
    }

    /// G.1.3.3: encode a successive approximation refinement band.
    fn write_ac_refine(
        &mut self, writer: &mut ByteWriter, coder: &mut QmCoder, block: &[i32], tbl: usize,
    ) {
        let ss = usize::from(self.scan.spectral_start);
        let se = usize::from(self.scan.spectral_end);
        let al = self.scan.approx_low;
        let stats = &mut self.ac_stats[tbl];

        // end of block of this stage
        let mut ke = se;
        while ke >= ss {
            if block[UN_ZIGZAG[ke]] != 0 {
                break;
            }
            if ke == ss {
                ke = ss.wrapping_sub(1);
                break;
            }
            ke -= 1;
        }

        // end of block of the previous stage
        let mut kex = if ke == ss.wrapping_sub(1) { ss.wrapping_sub(1) } else { ke };
        while kex != ss.wrapping_sub(1) && kex >= ss {
            let temp = block[UN_ZIGZAG[kex]].abs();
            if temp >> al != 0 {
                break;
            }
            if kex == ss {
                kex = ss.wrapping_sub(1);
                break;
            }
            kex -= 1;
        }

        let mut k = ss;
        while k <= se && ke != ss.wrapping_sub(1) && k <= ke {
            let mut st = 3 * (k - 1);
            if kex == ss.wrapping_sub(1) || k > kex {
                coder.put(writer, &mut stats[st], false); // not EOB yet
            }
            loop {
                let raw = block[UN_ZIGZAG[k]];
                let temp = raw.abs() >> al;
                if temp != 0 {
                    if temp >> 1 != 0 {
                        // previously nonzero, its correction bit
                        coder.put(writer, &mut stats[st + 2], temp & 1 != 0);
                    } else {
                        // newly nonzero
                        coder.put(writer, &mut stats[st + 1], true);
                        coder.put(writer, &mut self.fixed_bin, raw < 0);
                    }
                    break;
                }
                coder.put(writer, &mut stats[st + 1], false);
                st += 3;
                k += 1;
            }
            k += 1;
        }

        if k <= se {
            let st = 3 * (k - 1);
            coder.put(writer, &mut stats[st], true); // EOB
        }
    }
}
