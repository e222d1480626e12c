#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

//! Progressive DCT scans with Huffman coding (SOF2/SOF6).
//!
//! Four scan shapes exist: DC first and DC refinement (interleaving
//! allowed), AC first and AC refinement (single component only). AC
//! scans share an end-of-band run counter across blocks; refinement
//! scans append correction bits for coefficients that went nonzero in
//! an earlier pass.

use crate::bitstream::{BitReader, BitWriter, Stuffing};
use crate::blockbuffer::BlockBuffer;
use crate::bytestream::{ByteReader, ByteWriter};
use crate::errors::JpgResult;
use crate::frame::{Frame, Scan};
use crate::huffman::{HuffmanCoder, HuffmanDecoder};
use crate::misc::UN_ZIGZAG;
use crate::scans::sequential::huff_extend;
use crate::scans::{scan_components, RestartMachine, RestartOutcome, ScanComponent};
use crate::tables::Tables;

pub struct ProgressiveScan {
    scan:        Scan,
    components:  Vec<ScanComponent>,
    mcus_x:      usize,
    mcus_y:      usize,
    restart:     RestartMachine,
    dc_pred:     [i32; 4],
    /// End-of-band run shared across blocks of an AC scan.
    eobrun:      u32,
    /// Correction bits waiting to ride behind the next EOB/ZRL symbol
    /// (AC refinement encoding).
    bit_buffer:  Vec<u8>,
    differential: bool,
}

impl ProgressiveScan {
    pub fn new(
        frame: &Frame, scan: &Scan, restart_interval: u16, differential: bool,
    ) -> ProgressiveScan {
        let components = scan_components(frame, scan);
        let interleaved = scan.components.len() > 1;
        let (mcus_x, mcus_y) = if interleaved {
            (frame.mcus_per_line(), frame.mcus_per_column())
        } else {
            let c = &components[0];
            ((c.width + 7) / 8, (c.height + 7) / 8)
        };
        ProgressiveScan {
            scan: scan.clone(),
            components,
            mcus_x,
            mcus_y,
            restart: RestartMachine::new(restart_interval),
            dc_pred: [0; 4],
            eobrun: 0,
            bit_buffer: Vec::new(),
            differential,
        }
    }

    fn is_dc(&self) -> bool {
        self.scan.spectral_start == 0
    }

    fn is_refinement(&self) -> bool {
        self.scan.approx_high > 0
    }

    fn row_heights(&self) -> Vec<usize> {
        self.components.iter().map(|c| c.mcu_h).collect()
    }

    pub fn parse_scan(
        &mut self, reader: &mut ByteReader, _frame: &mut Frame, tables: &Tables,
        blocks: &mut BlockBuffer,
    ) -> JpgResult<()> {
        let mut dc = Vec::new();
        let mut ac = Vec::new();
        for c in &self.components {
            if self.is_dc() {
                if !self.is_refinement() {
                    dc.push(Some(HuffmanDecoder::new(
                        tables.dc_template(c.dc_table, "ProgressiveScan::parse_scan")?,
                    )));
                } else {
                    dc.push(None); // refinement reads raw bits only
                }
                ac.push(None);
            } else {
                dc.push(None);
                ac.push(Some(HuffmanDecoder::new(
                    tables.ac_template(c.ac_table, "ProgressiveScan::parse_scan")?,
                )));
            }
        }

        let rows = self.row_heights();
        let mut stream = BitReader::new(Stuffing::Jpeg);
        let mut starved = false;

        blocks.reset_to_start_of_scan(&self.scan);
        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.dc_pred = [0; 4];
        self.eobrun = 0;

        for _ in 0..self.mcus_y {
            if !blocks.start_mcu_row(&self.scan, &rows) {
                break;
            }
            for mcu_x in 0..self.mcus_x {
                if self.restart.due() {
                    stream.align_to_reader(reader);
                    match self.restart.parse_marker(reader)? {
                        RestartOutcome::Restarted => {
                            stream.reset();
                            self.dc_pred = [0; 4];
                            self.eobrun = 0;
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
                            let comp = blocks.component_mut(c.index);
                            let block = comp.block_mut(row, column);
                            if starved {
                                continue;
                            }
                            if self.is_dc() {
                                self.parse_dc_block(
                                    reader,
                                    &mut stream,
                                    dc[slot].as_ref(),
                                    block,
                                    slot,
                                );
                            } else {
                                self.parse_ac_block(
                                    reader,
                                    &mut stream,
                                    ac[slot].as_ref().unwrap(),
                                    block,
                                );
                            }
                        }
                    }
                }
                self.restart.advance();
            }
            blocks.advance_mcu_row(&self.scan, &rows);
        }

        stream.align_to_reader(reader);
        Ok(())
    }

    fn parse_dc_block(
        &mut self, reader: &mut ByteReader, stream: &mut BitReader,
        dc: Option<&HuffmanDecoder>, block: &mut [i32], slot: usize,
    ) {
        let al = self.scan.approx_low;
        if self.is_refinement() {
            if stream.get_bit(reader) != 0 {
                block[0] |= 1 << al;
            }
            return;
        }

        let s = dc.unwrap().get(stream, reader);
        let diff = if s > 0 && s <= 15 {
            let r = stream.get_bits(reader, s);
            huff_extend(r, s)
        } else {
            0
        };
        if self.differential {
            block[0] = diff << al;
        } else {
            self.dc_pred[slot] += diff;
            block[0] = self.dc_pred[slot] << al;
        }
    }

    fn parse_ac_block(
        &mut self, reader: &mut ByteReader, stream: &mut BitReader, ac: &HuffmanDecoder,
        block: &mut [i32],
    ) {
        let ss = usize::from(self.scan.spectral_start);
        let se = usize::from(self.scan.spectral_end);
        let al = self.scan.approx_low;

        if !self.is_refinement() {
            // first pass over this band
            if self.eobrun > 0 {
                self.eobrun -= 1;
                return;
            }
            let mut k = ss;
            while k <= se {
                let rs = ac.get(stream, reader);
                let r = u32::from(rs >> 4);
                let s = rs & 15;
                if s == 0 {
                    if r != 15 {
                        self.eobrun = (1 << r) - 1;
                        if r > 0 {
                            self.eobrun += stream.get_bits(reader, r as u8) as u32;
                        }
                        break;
                    }
                    k += 16; // ZRL
                    continue;
                }
                k += r as usize;
                if k > se {
                    break;
                }
                let bits = stream.get_bits(reader, s);
                block[UN_ZIGZAG[k]] = huff_extend(bits, s) << al;
                k += 1;
            }
            return;
        }

        // refinement pass, following G.1.2.3
        let p1 = 1i32 << al;
        let m1 = -1i32 << al;
        let mut k = ss;

        if self.eobrun == 0 {
            while k <= se {
                let rs = ac.get(stream, reader);
                let mut r = i32::from(rs >> 4);
                let s = rs & 15;
                let mut value = 0i32;
                if s == 0 {
                    if r != 15 {
                        self.eobrun = (1 << r) - 1;
                        if r > 0 {
                            self.eobrun += stream.get_bits(reader, r as u8) as u32;
                        }
                        break;
                    }
                    // ZRL: skip sixteen zero-history coefficients
                } else {
                    value = if stream.get_bit(reader) != 0 { p1 } else { m1 };
                }

                while k <= se {
                    let coef = &mut block[UN_ZIGZAG[k]];
                    if *coef != 0 {
                        if stream.get_bit(reader) != 0 && (*coef & p1) == 0 {
                            *coef += if *coef >= 0 { p1 } else { m1 };
                        }
                    } else {
                        if r == 0 {
                            if value != 0 {
                                *coef = value;
                            }
                            k += 1;
                            break;
                        }
                        r -= 1;
                    }
                    k += 1;
                }
            }
        }

        if self.eobrun > 0 {
            // inside an EOB run only the history bits flow
            while k <= se {
                let coef = &mut block[UN_ZIGZAG[k]];
                if *coef != 0 && stream.get_bit(reader) != 0 && (*coef & p1) == 0 {
                    *coef += if *coef >= 0 { p1 } else { m1 };
                }
                k += 1;
            }
            self.eobrun -= 1;
        }
    }

    pub fn write_scan(
        &mut self, writer: &mut ByteWriter, tables: &Tables, blocks: &BlockBuffer,
    ) -> JpgResult<()> {
        let mut dc = Vec::new();
        let mut ac = Vec::new();
        for c in &self.components {
            if self.is_dc() && !self.is_refinement() {
                dc.push(Some(HuffmanCoder::new(
                    tables.dc_template(c.dc_table, "ProgressiveScan::write_scan")?,
                )));
            } else {
                dc.push(None);
            }
            if !self.is_dc() {
                ac.push(Some(HuffmanCoder::new(
                    tables.ac_template(c.ac_table, "ProgressiveScan::write_scan")?,
                )));
            } else {
                ac.push(None);
            }
        }

        let mut stream = BitWriter::new(Stuffing::Jpeg);
        let mut cursor: Vec<usize> = vec![0; self.components.len()];

        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);
        self.dc_pred = [0; 4];
        self.eobrun = 0;
        self.bit_buffer.clear();

        for _ in 0..self.mcus_y {
            for mcu_x in 0..self.mcus_x {
                if self.restart.due() {
                    if !self.is_dc() {
                        self.flush_eobrun(writer, &mut stream, ac[0].as_ref().unwrap())?;
                    }
                    stream.flush(writer);
                    self.restart.put_marker(writer);
                    self.dc_pred = [0; 4];
                }

                let components = self.components.clone();
                for (slot, c) in components.iter().enumerate() {
                    let c = *c;
                    for v in 0..c.mcu_h {
                        for h in 0..c.mcu_w {
                            let row = cursor[slot] + v;
                            let column = mcu_x * c.mcu_w + h;
                            let block = blocks.component(c.index).block(row, column);
                            if self.is_dc() {
                                self.write_dc_block(
                                    writer,
                                    &mut stream,
                                    dc[slot].as_ref(),
                                    block,
                                    slot,
                                )?;
                            } else {
                                self.write_ac_block(
                                    writer,
                                    &mut stream,
                                    ac[slot].as_ref().unwrap(),
                                    block,
                                )?;
                            }
                        }
                    }
                }
                self.restart.advance();
            }
            for (slot, c) in self.components.iter().enumerate() {
                cursor[slot] += c.mcu_h;
            }
        }

        if !self.is_dc() {
            self.flush_eobrun(writer, &mut stream, ac[0].as_ref().unwrap())?;
        }
        stream.flush(writer);
        Ok(())
    }

    fn write_dc_block(
        &mut self, writer: &mut ByteWriter, stream: &mut BitWriter,
        dc: Option<&HuffmanCoder>, block: &[i32], slot: usize,
    ) -> JpgResult<()> {
        let al = self.scan.approx_low;
        if self.is_refinement() {
            stream.put_bits(writer, 1, (block[0] >> al) & 1);
            return Ok(());
        }

        let value = block[0] >> al;
        let diff = if self.differential {
            value
        } else {
            let d = value - self.dc_pred[slot];
            self.dc_pred[slot] = value;
            d
        };
        super::sequential::put_magnitude(stream, writer, dc.unwrap(), 0, diff)
    }

    fn write_ac_block(
        &mut self, writer: &mut ByteWriter, stream: &mut BitWriter, ac: &HuffmanCoder,
        block: &[i32],
    ) -> JpgResult<()> {
        let ss = usize::from(self.scan.spectral_start);
        let se = usize::from(self.scan.spectral_end);
        let al = self.scan.approx_low;

        if !self.is_refinement() {
            let mut run = 0u32;
            for k in ss..=se {
                // the AC point transform truncates toward zero
                let raw = block[UN_ZIGZAG[k]];
                let magnitude = raw.abs() >> al;
                let v = if raw < 0 { -magnitude } else { magnitude };
                if v == 0 {
                    run += 1;
                    continue;
                }
                self.flush_eobrun(writer, stream, ac)?;
                while run >= 16 {
                    ac.put(stream, writer, 0xf0)?;
                    run -= 16;
                }
                super::sequential::put_magnitude(stream, writer, ac, run as u8, v)?;
                run = 0;
            }
            if run > 0 {
                // emitted per block so the Annex K default tables,
                // which carry no multi-block EOB symbols, stay usable
                self.eobrun += 1;
                self.flush_eobrun(writer, stream, ac)?;
            }
            return Ok(());
        }

        // refinement pass, following G.1.2.3 on the encoder side
        let mut absolutes = [0i32; 64];
        let mut eob = 0usize;
        for k in ss..=se {
            let v = (block[UN_ZIGZAG[k]]).abs() >> al;
            absolutes[k] = v;
            if v == 1 {
                eob = k;
            }
        }

        let mut run = 0i32;
        let mut pending: Vec<u8> = Vec::new();
        for k in ss..=se {
            let v = absolutes[k];
            if v == 0 {
                run += 1;
                continue;
            }
            while run > 15 && k <= eob {
                self.flush_eobrun(writer, stream, ac)?;
                ac.put(stream, writer, 0xf0)?;
                run -= 16;
                for bit in pending.drain(..) {
                    stream.put_bits(writer, 1, i32::from(bit));
                }
            }
            if v > 1 {
                // already nonzero, only its correction bit travels
                pending.push((v & 1) as u8);
                continue;
            }
            self.flush_eobrun(writer, stream, ac)?;
            ac.put(stream, writer, ((run as u8) << 4) | 1)?;
            let sign = i32::from(block[UN_ZIGZAG[k]] >= 0);
            stream.put_bits(writer, 1, sign);
            for bit in pending.drain(..) {
                stream.put_bits(writer, 1, i32::from(bit));
            }
            run = 0;
        }
        if run > 0 || !pending.is_empty() {
            self.eobrun += 1;
            self.bit_buffer.extend_from_slice(&pending);
            self.flush_eobrun(writer, stream, ac)?;
        }
        Ok(())
    }

    /// Emit a pending end-of-band run plus the correction bits that
    /// accumulated under it.
    fn flush_eobrun(
        &mut self, writer: &mut ByteWriter, stream: &mut BitWriter, ac: &HuffmanCoder,
    ) -> JpgResult<()> {
        if self.eobrun == 0 {
            if !self.bit_buffer.is_empty() {
                for bit in std::mem::take(&mut self.bit_buffer) {
                    stream.put_bits(writer, 1, i32::from(bit));
                }
            }
            return Ok(());
        }
        let mut nbits = 0u8;
        let mut temp = self.eobrun;
        while {
            temp >>= 1;
            temp != 0
        } {
            nbits += 1;
        }
        ac.put(stream, writer, nbits << 4)?;
        if nbits > 0 {
            stream.put_bits(writer, nbits, (self.eobrun - (1 << nbits)) as i32);
        }
        self.eobrun = 0;
        for bit in std::mem::take(&mut self.bit_buffer) {
            stream.put_bits(writer, 1, i32::from(bit));
        }
        Ok(())
    }
}
