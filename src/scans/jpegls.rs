#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

//! The JPEG-LS (ITU-T T.87) sequential scan in its three interleave
//! shapes: one scan per component, line interleaved and sample
//! interleaved.
//!
//! Regular mode quantizes the local gradients against the thresholds
//! T1..T3 into one of 365 sign-normalized contexts, predicts with the
//! median edge detector, bias-corrects, and codes the mapped residual
//! with limited-length Golomb codes. Runs of samples within `near` of
//! the left neighbour switch to run mode with the exponent ladder
//! `J[]`. Marker safety comes from the single stuffed zero bit after
//! every `0xFF` byte.

use crate::bitstream::{BitReader, BitWriter, Stuffing};
use crate::bytestream::{ByteReader, ByteWriter};
use crate::errors::JpgResult;
use crate::frame::{Frame, Scan};
use crate::linebuffer::LineBuffer;
use crate::scans::{scan_components, RestartMachine, RestartOutcome, ScanComponent};
use crate::tables::{Tables, Thresholds};

/// The run length exponent ladder of T.87.
const J: [i32; 32] = [
    0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 9, 10, 11,
    12, 13, 14, 15,
];

const MIN_C: i32 = -128;
const MAX_C: i32 = 127;

/// Interleave shapes from the scan header.
#[derive(Copy, Clone, Eq, PartialEq)]
enum Interleave {
    None,
    Line,
    Sample,
}

/// The adaptive state shared by both coding directions.
struct LsState {
    a:  [i32; 367],
    b:  [i32; 367],
    c:  [i32; 367],
    n:  [i32; 367],
    /// Negative-error counters of the two run interruption contexts.
    nn: [i32; 2],
    /// Run index, per component in line interleaved mode.
    run_index: [usize; 4],
}

impl LsState {
    fn new(range: i32) -> LsState {
        let a0 = (((range + 32) >> 6) as i32).max(2);
        LsState {
            a:  [a0; 367],
            b:  [0; 367],
            c:  [0; 367],
            n:  [1; 367],
            nn: [0; 2],
            run_index: [0; 4],
        }
    }
}

/// Per-component line context: the reconstructed previous and current
/// lines with the one-sample margins of T.87.
struct LineCtx {
    width: usize,
    prev:  Vec<i32>,
    cur:   Vec<i32>,
    /// Lines coded so far.
    y:     usize,
}

impl LineCtx {
    fn new(width: usize) -> LineCtx {
        LineCtx {
            width,
            prev: vec![0; width + 2],
            cur:  vec![0; width + 2],
            y:    0,
        }
    }

    fn reset(&mut self) {
        self.prev.iter_mut().for_each(|v| *v = 0);
        self.cur.iter_mut().for_each(|v| *v = 0);
        self.y = 0;
    }

    /// Rotate to the next line; call after a line is fully coded.
    fn advance(&mut self) {
        std::mem::swap(&mut self.prev, &mut self.cur);
        self.y += 1;
    }

    /// Prepare the current line: seed Ra at the left margin and
    /// replicate Rd past the right edge.
    fn begin_line(&mut self) {
        let w = self.width;
        self.prev[w + 1] = self.prev[w];
        self.cur[0] = self.prev[1];
    }
}

pub struct JpegLsScan {
    scan:       Scan,
    components: Vec<ScanComponent>,
    interleave: Interleave,
    near:       i32,
    thresholds: Thresholds,
    range:      i32,
    qbpp:       u8,
    limit:      i32,
    max_val:    i32,
    restart:    RestartMachine,
    state:      LsState,
}

impl JpegLsScan {
    pub fn new(frame: &Frame, scan: &Scan, tables: &Tables) -> JpegLsScan {
        let thresholds = tables
            .thresholds
            .unwrap_or_else(|| Thresholds::for_precision(frame.precision, scan.near()));
        let near = i32::from(scan.near());
        let max_val = i32::from(thresholds.max_val);
        let range = if near == 0 {
            max_val + 1
        } else {
            (max_val + 2 * near) / (2 * near + 1) + 1
        };

        let mut qbpp = 1u8;
        while (1 << qbpp) < range {
            qbpp += 1;
        }
        let mut bpp = 1i32;
        while (1 << bpp) < max_val + 1 {
            bpp += 1;
        }
        bpp = bpp.max(2);
        let limit = 2 * (bpp + bpp.max(8));

        let interleave = match scan.spectral_end {
            0 => Interleave::None,
            1 => Interleave::Line,
            _ => Interleave::Sample,
        };

        JpegLsScan {
            scan: scan.clone(),
            components: scan_components(frame, scan),
            interleave,
            near,
            thresholds,
            range,
            qbpp,
            limit,
            max_val,
            restart: RestartMachine::new(tables.restart_interval).with_strict(tables.strict),
            state: LsState::new(range),
        }
    }

    fn quantize_gradient(&self, d: i32) -> i32 {
        let t1 = i32::from(self.thresholds.t1);
        let t2 = i32::from(self.thresholds.t2);
        let t3 = i32::from(self.thresholds.t3);
        if d <= -t3 {
            -4
        } else if d <= -t2 {
            -3
        } else if d <= -t1 {
            -2
        } else if d < -self.near {
            -1
        } else if d <= self.near {
            0
        } else if d < t1 {
            1
        } else if d < t2 {
            2
        } else if d < t3 {
            3
        } else {
            4
        }
    }

    /// Median edge detecting predictor of A.4.1.
    fn predict(a: i32, b: i32, c: i32) -> i32 {
        if c >= a.max(b) {
            a.min(b)
        } else if c <= a.min(b) {
            a.max(b)
        } else {
            a + b - c
        }
    }

    fn golomb_k(&self, q: usize) -> u8 {
        let mut k = 0u8;
        while (self.state.n[q] << k) < self.state.a[q] && k < 24 {
            k += 1;
        }
        k
    }

    /// Limited length Golomb encode of a mapped error (A.5.3).
    fn put_golomb(
        &self, stream: &mut BitWriter, writer: &mut ByteWriter, value: i32, k: u8,
        glimit: i32,
    ) {
        let high = value >> k;
        let escape = glimit - i32::from(self.qbpp) - 1;
        if high < escape {
            let mut zeros = high;
            while zeros >= 16 {
                stream.put_bits(writer, 16, 0);
                zeros -= 16;
            }
            stream.put_bits(writer, zeros as u8 + 1, 1);
            if k > 0 {
                stream.put_bits(writer, k, value & ((1 << k) - 1));
            }
        } else {
            let mut zeros = escape;
            while zeros >= 16 {
                stream.put_bits(writer, 16, 0);
                zeros -= 16;
            }
            stream.put_bits(writer, zeros as u8 + 1, 1);
            stream.put_bits(writer, self.qbpp, value - 1);
        }
    }

    /// Limited length Golomb decode.
    fn get_golomb(
        &self, stream: &mut BitReader, reader: &mut ByteReader, k: u8, glimit: i32,
    ) -> i32 {
        let escape = glimit - i32::from(self.qbpp) - 1;
        let mut zeros = 0i32;
        while stream.get_bit(reader) == 0 {
            zeros += 1;
            if zeros > self.limit {
                return 0; // damaged stream
            }
        }
        if zeros < escape {
            let low = if k > 0 { stream.get_bits(reader, k) } else { 0 };
            (zeros << k) | low
        } else {
            stream.get_bits(reader, self.qbpp) + 1
        }
    }

    /// Code one sample in regular mode; returns the reconstruction.
    #[allow(clippy::too_many_arguments)]
    fn code_regular(
        &mut self, io: &mut LsIo<'_, '_>, q1: i32, q2: i32, q3: i32, a: i32, b: i32, c: i32,
        ix: i32,
    ) -> i32 {
        // sign-normalize the context triple
        let id = (q1 * 9 + q2) * 9 + q3;
        let sign = id < 0;
        let q = id.unsigned_abs() as usize;

        let mut px = Self::predict(a, b, c);
        px += if sign { -self.state.c[q] } else { self.state.c[q] };
        px = px.clamp(0, self.max_val);

        let k = self.golomb_k(q);

        let errval = match io {
            LsIo::Write { stream, writer, .. } => {
                let mut errval = ix - px;
                if sign {
                    errval = -errval;
                }
                if self.near > 0 {
                    errval = if errval > 0 {
                        (self.near + errval) / (2 * self.near + 1)
                    } else {
                        -((self.near - errval) / (2 * self.near + 1))
                    };
                }
                // modulo reduction into the range
                if errval < 0 {
                    errval += self.range;
                }
                if errval >= (self.range + 1) / 2 {
                    errval -= self.range;
                }

                // error mapping of A.5.3
                let map_special = self.near == 0
                    && k == 0
                    && 2 * self.state.b[q] <= -self.state.n[q];
                let merrval = if map_special {
                    if errval >= 0 {
                        2 * errval + 1
                    } else {
                        -2 * (errval + 1)
                    }
                } else if errval >= 0 {
                    2 * errval
                } else {
                    -2 * errval - 1
                };
                self.put_golomb(stream, writer, merrval, k, self.limit);
                errval
            }
            LsIo::Read { stream, reader } => {
                let merrval = self.get_golomb(stream, reader, k, self.limit);
                let map_special = self.near == 0
                    && k == 0
                    && 2 * self.state.b[q] <= -self.state.n[q];
                if map_special {
                    if merrval & 1 != 0 {
                        (merrval - 1) / 2
                    } else {
                        -(merrval / 2) - 1
                    }
                } else if merrval & 1 == 0 {
                    merrval / 2
                } else {
                    -(merrval + 1) / 2
                }
            }
        };

        // reconstruction shared by both directions
        let mut rx = px
            + if sign { -errval } else { errval } * (2 * self.near + 1);
        if rx < -self.near {
            rx += self.range * (2 * self.near + 1);
        } else if rx > self.max_val + self.near {
            rx -= self.range * (2 * self.near + 1);
        }
        let rx = rx.clamp(0, self.max_val);

        // context update of A.6
        self.state.b[q] += errval * (2 * self.near + 1);
        self.state.a[q] += errval.abs();
        if self.state.n[q] == i32::from(self.thresholds.reset) {
            self.state.a[q] >>= 1;
            self.state.b[q] = if self.state.b[q] >= 0 {
                self.state.b[q] >> 1
            } else {
                -((1 - self.state.b[q]) >> 1)
            };
            self.state.n[q] >>= 1;
        }
        self.state.n[q] += 1;

        // bias computation of A.6.2
        if self.state.b[q] <= -self.state.n[q] {
            self.state.b[q] += self.state.n[q];
            if self.state.c[q] > MIN_C {
                self.state.c[q] -= 1;
            }
            if self.state.b[q] <= -self.state.n[q] {
                self.state.b[q] = -self.state.n[q] + 1;
            }
        } else if self.state.b[q] > 0 {
            self.state.b[q] -= self.state.n[q];
            if self.state.c[q] < MAX_C {
                self.state.c[q] += 1;
            }
            if self.state.b[q] > 0 {
                self.state.b[q] = 0;
            }
        }

        rx
    }

    /// Code one run interruption sample (A.7.2); returns the
    /// reconstruction.
    fn code_interruption(
        &mut self, io: &mut LsIo<'_, '_>, ra: i32, rb: i32, ix: i32, run_index: usize,
    ) -> i32 {
        let ritype = (ra - rb).abs() <= self.near;
        let px = if ritype { ra } else { rb };
        let sign = !ritype && ra > rb;

        let q = 365 + usize::from(ritype);
        let temp = if ritype {
            self.state.a[q] + (self.state.n[q] >> 1)
        } else {
            self.state.a[q]
        };
        let mut k = 0u8;
        while (self.state.n[q] << k) < temp && k < 24 {
            k += 1;
        }
        let glimit = self.limit - J[run_index] - 1;

        let (errval, emerrval) = match io {
            LsIo::Write { stream, writer, .. } => {
                let mut errval = ix - px;
                if sign {
                    errval = -errval;
                }
                if self.near > 0 {
                    errval = if errval > 0 {
                        (self.near + errval) / (2 * self.near + 1)
                    } else {
                        -((self.near - errval) / (2 * self.near + 1))
                    };
                }
                if errval < 0 {
                    errval += self.range;
                }
                if errval >= (self.range + 1) / 2 {
                    errval -= self.range;
                }

                // error mapping of A.7.2.1
                let map = if errval == 0 {
                    false
                } else if k == 0 && errval > 0 && 2 * self.state.nn[q - 365] < self.state.n[q]
                {
                    true
                } else if errval < 0 && 2 * self.state.nn[q - 365] >= self.state.n[q] {
                    true
                } else {
                    errval < 0 && k != 0
                };
                let emerrval = 2 * errval.abs() - i32::from(ritype) - i32::from(map);
                self.put_golomb(stream, writer, emerrval, k, glimit);
                (errval, emerrval)
            }
            LsIo::Read { stream, reader } => {
                let emerrval = self.get_golomb(stream, reader, k, glimit);
                // undo the mapping: temp = 2*|Errval| - map, the low
                // bit is the map flag and the sign follows from it
                let temp = emerrval + i32::from(ritype);
                let map = temp & 1 != 0;
                let abs = (temp + i32::from(map)) / 2;
                let negative = (k != 0 || 2 * self.state.nn[q - 365] >= self.state.n[q]) == map;
                let errval = if negative { -abs } else { abs };
                (errval, emerrval)
            }
        };

        let mut rx = px
            + if sign { -errval } else { errval } * (2 * self.near + 1);
        if rx < -self.near {
            rx += self.range * (2 * self.near + 1);
        } else if rx > self.max_val + self.near {
            rx -= self.range * (2 * self.near + 1);
        }
        let rx = rx.clamp(0, self.max_val);

        // update of A.7.2.2
        if errval < 0 {
            self.state.nn[q - 365] += 1;
        }
        self.state.a[q] += (emerrval + 1 - i32::from(ritype)) >> 1;
        if self.state.n[q] == i32::from(self.thresholds.reset) {
            self.state.a[q] >>= 1;
            self.state.n[q] >>= 1;
            self.state.nn[q - 365] >>= 1;
        }
        self.state.n[q] += 1;

        rx
    }
}

/// The coding direction, bundled so regular and run mode can share
/// one implementation.
enum LsIo<'a, 'b> {
    Write {
        stream: &'a mut BitWriter,
        writer: &'a mut ByteWriter,
    },
    Read {
        stream: &'a mut BitReader,
        reader: &'a mut ByteReader<'b>,
    },
}

impl JpegLsScan {
    pub fn parse_scan(
        &mut self, reader: &mut ByteReader, _frame: &mut Frame, tables: &Tables,
        lines: &mut LineBuffer,
    ) -> JpgResult<()> {
        let mut stream = BitReader::new(Stuffing::JpegLs);
        self.run(
            &mut LsIo::Read {
                stream: &mut stream,
                reader,
            },
            tables,
            lines,
        )
    }

    pub fn write_scan(
        &mut self, writer: &mut ByteWriter, _frame: &mut Frame, tables: &Tables,
        lines: &mut LineBuffer,
    ) -> JpgResult<()> {
        let mut stream = BitWriter::new(Stuffing::JpegLs);
        self.run(
            &mut LsIo::Write {
                stream: &mut stream,
                writer,
            },
            tables,
            lines,
        )
    }

    /// Drive the scan in either direction. The line discipline depends
    /// on the interleave shape; the sample coding itself is shared.
    fn run(
        &mut self, io: &mut LsIo<'_, '_>, tables: &Tables, lines: &mut LineBuffer,
    ) -> JpgResult<()> {
        self.state = LsState::new(self.range);
        self.restart = RestartMachine::new(tables.restart_interval).with_strict(tables.strict);

        let mut ctx: Vec<LineCtx> = self
            .components
            .iter()
            .map(|c| LineCtx::new(c.width))
            .collect();

        let heights: Vec<usize> = self.components.iter().map(|c| c.height).collect();
        let groups = heights.iter().copied().max().unwrap_or(0);

        match self.interleave {
            Interleave::None => {
                let height = heights[0];
                for _ in 0..height {
                    self.line_boundary(io, &mut ctx)?;
                    self.code_line_component(io, 0, &mut ctx[0], lines);
                    self.store_line(&mut ctx[0], 0, lines);
                }
            }
            Interleave::Line => {
                let mut done = vec![0usize; self.components.len()];
                for _ in 0..groups {
                    self.line_boundary(io, &mut ctx)?;
                    for slot in 0..self.components.len() {
                        let per_group = self.components[slot].mcu_h.max(1);
                        for _ in 0..per_group {
                            if done[slot] >= heights[slot] {
                                continue;
                            }
                            self.code_line_component(io, slot, &mut ctx[slot], lines);
                            self.store_line(&mut ctx[slot], slot, lines);
                            done[slot] += 1;
                        }
                    }
                }
            }
            Interleave::Sample => {
                let height = heights.iter().copied().min().unwrap_or(0);
                for _ in 0..height {
                    self.line_boundary(io, &mut ctx)?;
                    self.code_line_sample_interleaved(io, &mut ctx, lines);
                    for slot in 0..ctx.len() {
                        self.store_line(&mut ctx[slot], slot, lines);
                    }
                }
            }
        }

        if let LsIo::Write { stream, writer } = io {
            stream.flush(writer);
        }
        Ok(())
    }

    /// Restart bookkeeping at a line boundary; the interval counts
    /// lines in JPEG-LS.
    fn line_boundary(
        &mut self, io: &mut LsIo<'_, '_>, ctx: &mut [LineCtx],
    ) -> JpgResult<()> {
        if !self.restart.due() {
            self.restart.advance();
            return Ok(());
        }
        match io {
            LsIo::Write { stream, writer } => {
                stream.flush(writer);
                self.restart.put_marker(writer);
            }
            LsIo::Read { stream, reader } => {
                stream.skip_stuffing();
                stream.align_to_reader(reader);
                match self.restart.parse_marker(reader)? {
                    RestartOutcome::Restarted => stream.reset(),
                    RestartOutcome::LinesDefined(_) | RestartOutcome::EndOfScan => {
                        stream.reset();
                    }
                }
            }
        }
        // full reset, as at scan start
        self.state = LsState::new(self.range);
        for c in ctx.iter_mut() {
            let y = c.y;
            c.reset();
            c.y = y;
        }
        self.restart.advance();
        Ok(())
    }

    /// Code one full line of one component.
    fn code_line_component(
        &mut self, io: &mut LsIo<'_, '_>, slot: usize, ctx: &mut LineCtx,
        lines: &LineBuffer,
    ) {
        ctx.begin_line();
        let width = ctx.width;
        let comp = self.components[slot];
        let reading = matches!(io, LsIo::Read { .. });

        // when encoding, the source samples come from the line buffer
        let mut source: Vec<i32> = Vec::new();
        if !reading {
            source.extend_from_slice(&lines.component(comp.index).line(ctx.y)[..width]);
        }

        let mut x = 1usize;
        while x <= width {
            let a = ctx.cur[x - 1];
            let b = ctx.prev[x];
            let c = ctx.prev[x - 1];
            let d = ctx.prev[x + 1];

            let q1 = self.quantize_gradient(d - b);
            let q2 = self.quantize_gradient(b - c);
            let q3 = self.quantize_gradient(c - a);

            if q1 == 0 && q2 == 0 && q3 == 0 {
                x = self.code_run(io, slot, ctx, &source, x, reading);
                continue;
            }

            let ix = if reading { 0 } else { source[x - 1] };
            let rx = self.code_regular(io, q1, q2, q3, a, b, c, ix);
            ctx.cur[x] = rx;
            x += 1;
        }
    }

    /// Run mode over one component line (A.7.1); returns the next
    /// sample index.
    fn code_run(
        &mut self, io: &mut LsIo<'_, '_>, slot: usize, ctx: &mut LineCtx, source: &[i32],
        start: usize, reading: bool,
    ) -> usize {
        let width = ctx.width;
        let ra = ctx.cur[start - 1];
        let run_slot = if self.interleave == Interleave::Line {
            slot
        } else {
            0
        };

        match io {
            LsIo::Write { .. } => {
                // measure the run
                let mut count = 0usize;
                while start + count <= width
                    && (source[start + count - 1] - ra).abs() <= self.near
                {
                    count += 1;
                }
                let interrupted = start + count <= width;
                let mut remaining = count as i32;

                // emit full segments
                loop {
                    let (stream, writer) = match io {
                        LsIo::Write { stream, writer } => (&mut **stream, &mut **writer),
                        LsIo::Read { .. } => unreachable!(),
                    };
                    let seg = 1i32 << J[self.state.run_index[run_slot]];
                    if remaining < seg {
                        break;
                    }
                    stream.put_bits(writer, 1, 1);
                    remaining -= seg;
                    if self.state.run_index[run_slot] < 31 {
                        self.state.run_index[run_slot] += 1;
                    }
                }

                for i in 0..count {
                    ctx.cur[start + i] = ra;
                }

                if !interrupted {
                    // the run ran to the end of the line
                    if remaining > 0 {
                        if let LsIo::Write { stream, writer } = io {
                            stream.put_bits(writer, 1, 1);
                        }
                    }
                    return start + count;
                }

                // broken run: length remainder, then the interruption
                // sample
                let bits = J[self.state.run_index[run_slot]] as u8;
                if let LsIo::Write { stream, writer } = io {
                    stream.put_bits(writer, 1, 0);
                    if bits > 0 {
                        stream.put_bits(writer, bits, remaining);
                    }
                }

                let x = start + count;
                let rb = ctx.prev[x];
                let ix = source[x - 1];
                let run_index = self.state.run_index[run_slot];
                let rx = self.code_interruption(io, ra, rb, ix, run_index);
                ctx.cur[x] = rx;
                if self.state.run_index[run_slot] > 0 {
                    self.state.run_index[run_slot] -= 1;
                }
                x + 1
            }
            LsIo::Read { .. } => {
                let mut x = start;
                loop {
                    let bit = match io {
                        LsIo::Read { stream, reader } => stream.get_bit(reader),
                        LsIo::Write { .. } => unreachable!(),
                    };
                    if bit == 1 {
                        let seg = 1usize << J[self.state.run_index[run_slot]];
                        let remaining = width + 1 - x;
                        if seg <= remaining {
                            for i in 0..seg {
                                ctx.cur[x + i] = ra;
                            }
                            x += seg;
                            if self.state.run_index[run_slot] < 31 {
                                self.state.run_index[run_slot] += 1;
                            }
                            if x > width {
                                return x;
                            }
                        } else {
                            // partial final segment up to the line end
                            for i in 0..remaining {
                                ctx.cur[x + i] = ra;
                            }
                            return width + 1;
                        }
                    } else {
                        // length remainder then the interruption sample
                        let bits = J[self.state.run_index[run_slot]] as u8;
                        let count = if bits > 0 {
                            match io {
                                LsIo::Read { stream, reader } => {
                                    stream.get_bits(reader, bits) as usize
                                }
                                LsIo::Write { .. } => unreachable!(),
                            }
                        } else {
                            0
                        };
                        for i in 0..count {
                            ctx.cur[x + i] = ra;
                        }
                        x += count;

                        let rb = ctx.prev[x];
                        let run_index = self.state.run_index[run_slot];
                        let rx = self.code_interruption(io, ra, rb, 0, run_index);
                        ctx.cur[x] = rx;
                        if self.state.run_index[run_slot] > 0 {
                            self.state.run_index[run_slot] -= 1;
                        }
                        return x + 1;
                    }
                }
            }
        }
    }

    /// One line in sample interleaved shape: every pixel carries all
    /// components; runs require the run condition on each of them.
    fn code_line_sample_interleaved(
        &mut self, io: &mut LsIo<'_, '_>, ctx: &mut [LineCtx], lines: &LineBuffer,
    ) {
        let width = ctx[0].width;
        let count = ctx.len();
        let reading = matches!(io, LsIo::Read { .. });

        let mut sources: Vec<Vec<i32>> = Vec::new();
        for (slot, c) in ctx.iter_mut().enumerate() {
            c.begin_line();
            if !reading {
                let comp = self.components[slot];
                sources
                    .push(lines.component(comp.index).line(c.y)[..width].to_vec());
            } else {
                sources.push(Vec::new());
            }
        }

        let mut x = 1usize;
        while x <= width {
            // the run condition must hold for every component
            let mut all_zero = true;
            for c in ctx.iter() {
                let a = c.cur[x - 1];
                let b = c.prev[x];
                let cc = c.prev[x - 1];
                let d = c.prev[x + 1];
                if self.quantize_gradient(d - b) != 0
                    || self.quantize_gradient(b - cc) != 0
                    || self.quantize_gradient(cc - a) != 0
                {
                    all_zero = false;
                    break;
                }
            }

            if !all_zero {
                for slot in 0..count {
                    let (a, b, cc, d) = {
                        let c = &ctx[slot];
                        (c.cur[x - 1], c.prev[x], c.prev[x - 1], c.prev[x + 1])
                    };
                    let q1 = self.quantize_gradient(d - b);
                    let q2 = self.quantize_gradient(b - cc);
                    let q3 = self.quantize_gradient(cc - a);
                    let ix = if reading { 0 } else { sources[slot][x - 1] };
                    let rx = self.code_regular(io, q1, q2, q3, a, b, cc, ix);
                    ctx[slot].cur[x] = rx;
                }
                x += 1;
                continue;
            }

            // pixel run
            x = self.code_pixel_run(io, ctx, &sources, x, reading, width);
        }
    }

    /// A run of whole pixels in sample interleaved shape.
    fn code_pixel_run(
        &mut self, io: &mut LsIo<'_, '_>, ctx: &mut [LineCtx], sources: &[Vec<i32>],
        start: usize, reading: bool, width: usize,
    ) -> usize {
        let count_comps = ctx.len();

        match io {
            LsIo::Write { .. } => {
                let mut count = 0usize;
                'measure: while start + count <= width {
                    for slot in 0..count_comps {
                        let ra = ctx[slot].cur[start - 1];
                        if (sources[slot][start + count - 1] - ra).abs() > self.near {
                            break 'measure;
                        }
                    }
                    count += 1;
                }
                let interrupted = start + count <= width;
                let mut remaining = count as i32;

                loop {
                    let seg = 1i32 << J[self.state.run_index[0]];
                    if remaining < seg {
                        break;
                    }
                    if let LsIo::Write { stream, writer } = io {
                        stream.put_bits(writer, 1, 1);
                    }
                    remaining -= seg;
                    if self.state.run_index[0] < 31 {
                        self.state.run_index[0] += 1;
                    }
                }

                for slot in 0..count_comps {
                    let ra = ctx[slot].cur[start - 1];
                    for i in 0..count {
                        ctx[slot].cur[start + i] = ra;
                    }
                }

                if !interrupted {
                    if remaining > 0 {
                        if let LsIo::Write { stream, writer } = io {
                            stream.put_bits(writer, 1, 1);
                        }
                    }
                    return start + count;
                }

                let bits = J[self.state.run_index[0]] as u8;
                if let LsIo::Write { stream, writer } = io {
                    stream.put_bits(writer, 1, 0);
                    if bits > 0 {
                        stream.put_bits(writer, bits, remaining);
                    }
                }

                // one interruption sample per component, coded against
                // the sample above
                let x = start + count;
                let run_index = self.state.run_index[0];
                for slot in 0..count_comps {
                    let ra = ctx[slot].cur[x - 1];
                    let rb = ctx[slot].prev[x];
                    let ix = sources[slot][x - 1];
                    let rx = self.code_interruption(io, ra, rb, ix, run_index);
                    ctx[slot].cur[x] = rx;
                }
                if self.state.run_index[0] > 0 {
                    self.state.run_index[0] -= 1;
                }
                x + 1
            }
            LsIo::Read { .. } => {
                let mut x = start;
                loop {
                    let bit = match io {
                        LsIo::Read { stream, reader } => stream.get_bit(reader),
                        LsIo::Write { .. } => unreachable!(),
                    };
                    if bit == 1 {
                        let seg = 1usize << J[self.state.run_index[0]];
                        let remaining = width + 1 - x;
                        if seg <= remaining {
                            for slot in 0..count_comps {
                                let ra = ctx[slot].cur[start - 1];
                                for i in 0..seg {
                                    ctx[slot].cur[x + i] = ra;
                                }
                            }
                            x += seg;
                            if self.state.run_index[0] < 31 {
                                self.state.run_index[0] += 1;
                            }
                            if x > width {
                                return x;
                            }
                        } else {
                            for slot in 0..count_comps {
                                let ra = ctx[slot].cur[start - 1];
                                for i in 0..remaining {
                                    ctx[slot].cur[x + i] = ra;
                                }
                            }
                            return width + 1;
                        }
                    } else {
                        let bits = J[self.state.run_index[0]] as u8;
                        let count = if bits > 0 {
                            match io {
                                LsIo::Read { stream, reader } => {
                                    stream.get_bits(reader, bits) as usize
                                }
                                LsIo::Write { .. } => unreachable!(),
                            }
                        } else {
                            0
                        };
                        for slot in 0..count_comps {
                            let ra = ctx[slot].cur[start - 1];
                            for i in 0..count {
                                ctx[slot].cur[x + i] = ra;
                            }
                        }
                        x += count;

                        let run_index = self.state.run_index[0];
                        for slot in 0..count_comps {
                            let ra = ctx[slot].cur[x - 1];
                            let rb = ctx[slot].prev[x];
                            let rx = self.code_interruption(io, ra, rb, 0, run_index);
                            ctx[slot].cur[x] = rx;
                        }
                        if self.state.run_index[0] > 0 {
                            self.state.run_index[0] -= 1;
                        }
                        return x + 1;
                    }
                }
            }
        }
    }

    /// Move the reconstructed line into the frame buffer and rotate
    /// the line context.
    fn store_line(&mut self, ctx: &mut LineCtx, slot: usize, lines: &mut LineBuffer) {
        let comp = self.components[slot];
        let width = ctx.width;
        let component = lines.component_mut(comp.index);
        component.ensure_rows(ctx.y + 1);
        component.line_mut(ctx.y)[..width].copy_from_slice(&ctx.cur[1..=width]);
        ctx.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::misc::SOFMarkers;

    fn gray_frame(width: usize, height: usize) -> Frame {
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        Frame::new(SOFMarkers::JpegLs, 8, width, height, vec![c]).unwrap()
    }

    fn ls_scan(near: u8, ilv: u8, components: Vec<usize>) -> Scan {
        Scan {
            components,
            dc_table: [0; 4],
            ac_table: [0; 4],
            spectral_start: near,
            spectral_end: ilv,
            approx_high: 0,
            approx_low: 0,
        }
    }

    fn roundtrip_gray(samples: &[i32], width: usize, height: usize, near: u8) -> Vec<i32> {
        let mut frame = gray_frame(width, height);
        let scan = ls_scan(near, 0, vec![0]);
        let tables = Tables::new();

        let mut lines = LineBuffer::new(&frame);
        {
            let comp = lines.component_mut(0);
            comp.ensure_rows(height);
            for y in 0..height {
                comp.line_mut(y)[..width]
                    .copy_from_slice(&samples[y * width..][..width]);
            }
        }

        let mut writer = ByteWriter::new();
        let mut encoder = JpegLsScan::new(&frame, &scan, &tables);
        encoder
            .write_scan(&mut writer, &mut frame, &tables, &mut lines)
            .unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = LineBuffer::new(&frame);
        let mut decoder = JpegLsScan::new(&frame, &scan, &tables);
        decoder
            .parse_scan(&mut reader, &mut frame, &tables, &mut decoded)
            .unwrap();

        let mut out = Vec::new();
        for y in 0..height {
            out.extend_from_slice(&decoded.component(0).line(y)[..width]);
        }
        out
    }

    #[test]
    fn flat_image_is_one_long_run() {
        let samples = vec![127i32; 32 * 8];
        assert_eq!(roundtrip_gray(&samples, 32, 8, 0), samples);
    }

    #[test]
    fn textured_image_roundtrips_exactly() {
        let samples: Vec<i32> = (0..24 * 16)
            .map(|i| ((i * 31) ^ (i / 24 * 7)) % 256)
            .collect();
        assert_eq!(roundtrip_gray(&samples, 24, 16, 0), samples);
    }

    #[test]
    fn mixed_runs_and_edges() {
        // vertical bars produce run entries broken by edges
        let width = 21;
        let height = 9;
        let samples: Vec<i32> = (0..width * height)
            .map(|i| if (i % width) < 10 { 40 } else { 200 })
            .collect();
        assert_eq!(roundtrip_gray(&samples, width, height, 0), samples);
    }

    #[test]
    fn near_lossless_bounds_the_error() {
        let near = 2u8;
        let width: usize = 16;
        let height: usize = 8;
        let samples: Vec<i32> = (0..(width * height) as i32).map(|i| (i * 11) % 256).collect();
        let decoded = roundtrip_gray(&samples, width, height, near);
        for (d, s) in decoded.iter().zip(samples.iter()) {
            assert!(
                (d - s).abs() <= i32::from(near),
                "sample error {} exceeds near {}",
                (d - s).abs(),
                near
            );
        }
    }

    #[test]
    fn line_interleaved_color_roundtrips() {
        let width = 12;
        let height = 6;
        let comps = vec![
            Component::from([1, 0x11, 0], 0).unwrap(),
            Component::from([2, 0x11, 0], 1).unwrap(),
            Component::from([3, 0x11, 0], 2).unwrap(),
        ];
        let mut frame = Frame::new(SOFMarkers::JpegLs, 8, width, height, comps).unwrap();
        let scan = ls_scan(0, 1, vec![0, 1, 2]);
        let tables = Tables::new();

        let mut lines = LineBuffer::new(&frame);
        for comp_index in 0..3 {
            let comp = lines.component_mut(comp_index);
            comp.ensure_rows(height);
            for y in 0..height {
                for x in 0..width {
                    comp.line_mut(y)[x] = ((x * 19 + y * 31 + comp_index * 57) % 256) as i32;
                }
            }
        }

        let mut writer = ByteWriter::new();
        let mut encoder = JpegLsScan::new(&frame, &scan, &tables);
        encoder
            .write_scan(&mut writer, &mut frame, &tables, &mut lines)
            .unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = LineBuffer::new(&frame);
        let mut decoder = JpegLsScan::new(&frame, &scan, &tables);
        decoder
            .parse_scan(&mut reader, &mut frame, &tables, &mut decoded)
            .unwrap();

        for comp_index in 0..3 {
            for y in 0..height {
                assert_eq!(
                    decoded.component(comp_index).line(y)[..width],
                    lines.component(comp_index).line(y)[..width],
                    "component {comp_index} line {y}"
                );
            }
        }
    }

    #[test]
    fn sample_interleaved_color_roundtrips() {
        let width = 10;
        let height = 5;
        let comps = vec![
            Component::from([1, 0x11, 0], 0).unwrap(),
            Component::from([2, 0x11, 0], 1).unwrap(),
            Component::from([3, 0x11, 0], 2).unwrap(),
        ];
        let mut frame = Frame::new(SOFMarkers::JpegLs, 8, width, height, comps).unwrap();
        let scan = ls_scan(0, 2, vec![0, 1, 2]);
        let tables = Tables::new();

        let mut lines = LineBuffer::new(&frame);
        for comp_index in 0..3 {
            let comp = lines.component_mut(comp_index);
            comp.ensure_rows(height);
            for y in 0..height {
                for x in 0..width {
                    comp.line_mut(y)[x] =
                        if x < 5 { 100 } else { ((x + y + comp_index) % 256) as i32 };
                }
            }
        }

        let mut writer = ByteWriter::new();
        let mut encoder = JpegLsScan::new(&frame, &scan, &tables);
        encoder
            .write_scan(&mut writer, &mut frame, &tables, &mut lines)
            .unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = LineBuffer::new(&frame);
        let mut decoder = JpegLsScan::new(&frame, &scan, &tables);
        decoder
            .parse_scan(&mut reader, &mut frame, &tables, &mut decoded)
            .unwrap();

        for comp_index in 0..3 {
            for y in 0..height {
                assert_eq!(
                    decoded.component(comp_index).line(y)[..width],
                    lines.component(comp_index).line(y)[..width],
                    "component {comp_index} line {y}"
                );
            }
        }
    }

    #[test]
    fn sixteen_bit_samples_roundtrip() {
        let width = 8;
        let height = 4;
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        let mut frame = Frame::new(SOFMarkers::JpegLs, 16, width, height, vec![c]).unwrap();
        let scan = ls_scan(0, 0, vec![0]);
        let tables = Tables::new();

        let samples: Vec<i32> = (0..width * height)
            .map(|i| ((i * 9973) % 65536) as i32)
            .collect();
        let mut lines = LineBuffer::new(&frame);
        {
            let comp = lines.component_mut(0);
            comp.ensure_rows(height);
            for y in 0..height {
                comp.line_mut(y)[..width]
                    .copy_from_slice(&samples[y * width..][..width]);
            }
        }

        let mut writer = ByteWriter::new();
        let mut encoder = JpegLsScan::new(&frame, &scan, &tables);
        encoder
            .write_scan(&mut writer, &mut frame, &tables, &mut lines)
            .unwrap();

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut decoded = LineBuffer::new(&frame);
        let mut decoder = JpegLsScan::new(&frame, &scan, &tables);
        decoder
            .parse_scan(&mut reader, &mut frame, &tables, &mut decoded)
            .unwrap();

        let mut out = Vec::new();
        for y in 0..height {
            out.extend_from_slice(&decoded.component(0).line(y)[..width]);
        }
        assert_eq!(out, samples);
    }
}
