#![allow(clippy::cast_possible_truncation)]

//! The entropy-coded scan drivers.
//!
//! Every scan type implements the same surface: start parsing or
//! writing, process MCUs in raster order, react to restart markers and
//! flush at the end. A tagged enum keeps dispatch off the heap; the
//! shared geometry and restart logic live here.

pub mod aclossless;
pub mod arithdct;
pub mod jpegls;
pub mod lossless;
pub mod progressive;
pub mod sequential;

use crate::bytestream::ByteReader;
use crate::bytestream::ByteWriter;
use crate::errors::{JpgError, JpgResult};
use crate::frame::{Frame, Scan};
use crate::markers::Marker;

pub use aclossless::AcLosslessScan;
pub use arithdct::ArithDctScan;
pub use jpegls::JpegLsScan;
pub use lossless::LosslessScan;
pub use progressive::ProgressiveScan;
pub use sequential::SequentialScan;

/// Resolved per-component geometry of one scan.
#[derive(Clone, Copy)]
pub(crate) struct ScanComponent {
    /// Index into the frame's component list.
    pub index:    usize,
    /// Samples per line of this component.
    pub width:    usize,
    /// Lines of this component; zero while the height is deferred.
    pub height:   usize,
    /// MCU cells horizontally: samples for line based scans, blocks
    /// for DCT scans.
    pub mcu_w:    usize,
    pub mcu_h:    usize,
    /// Blocks per padded line (DCT scans).
    pub blocks_w: usize,
    pub dc_table: usize,
    pub ac_table: usize,
}

/// Compute the geometry of a scan. Non-interleaved scans force the
/// MCU to a single cell per B.2.3.
pub(crate) fn scan_components(frame: &Frame, scan: &Scan) -> Vec<ScanComponent> {
    let single = scan.components.len() == 1;
    scan.components
        .iter()
        .enumerate()
        .map(|(slot, index)| {
            let c = &frame.components[*index];
            ScanComponent {
                index:    *index,
                width:    c.width_for(frame.width),
                height:   c.height_for(frame.height),
                mcu_w:    if single { 1 } else { c.horizontal_sample },
                mcu_h:    if single { 1 } else { c.vertical_sample },
                blocks_w: c.blocks_per_line(frame.width, !single),
                dc_table: scan.dc_table[slot],
                ac_table: scan.ac_table[slot],
            }
        })
        .collect()
}

/// MCU columns of a line based scan.
pub(crate) fn mcus_per_line(components: &[ScanComponent]) -> usize {
    components
        .iter()
        .map(|c| (c.width + c.mcu_w - 1) / c.mcu_w)
        .max()
        .unwrap_or(0)
}

/// MCU rows of a line based scan; zero while the height is unknown.
pub(crate) fn mcus_per_column(components: &[ScanComponent]) -> usize {
    components
        .iter()
        .map(|c| {
            if c.height == 0 {
                0
            } else {
                (c.height + c.mcu_h - 1) / c.mcu_h
            }
        })
        .max()
        .unwrap_or(0)
}

/// What a restart boundary turned out to be.
pub(crate) enum RestartOutcome {
    /// A restart marker was consumed; entropy state must be reset.
    Restarted,
    /// A DNL segment resolved the frame height; the scan is over.
    LinesDefined(usize),
    /// The scan data ended (EOI, next SOS, or damage beyond repair).
    EndOfScan,
}

/// Restart interval bookkeeping shared by all scan drivers.
pub(crate) struct RestartMachine {
    /// MCUs between restart markers; zero disables the machinery.
    pub interval: usize,
    /// MCUs until the next marker.
    pub togo:     usize,
    /// Expected index of the next marker, cycling modulo eight.
    pub index:    u8,
    /// Deduplicated warning flag so damaged streams log once.
    warned:       bool,
    /// Escalate recoverable damage instead of resynchronizing.
    strict:       bool,
}

impl RestartMachine {
    pub fn new(interval: u16) -> RestartMachine {
        RestartMachine {
            interval: usize::from(interval),
            togo:     usize::from(interval),
            index:    0,
            warned:   false,
            strict:   false,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> RestartMachine {
        self.strict = strict;
        self
    }

    /// True when the next MCU sits on a restart boundary.
    pub fn due(&self) -> bool {
        self.interval > 0 && self.togo == 0
    }

    /// Account for one coded MCU.
    pub fn advance(&mut self) {
        if self.interval > 0 {
            self.togo -= 1;
        }
    }

    /// Writer side: emit the next restart marker.
    pub fn put_marker(&mut self, writer: &mut ByteWriter) {
        writer.put_word(0xffd0 | u16::from(self.index));
        self.index = (self.index + 1) & 7;
        self.togo = self.interval;
    }

    /// Reader side: consume the restart marker that is due. The byte
    /// reader must already be aligned behind the entropy data.
    ///
    /// A mismatched or missing marker is a recoverable warning: the
    /// stream is scanned forward to the next plausible
    /// synchronization point.
    pub fn parse_marker(&mut self, reader: &mut ByteReader) -> JpgResult<RestartOutcome> {
        loop {
            let word = match reader.peek_word() {
                Some(word) => word,
                None => return Ok(RestartOutcome::EndOfScan),
            };

            let marker = if word >> 8 == 0xff {
                Marker::from_u8(word as u8)
            } else {
                None
            };

            match marker {
                Some(Marker::RST(n)) => {
                    reader.skip(2);
                    if n != self.index {
                        if self.strict {
                            return Err(self.strict_violation("RestartMachine::parse_marker"));
                        }
                        if !self.warned {
                            self.warned = true;
                            warn!(
                                "expected restart marker {}, found {n}; resynchronizing",
                                self.index
                            );
                        }
                    }
                    self.index = (n + 1) & 7;
                    self.togo = self.interval;
                    return Ok(RestartOutcome::Restarted);
                }
                Some(Marker::DNL) => {
                    reader.skip(2);
                    let height = crate::headers::parse_dnl(reader)?;
                    return Ok(RestartOutcome::LinesDefined(height));
                }
                Some(Marker::EOI) | Some(Marker::SOS) => {
                    // leave it for the outer parser
                    return Ok(RestartOutcome::EndOfScan);
                }
                _ => {
                    // Not at a marker yet. Arithmetic segments
                    // legitimately end in bytes the decoder never
                    // pulls, so quietly hunt for the next
                    // restart-class marker.
                    let wanted = [
                        0xd0, 0xd1, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xdc, 0xd9, 0xda,
                    ];
                    if reader.skip_to_marker(&wanted).is_none() {
                        return Ok(RestartOutcome::EndOfScan);
                    }
                    // loop around and classify what we found
                }
            }
        }
    }

    /// Fail instead of recovering when the caller asked for strict
    /// decoding.
    pub fn strict_violation(&self, method: &'static str) -> JpgError {
        JpgError::malformed(method, "restart synchronization lost in strict mode")
    }
}

/// The scan driver family, one variant per coding process.
pub enum EntropyParser {
    /// Baseline and extended sequential Huffman DCT.
    Sequential(SequentialScan),
    /// Progressive Huffman DCT.
    Progressive(ProgressiveScan),
    /// Sequential or progressive arithmetic DCT.
    ArithDct(ArithDctScan),
    /// Lossless predictive, Huffman coded, plus differential variant.
    Lossless(LosslessScan),
    /// Lossless predictive, arithmetic coded, plus differential.
    ArithLossless(AcLosslessScan),
    /// JPEG-LS in any interleave shape.
    JpegLs(JpegLsScan),
}

impl EntropyParser {
    /// Build the scan driver matching the frame's coding process.
    pub fn create(frame: &Frame, scan: &Scan, tables: &crate::tables::Tables) -> EntropyParser {
        use crate::misc::SOFMarkers::*;

        let interval = tables.restart_interval;
        let differential = frame.sof.is_differential();
        match frame.sof {
            BaselineDct
            | ExtendedSequentialHuffman
            | DifferentialSequentialHuffman => {
                EntropyParser::Sequential(SequentialScan::new(frame, scan, interval, differential))
            }
            ProgressiveDctHuffman | DifferentialProgressiveHuffman => {
                EntropyParser::Progressive(ProgressiveScan::new(frame, scan, interval, differential))
            }
            ExtendedSequentialDctArithmetic | DifferentialSequentialArithmetic => {
                EntropyParser::ArithDct(ArithDctScan::new(frame, scan, interval, false, differential))
            }
            ProgressiveDctArithmetic | DifferentialProgressiveArithmetic => {
                EntropyParser::ArithDct(ArithDctScan::new(frame, scan, interval, true, differential))
            }
            LosslessHuffman | DifferentialLosslessHuffman => {
                EntropyParser::Lossless(LosslessScan::new(frame, scan, interval, differential))
            }
            LosslessArithmetic | DifferentialLosslessArithmetic => {
                EntropyParser::ArithLossless(AcLosslessScan::new(frame, scan, interval, differential))
            }
            JpegLs => EntropyParser::JpegLs(JpegLsScan::new(frame, scan, tables)),
        }
    }

}
