#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

//! MSB-first bit packing over the byte layer.
//!
//! Two stuffing disciplines exist in the standards this crate covers:
//!
//! - T.81 entropy segments follow every `0xFF` byte with a literal
//!   `0x00` so no false marker can appear;
//! - T.87 (JPEG-LS) follows every `0xFF` byte with a *single* zero
//!   bit, so the next byte carries only seven payload bits.
//!
//! The readers stop delivering bits when a real marker shows up and
//! hand back zeros from then on; the scan drivers notice the pending
//! marker at the next MCU boundary and recover (`ClearMCU` semantics).

use crate::bytestream::{ByteReader, ByteWriter};
use crate::markers::Marker;

/// Which stuffing rule the stream obeys.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Stuffing {
    /// `0xFF` is followed by a `0x00` byte.
    Jpeg,
    /// `0xFF` is followed by a zero bit.
    JpegLs,
}

/// Bit-wise reader for an entropy-coded segment.
pub struct BitReader {
    /// Bits yet to be consumed sit in the top of this buffer.
    buffer:    u64,
    bits_left: u8,
    stuffing:  Stuffing,
    /// Did we run into a marker (RST/DNL/EOI/next SOS)?
    pub marker: Option<Marker>,
    /// Set once the underlying stream ran dry.
    eof:       bool,
}

impl BitReader {
    pub fn new(stuffing: Stuffing) -> BitReader {
        BitReader {
            buffer:    0,
            bits_left: 0,
            stuffing,
            marker:    None,
            eof:       false,
        }
    }

    /// Forget all buffered state; used when a scan or restart interval
    /// begins.
    pub fn reset(&mut self) {
        self.buffer = 0;
        self.bits_left = 0;
        self.marker = None;
        self.eof = false;
    }

    /// Pull bytes until at least 32 bits are buffered, a marker is
    /// found or the input ends.
    fn refill(&mut self, reader: &mut ByteReader) {
        while self.bits_left <= 48 && self.marker.is_none() && !self.eof {
            let byte = match reader.get() {
                Some(b) => b,
                None => {
                    self.eof = true;
                    break;
                }
            };

            if byte != 0xff {
                self.push_bits(u64::from(byte), 8);
                continue;
            }

            match self.stuffing {
                Stuffing::Jpeg => {
                    // 0xFF: either stuffed data, fill bytes or a marker.
                    let mut next = reader.get();
                    while next == Some(0xff) {
                        // fill byte, skip it
                        next = reader.get();
                    }
                    match next {
                        Some(0x00) => self.push_bits(0xff, 8),
                        Some(id) => {
                            // A real marker. Leave it in the stream for
                            // the outer parser.
                            reader.set_position(reader.position() - 2);
                            self.marker = Marker::from_u8(id);
                            if self.marker.is_none() {
                                // reserved id, treat as damage and stop
                                self.marker = Some(Marker::EOI);
                            }
                        }
                        None => self.eof = true,
                    }
                }
                Stuffing::JpegLs => {
                    // 0xFF followed by a byte with the high bit set is
                    // a marker; otherwise the next byte carries seven
                    // bits under a stuffed zero.
                    match reader.peek() {
                        Some(id) if id >= 0x80 => {
                            reader.last_un_do();
                            self.marker = Marker::from_u8(id);
                            if self.marker.is_none() {
                                self.marker = Some(Marker::EOI);
                            }
                        }
                        Some(low) => {
                            reader.get();
                            self.push_bits(0xff, 8);
                            self.push_bits(u64::from(low & 0x7f), 7);
                        }
                        None => {
                            self.push_bits(0xff, 8);
                            self.eof = true;
                        }
                    }
                }
            }
        }
    }

    #[inline]
    fn push_bits(&mut self, value: u64, count: u8) {
        self.buffer |= value << (64 - self.bits_left - count);
        self.bits_left += count;
    }

    /// Read `count` bits MSB first. Bits past the end of the segment
    /// read as zero.
    #[inline]
    pub fn get_bits(&mut self, reader: &mut ByteReader, count: u8) -> i32 {
        debug_assert!(count <= 32);
        if count == 0 {
            return 0;
        }
        if self.bits_left < count {
            self.refill(reader);
        }
        let value = (self.buffer >> (64 - count)) as i32;
        let consumed = count.min(self.bits_left);
        self.buffer <<= consumed;
        self.bits_left -= consumed;
        value
    }

    /// Read a single bit.
    #[inline]
    pub fn get_bit(&mut self, reader: &mut ByteReader) -> i32 {
        self.get_bits(reader, 1)
    }

    /// Look at the next `count` bits without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, reader: &mut ByteReader, count: u8) -> i32 {
        if self.bits_left < count {
            self.refill(reader);
        }
        (self.buffer >> (64 - count)) as i32
    }

    /// Drop bits previously seen through `peek_bits`.
    #[inline]
    pub fn drop_bits(&mut self, count: u8) {
        let consumed = count.min(self.bits_left);
        self.buffer <<= consumed;
        self.bits_left -= consumed;
    }

    /// Discard the remainder of the current byte, including any
    /// stuffed zero bit, so the reader sits on a byte boundary.
    pub fn skip_stuffing(&mut self) {
        let partial = self.bits_left % 8;
        self.drop_bits(partial);
    }

    /// Hand whole buffered bytes back to the byte reader so its
    /// position matches the logical bit position. Partial bits are
    /// discarded first. Needed before marker synchronization.
    pub fn align_to_reader(&mut self, reader: &mut ByteReader) {
        self.skip_stuffing();
        let whole = usize::from(self.bits_left / 8);
        if whole > 0 && !self.eof {
            reader.set_position(reader.position() - whole);
        }
        self.buffer = 0;
        self.bits_left = 0;
    }

    /// True once a marker stopped the bit supply.
    pub fn saw_marker(&self) -> bool {
        self.marker.is_some()
    }

    /// True once the underlying byte stream ran dry.
    pub fn at_eof(&self) -> bool {
        self.eof
    }
}

/// Bit-wise writer for an entropy-coded segment.
pub struct BitWriter {
    buffer:      u32,
    bits:        u8,
    stuffing:    Stuffing,
    /// The previous emitted byte was 0xFF; the next one carries only
    /// seven bits (JPEG-LS only).
    last_was_ff: bool,
}

impl BitWriter {
    pub fn new(stuffing: Stuffing) -> BitWriter {
        BitWriter {
            buffer:      0,
            bits:        0,
            stuffing,
            last_was_ff: false,
        }
    }

    pub fn reset(&mut self) {
        self.buffer = 0;
        self.bits = 0;
        self.last_was_ff = false;
    }

    /// Append the low `count` bits of `value`, MSB first.
    pub fn put_bits(&mut self, writer: &mut ByteWriter, count: u8, value: i32) {
        debug_assert!(count <= 24);
        if count == 0 {
            return;
        }
        let mask = if count == 32 { !0u32 } else { (1u32 << count) - 1 };
        self.buffer = (self.buffer << count) | (value as u32 & mask);
        self.bits += count;
        self.drain(writer);
    }

    /// Emit completed bytes from the accumulator.
    fn drain(&mut self, writer: &mut ByteWriter) {
        loop {
            let width = if self.stuffing == Stuffing::JpegLs && self.last_was_ff {
                7
            } else {
                8
            };
            if self.bits < width {
                break;
            }
            let byte = ((self.buffer >> (self.bits - width)) & ((1 << width) - 1)) as u8;
            self.bits -= width;
            writer.put(byte);
            // a 7 bit payload always has a zero high bit, so it can
            // never be 0xFF itself
            if width == 8 && byte == 0xff {
                match self.stuffing {
                    Stuffing::Jpeg => writer.put(0x00),
                    Stuffing::JpegLs => self.last_was_ff = true,
                }
            } else {
                self.last_was_ff = false;
            }
        }
    }

    /// Complete the final byte and push it out. T.81 pads with one
    /// bits, T.87 with zero bits.
    pub fn flush(&mut self, writer: &mut ByteWriter) {
        let width = if self.stuffing == Stuffing::JpegLs && self.last_was_ff {
            7
        } else {
            8
        };
        if self.bits % width != 0 {
            let pad = width - (self.bits % width);
            let fill = match self.stuffing {
                Stuffing::Jpeg => (1 << pad) - 1,
                Stuffing::JpegLs => 0,
            };
            self.buffer = (self.buffer << pad) | fill;
            self.bits += pad;
        }
        self.drain(writer);
        debug_assert_eq!(self.bits, 0);
        self.last_was_ff = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_byte_stuffing_roundtrip() {
        let mut out = ByteWriter::new();
        let mut bw = BitWriter::new(Stuffing::Jpeg);
        // 0xFF 0x01 as raw bits
        bw.put_bits(&mut out, 8, 0xff);
        bw.put_bits(&mut out, 8, 0x01);
        bw.flush(&mut out);
        assert_eq!(out.as_slice(), &[0xff, 0x00, 0x01]);

        let bytes = out.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut br = BitReader::new(Stuffing::Jpeg);
        assert_eq!(br.get_bits(&mut reader, 8), 0xff);
        assert_eq!(br.get_bits(&mut reader, 8), 0x01);
    }

    #[test]
    fn jpegls_bit_stuffing_roundtrip() {
        let mut out = ByteWriter::new();
        let mut bw = BitWriter::new(Stuffing::JpegLs);
        bw.put_bits(&mut out, 8, 0xff);
        bw.put_bits(&mut out, 7, 0x55);
        bw.flush(&mut out);
        // second byte holds seven bits under a forced zero msb
        assert_eq!(out.as_slice(), &[0xff, 0x55]);

        let bytes = out.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let mut br = BitReader::new(Stuffing::JpegLs);
        assert_eq!(br.get_bits(&mut reader, 8), 0xff);
        assert_eq!(br.get_bits(&mut reader, 7), 0x55);
    }

    #[test]
    fn reader_stops_at_marker() {
        let data = [0b1010_0000, 0xff, 0xd0, 0x77];
        let mut reader = ByteReader::new(&data);
        let mut br = BitReader::new(Stuffing::Jpeg);
        assert_eq!(br.get_bits(&mut reader, 4), 0b1010);
        // the rest of the byte, then zeros once the marker is hit
        assert_eq!(br.get_bits(&mut reader, 4), 0);
        assert_eq!(br.get_bits(&mut reader, 8), 0);
        assert_eq!(br.marker, Some(Marker::RST(0)));
        // the marker stays in the byte stream
        br.align_to_reader(&mut reader);
        assert_eq!(reader.get(), Some(0xff));
        assert_eq!(reader.get(), Some(0xd0));
    }

    #[test]
    fn flush_pads_with_ones() {
        let mut out = ByteWriter::new();
        let mut bw = BitWriter::new(Stuffing::Jpeg);
        bw.put_bits(&mut out, 2, 0b10);
        bw.flush(&mut out);
        assert_eq!(out.as_slice(), &[0b1011_1111]);
    }
}
