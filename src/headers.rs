#![allow(clippy::cast_possible_truncation)]

//! Parse and serialize the marker segments of Annex B.
//!
//! Every parser takes the stream positioned just behind the two marker
//! bytes and consumes exactly the declared segment length; every
//! writer emits the marker bytes, the length and the payload.

use crate::bytestream::{ByteReader, ByteWriter};
use crate::components::Component;
use crate::errors::{ErrorKind, JpgError, JpgResult};
use crate::frame::{Frame, Scan};
use crate::huffman::HuffmanTemplate;
use crate::markers::Marker;
use crate::misc::SOFMarkers;
use crate::tables::{ACConditioning, LsColorTrafo, QuantizationTable, Tables, Thresholds};

/// Ancillary stream information gathered from APPn segments.
#[derive(Clone, Default)]
pub struct MiscInfo {
    /// JFIF density unit (0 aspect ratio, 1 dpi, 2 dpcm).
    pub density_unit: u8,
    pub x_density:    u16,
    pub y_density:    u16,
    /// The Adobe APP14 color transform byte, when present.
    pub adobe_transform: Option<u8>,
    /// Raw EXIF payload, passed through opaquely.
    pub exif:         Option<Vec<u8>>,
}

/// Read a segment length and return the payload byte count.
fn segment_length(reader: &mut ByteReader, method: &'static str) -> JpgResult<usize> {
    let length = reader.get_word(method)?;
    if length < 2 {
        return Err(JpgError::malformed(
            method,
            format!("segment length {length} is shorter than the length field itself"),
        ));
    }
    Ok(usize::from(length) - 2)
}

/// **B.2.4.1 Quantization table-specification syntax**
pub fn parse_dqt(tables: &mut Tables, reader: &mut ByteReader) -> JpgResult<()> {
    let mut remaining = segment_length(reader, "parse_dqt")?;

    // a single DQT segment may hold several tables
    while remaining > 0 {
        let qt_info = reader.get_err("parse_dqt")?;
        let precision = usize::from(qt_info >> 4);
        let position = usize::from(qt_info & 0x0f);

        if position > 3 {
            return Err(JpgError::malformed(
                "parse_dqt",
                format!("quantization table position {position}, expected 0..=3"),
            ));
        }
        if precision > 1 {
            return Err(JpgError::malformed(
                "parse_dqt",
                format!("quantization precision flag {precision}, expected 0 or 1"),
            ));
        }

        let payload = 64 * (precision + 1);
        if remaining < 1 + payload {
            return Err(JpgError::malformed(
                "parse_dqt",
                "quantization table runs past its segment",
            ));
        }

        let mut zigzag = [0u16; 64];
        if precision == 0 {
            for v in zigzag.iter_mut() {
                *v = u16::from(reader.get_err("parse_dqt")?);
            }
        } else {
            for v in zigzag.iter_mut() {
                *v = reader.get_word("parse_dqt")?;
            }
        }
        if zigzag.contains(&0) {
            return Err(JpgError::malformed(
                "parse_dqt",
                "quantization bucket of size zero",
            ));
        }

        tables.quant[position] = Some(QuantizationTable::from_zigzag(&zigzag, precision == 1));
        remaining -= 1 + payload;
    }
    Ok(())
}

/// Serialize the quantization tables in `indices`.
pub fn write_dqt(tables: &Tables, writer: &mut ByteWriter, indices: &[usize]) -> JpgResult<()> {
    let mut length = 2usize;
    for index in indices {
        let table = tables.quant_table(*index, "write_dqt")?;
        length += 1 + 64 * (usize::from(table.wide) + 1);
    }
    if length > 0xffff {
        return Err(JpgError::new(
            ErrorKind::OverflowParameter,
            "write_dqt",
            "DQT segment exceeds 64KB",
        ));
    }

    writer.put_word(0xff00 | u16::from(Marker::DQT.to_u8()));
    writer.put_word(length as u16);
    for index in indices {
        let table = tables.quant_table(*index, "write_dqt")?;
        writer.put((u8::from(table.wide) << 4) | (*index as u8 & 0x0f));
        for value in table.to_zigzag() {
            if table.wide {
                writer.put_word(value);
            } else {
                writer.put(value as u8);
            }
        }
    }
    Ok(())
}

/// **B.2.4.2 Huffman table-specification syntax**
pub fn parse_dht(tables: &mut Tables, reader: &mut ByteReader) -> JpgResult<()> {
    let mut remaining = segment_length(reader, "parse_dht")?;

    while remaining > 0 {
        let ht_info = reader.get_err("parse_dht")?;
        let is_ac = (ht_info >> 4) & 1 == 1;
        let index = usize::from(ht_info & 0x0f);

        if index > 3 || (ht_info >> 5) != 0 {
            return Err(JpgError::malformed(
                "parse_dht",
                format!("bad Huffman table class/destination byte {ht_info:#04x}"),
            ));
        }

        let mut counts = [0u8; 16];
        reader.read_exact(&mut counts, "parse_dht")?;

        let symbols_sum: usize = counts.iter().map(|c| usize::from(*c)).sum();
        if symbols_sum > 256 {
            return Err(JpgError::malformed(
                "parse_dht",
                "Huffman table with excessive length in DHT",
            ));
        }
        if remaining < 17 + symbols_sum {
            return Err(JpgError::malformed(
                "parse_dht",
                "Huffman table runs past its segment",
            ));
        }

        let mut values = vec![0u8; symbols_sum];
        reader.read_exact(&mut values, "parse_dht")?;
        remaining -= 17 + symbols_sum;

        let template = HuffmanTemplate::new(counts, values)?;
        if is_ac {
            tables.ac_huffman[index] = Some(template);
        } else {
            tables.dc_huffman[index] = Some(template);
        }
    }
    Ok(())
}

/// Serialize Huffman tables; `entries` holds `(is_ac, index)` pairs.
pub fn write_dht(tables: &Tables, writer: &mut ByteWriter, entries: &[(bool, usize)]) -> JpgResult<()> {
    let mut length = 2usize;
    for (is_ac, index) in entries {
        let template = if *is_ac {
            tables.ac_template(*index, "write_dht")?
        } else {
            tables.dc_template(*index, "write_dht")?
        };
        length += 17 + template.len();
    }
    if length > 0xffff {
        return Err(JpgError::new(
            ErrorKind::OverflowParameter,
            "write_dht",
            "DHT segment exceeds 64KB",
        ));
    }

    writer.put_word(0xff00 | u16::from(Marker::DHT.to_u8()));
    writer.put_word(length as u16);
    for (is_ac, index) in entries {
        let template = if *is_ac {
            tables.ac_template(*index, "write_dht")?
        } else {
            tables.dc_template(*index, "write_dht")?
        };
        writer.put((u8::from(*is_ac) << 4) | (*index as u8 & 0x0f));
        writer.put_slice(&template.counts);
        writer.put_slice(&template.values);
    }
    Ok(())
}

/// **B.2.4.3 Arithmetic conditioning table-specification syntax**
pub fn parse_dac(tables: &mut Tables, reader: &mut ByteReader) -> JpgResult<()> {
    let mut remaining = segment_length(reader, "parse_dac")?;

    while remaining >= 2 {
        let tc_tb = reader.get_err("parse_dac")?;
        let value = reader.get_err("parse_dac")?;
        remaining -= 2;

        let class = tc_tb >> 4;
        let index = usize::from(tc_tb & 0x0f);
        if index > 3 || class > 1 {
            return Err(JpgError::malformed(
                "parse_dac",
                format!("bad conditioning class/destination byte {tc_tb:#04x}"),
            ));
        }
        if class == 0 {
            tables.dc_conditioning[index] =
                Some(ACConditioning::dc(value & 0x0f, value >> 4)?);
        } else {
            tables.ac_conditioning[index] = Some(ACConditioning::ac(value)?);
        }
    }
    if remaining != 0 {
        return Err(JpgError::malformed(
            "parse_dac",
            "odd byte at the end of the DAC segment",
        ));
    }
    Ok(())
}

/// Serialize arithmetic conditioning; `dc`/`ac` hold table indices.
pub fn write_dac(tables: &Tables, writer: &mut ByteWriter, dc: &[usize], ac: &[usize]) {
    let length = 2 + 2 * (dc.len() + ac.len());
    writer.put_word(0xff00 | u16::from(Marker::DAC.to_u8()));
    writer.put_word(length as u16);
    for index in dc {
        let cond = tables.dc_conditioning_or_default(*index);
        writer.put(*index as u8 & 0x03);
        writer.put((cond.upper << 4) | cond.lower);
    }
    for index in ac {
        let cond = tables.ac_conditioning_or_default(*index);
        writer.put(0x10 | (*index as u8 & 0x03));
        writer.put(cond.kx);
    }
}

/// **B.2.4.4 Restart interval definition syntax**
pub fn parse_dri(tables: &mut Tables, reader: &mut ByteReader) -> JpgResult<()> {
    let remaining = segment_length(reader, "parse_dri")?;
    if remaining != 2 {
        return Err(JpgError::malformed(
            "parse_dri",
            format!("DRI payload must be two bytes, got {remaining}"),
        ));
    }
    tables.restart_interval = reader.get_word("parse_dri")?;
    trace!("restart interval {}", tables.restart_interval);
    Ok(())
}

pub fn write_dri(writer: &mut ByteWriter, interval: u16) {
    writer.put_word(0xff00 | u16::from(Marker::DRI.to_u8()));
    writer.put_word(4);
    writer.put_word(interval);
}

/// JPEG-LS preset parameters (LSE). Id 1 carries the coding
/// thresholds, id 0x0D the reversible color transform.
pub fn parse_lse(tables: &mut Tables, reader: &mut ByteReader) -> JpgResult<()> {
    let remaining = segment_length(reader, "parse_lse")?;
    if remaining < 1 {
        return Err(JpgError::malformed("parse_lse", "empty LSE segment"));
    }
    let id = reader.get_err("parse_lse")?;

    match id {
        1 => {
            if remaining != 11 {
                return Err(JpgError::malformed(
                    "parse_lse",
                    "LSE threshold marker length is invalid",
                ));
            }
            let max_val = reader.get_word("parse_lse")?;
            let t1 = reader.get_word("parse_lse")?;
            let t2 = reader.get_word("parse_lse")?;
            let t3 = reader.get_word("parse_lse")?;
            let reset = reader.get_word("parse_lse")?;
            if !(t1 <= t2 && t2 <= t3 && t3 <= max_val) {
                return Err(JpgError::malformed(
                    "parse_lse",
                    format!("thresholds must satisfy T1<=T2<=T3<=MAXVAL, got {t1},{t2},{t3},{max_val}"),
                ));
            }
            tables.thresholds = Some(Thresholds {
                max_val,
                t1,
                t2,
                t3,
                reset,
            });
        }
        0x0d => {
            if remaining < 4 {
                return Err(JpgError::malformed(
                    "parse_lse",
                    "LSE color transformation marker is too short",
                ));
            }
            let max_trans = reader.get_word("parse_lse")?;
            let depth = usize::from(reader.get_err("parse_lse")?);
            if depth == 0 {
                return Err(JpgError::malformed(
                    "parse_lse",
                    "LSE color transformation of zero components",
                ));
            }
            if remaining - 4 != 2 * depth * depth {
                return Err(JpgError::malformed(
                    "parse_lse",
                    "LSE color transformation marker length is invalid",
                ));
            }
            let mut trafo = LsColorTrafo {
                max_trans,
                ..LsColorTrafo::default()
            };
            for _ in 0..depth {
                trafo.labels.push(reader.get_err("parse_lse")?);
            }
            for _ in 0..depth {
                let v = reader.get_err("parse_lse")?;
                trafo.centered.push(v & 0x80 != 0);
                let shift = v & 0x7f;
                if shift > 32 {
                    return Err(JpgError::new(
                        ErrorKind::OverflowParameter,
                        "parse_lse",
                        "color transformation shift exceeds 32",
                    ));
                }
                trafo.shift.push(shift);
                for _ in 0..depth - 1 {
                    trafo.matrix.push(reader.get_word("parse_lse")?);
                }
            }
            tables.ls_color_trafo = Some(trafo);
        }
        _ => {
            return Err(JpgError::new(
                ErrorKind::NotImplemented,
                "parse_lse",
                format!("LSE marker id {id} (mapping tables) is not supported"),
            ));
        }
    }
    Ok(())
}

pub fn write_lse_thresholds(writer: &mut ByteWriter, t: &Thresholds) {
    writer.put_word(0xff00 | u16::from(Marker::LSE.to_u8()));
    writer.put_word(13);
    writer.put(1);
    writer.put_word(t.max_val);
    writer.put_word(t.t1);
    writer.put_word(t.t2);
    writer.put_word(t.t3);
    writer.put_word(t.reset);
}

/// **B.2.2 Frame header syntax**
pub fn parse_sof(reader: &mut ByteReader, sof: SOFMarkers) -> JpgResult<Frame> {
    let remaining = segment_length(reader, "parse_sof")?;

    let precision = reader.get_err("parse_sof")?;
    let height = usize::from(reader.get_word("parse_sof")?);
    let width = usize::from(reader.get_word("parse_sof")?);
    let num_components = usize::from(reader.get_err("parse_sof")?);

    debug!("frame {sof:?}: {width}x{height}, {precision} bits, {num_components} components");

    if remaining != 6 + 3 * num_components {
        return Err(JpgError::malformed(
            "parse_sof",
            format!(
                "frame header length {} does not match {} components",
                remaining + 2,
                num_components
            ),
        ));
    }

    let mut components = Vec::with_capacity(num_components);
    for index in 0..num_components {
        let mut bytes = [0u8; 3];
        reader.read_exact(&mut bytes, "parse_sof")?;
        components.push(Component::from(bytes, index)?);
    }

    Frame::new(sof, precision, width, height, components)
}

pub fn write_sof(writer: &mut ByteWriter, frame: &Frame) {
    writer.put_word(frame.sof.to_int());
    writer.put_word(8 + 3 * frame.components.len() as u16);
    writer.put(frame.precision);
    writer.put_word(frame.height as u16);
    writer.put_word(frame.width as u16);
    writer.put(frame.components.len() as u8);
    for c in &frame.components {
        writer.put(c.label);
        writer.put(((c.horizontal_sample as u8) << 4) | c.vertical_sample as u8);
        writer.put(c.quantization_table_number);
    }
}

/// **B.2.3 Scan header syntax**
pub fn parse_sos(reader: &mut ByteReader, frame: &mut Frame) -> JpgResult<Scan> {
    let remaining = segment_length(reader, "parse_sos")?;

    let ns = usize::from(reader.get_err("parse_sos")?);
    if remaining != 4 + 2 * ns {
        return Err(JpgError::malformed(
            "parse_sos",
            format!("scan header length {} does not match {ns} components", remaining + 2),
        ));
    }

    let mut scan = Scan {
        components:     Vec::with_capacity(ns),
        dc_table:       [0; 4],
        ac_table:       [0; 4],
        spectral_start: 0,
        spectral_end:   0,
        approx_high:    0,
        approx_low:     0,
    };

    for slot in 0..ns {
        let label = reader.get_err("parse_sos")?;
        let table_spec = reader.get_err("parse_sos")?;
        let index = frame.component_by_label(label).ok_or_else(|| {
            JpgError::malformed(
                "parse_sos",
                format!("scan references unknown component id {label}"),
            )
        })?;
        if scan.components.contains(&index) {
            return Err(JpgError::malformed(
                "parse_sos",
                format!("component id {label} appears twice in the scan"),
            ));
        }
        scan.components.push(index);
        scan.dc_table[slot] = usize::from(table_spec >> 4);
        scan.ac_table[slot] = usize::from(table_spec & 0x0f);
        frame.components[index].dc_huff_table = scan.dc_table[slot];
        frame.components[index].ac_huff_table = scan.ac_table[slot];
    }

    scan.spectral_start = reader.get_err("parse_sos")?;
    scan.spectral_end = reader.get_err("parse_sos")?;
    let approx = reader.get_err("parse_sos")?;
    scan.approx_high = approx >> 4;
    scan.approx_low = approx & 0x0f;

    scan.validate(frame)?;
    Ok(scan)
}

pub fn write_sos(writer: &mut ByteWriter, frame: &Frame, scan: &Scan) {
    writer.put_word(0xff00 | u16::from(Marker::SOS.to_u8()));
    writer.put_word(6 + 2 * scan.components.len() as u16);
    writer.put(scan.components.len() as u8);
    for (slot, index) in scan.components.iter().enumerate() {
        writer.put(frame.components[*index].label);
        writer.put(((scan.dc_table[slot] as u8) << 4) | scan.ac_table[slot] as u8);
    }
    writer.put(scan.spectral_start);
    writer.put(scan.spectral_end);
    writer.put((scan.approx_high << 4) | scan.approx_low);
}

/// **B.2.5 Define number of lines syntax**
pub fn parse_dnl(reader: &mut ByteReader) -> JpgResult<usize> {
    let remaining = segment_length(reader, "parse_dnl")?;
    if remaining != 2 {
        return Err(JpgError::malformed(
            "parse_dnl",
            format!("DNL payload must be two bytes, got {remaining}"),
        ));
    }
    Ok(usize::from(reader.get_word("parse_dnl")?))
}

pub fn write_dnl(writer: &mut ByteWriter, height: usize) {
    writer.put_word(0xff00 | u16::from(Marker::DNL.to_u8()));
    writer.put_word(4);
    writer.put_word(height as u16);
}

/// **B.3.3 Expand segment syntax** (hierarchical mode)
pub fn parse_exp(reader: &mut ByteReader) -> JpgResult<(bool, bool)> {
    let remaining = segment_length(reader, "parse_exp")?;
    if remaining != 1 {
        return Err(JpgError::malformed("parse_exp", "EXP payload must be one byte"));
    }
    let byte = reader.get_err("parse_exp")?;
    let eh = byte >> 4;
    let ev = byte & 0x0f;
    if eh > 1 || ev > 1 {
        return Err(JpgError::malformed(
            "parse_exp",
            "EXP may only expand by a factor of two",
        ));
    }
    Ok((eh == 1, ev == 1))
}

pub fn write_exp(writer: &mut ByteWriter, horizontal: bool, vertical: bool) {
    writer.put_word(0xff00 | u16::from(Marker::EXP.to_u8()));
    writer.put_word(3);
    writer.put((u8::from(horizontal) << 4) | u8::from(vertical));
}

/// Parse an application segment. JFIF and Adobe payloads update
/// `info`; EXIF is kept verbatim; everything else is skipped.
pub fn parse_app(
    reader: &mut ByteReader, index: u8, info: &mut MiscInfo,
) -> JpgResult<()> {
    let mut remaining = segment_length(reader, "parse_app")?;

    match index {
        0 => {
            // JFIF\0 header
            if remaining >= 14 {
                let mut magic = [0u8; 5];
                reader.read_exact(&mut magic, "parse_app")?;
                remaining -= 5;
                if &magic == b"JFIF\0" {
                    let _version = reader.get_word("parse_app")?;
                    info.density_unit = reader.get_err("parse_app")?;
                    info.x_density = reader.get_word("parse_app")?;
                    info.y_density = reader.get_word("parse_app")?;
                    remaining -= 7;
                }
            }
        }
        1 => {
            // EXIF rides in APP1 behind "Exif\0\0"
            if remaining >= 6 {
                let mut magic = [0u8; 6];
                reader.read_exact(&mut magic, "parse_app")?;
                remaining -= 6;
                if &magic == b"Exif\0\0" {
                    let mut payload = vec![0u8; remaining];
                    reader.read_exact(&mut payload, "parse_app")?;
                    remaining = 0;
                    info.exif = Some(payload);
                }
            }
        }
        14 => {
            // Adobe APP14 carries the color transform byte
            if remaining >= 12 {
                let mut magic = [0u8; 5];
                reader.read_exact(&mut magic, "parse_app")?;
                remaining -= 5;
                if &magic == b"Adobe" {
                    let _version = reader.get_word("parse_app")?;
                    let _flags0 = reader.get_word("parse_app")?;
                    let _flags1 = reader.get_word("parse_app")?;
                    info.adobe_transform = Some(reader.get_err("parse_app")?);
                    remaining -= 7;
                }
            }
        }
        _ => {
            trace!("skipping APP{index} segment of {remaining} bytes");
        }
    }

    reader.skip(remaining);
    Ok(())
}

/// Write the standard JFIF APP0 segment.
pub fn write_jfif(writer: &mut ByteWriter, info: &MiscInfo) {
    writer.put_word(0xff00 | u16::from(Marker::APP(0).to_u8()));
    writer.put_word(16);
    writer.put_slice(b"JFIF\0");
    writer.put_word(0x0102); // version 1.2
    writer.put(info.density_unit);
    writer.put_word(info.x_density.max(1));
    writer.put_word(info.y_density.max(1));
    writer.put(0); // no thumbnail
    writer.put(0);
}

/// Skip a marker segment whose content is irrelevant.
pub fn skip_segment(reader: &mut ByteReader) -> JpgResult<()> {
    let remaining = segment_length(reader, "skip_segment")?;
    if reader.remaining() < remaining {
        return Err(JpgError::eof("skip_segment"));
    }
    reader.skip(remaining);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dqt_roundtrip() {
        let mut tables = Tables::new();
        tables.quant[0] = Some(QuantizationTable::luma_for_quality(75));
        tables.quant[1] = Some(QuantizationTable::chroma_for_quality(75));

        let mut writer = ByteWriter::new();
        write_dqt(&tables, &mut writer, &[0, 1]).unwrap();

        let bytes = writer.into_inner();
        assert_eq!(&bytes[..2], &[0xff, 0xdb]);

        let mut parsed = Tables::new();
        let mut reader = ByteReader::new(&bytes[2..]);
        parse_dqt(&mut parsed, &mut reader).unwrap();

        assert_eq!(
            parsed.quant[0].as_ref().unwrap().values,
            tables.quant[0].as_ref().unwrap().values
        );
        assert_eq!(
            parsed.quant[1].as_ref().unwrap().values,
            tables.quant[1].as_ref().unwrap().values
        );
    }

    #[test]
    fn dht_roundtrip() {
        let mut tables = Tables::new();
        tables.dc_huffman[0] = Some(crate::huffman::default_luma_dc());
        tables.ac_huffman[0] = Some(crate::huffman::default_luma_ac());

        let mut writer = ByteWriter::new();
        write_dht(&tables, &mut writer, &[(false, 0), (true, 0)]).unwrap();

        let bytes = writer.into_inner();
        let mut parsed = Tables::new();
        let mut reader = ByteReader::new(&bytes[2..]);
        parse_dht(&mut parsed, &mut reader).unwrap();

        assert_eq!(
            parsed.dc_huffman[0].as_ref().unwrap().values,
            tables.dc_huffman[0].as_ref().unwrap().values
        );
        assert_eq!(
            parsed.ac_huffman[0].as_ref().unwrap().counts,
            tables.ac_huffman[0].as_ref().unwrap().counts
        );
    }

    #[test]
    fn dac_roundtrip() {
        let mut tables = Tables::new();
        tables.dc_conditioning[0] = Some(ACConditioning::dc(2, 5).unwrap());
        tables.ac_conditioning[1] = Some(ACConditioning::ac(17).unwrap());

        let mut writer = ByteWriter::new();
        write_dac(&tables, &mut writer, &[0], &[1]);

        let bytes = writer.into_inner();
        let mut parsed = Tables::new();
        let mut reader = ByteReader::new(&bytes[2..]);
        parse_dac(&mut parsed, &mut reader).unwrap();

        assert_eq!(parsed.dc_conditioning[0].unwrap().lower, 2);
        assert_eq!(parsed.dc_conditioning[0].unwrap().upper, 5);
        assert_eq!(parsed.ac_conditioning[1].unwrap().kx, 17);
    }

    #[test]
    fn sof_sos_roundtrip() {
        let components = vec![
            Component::from([1, 0x22, 0], 0).unwrap(),
            Component::from([2, 0x11, 1], 1).unwrap(),
            Component::from([3, 0x11, 1], 2).unwrap(),
        ];
        let frame = Frame::new(SOFMarkers::BaselineDct, 8, 99, 101, components).unwrap();

        let mut writer = ByteWriter::new();
        write_sof(&mut writer, &frame);
        let scan = Scan {
            components:     vec![0, 1, 2],
            dc_table:       [0, 1, 1, 0],
            ac_table:       [0, 1, 1, 0],
            spectral_start: 0,
            spectral_end:   63,
            approx_high:    0,
            approx_low:     0,
        };
        write_sos(&mut writer, &frame, &scan);

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes);
        let sof_word = reader.get_word("test").unwrap();
        let mut parsed = parse_sof(&mut reader, SOFMarkers::from_int(sof_word).unwrap()).unwrap();
        assert_eq!(parsed.width, 99);
        assert_eq!(parsed.height, 101);
        assert_eq!(parsed.h_max, 2);

        let sos_word = reader.get_word("test").unwrap();
        assert_eq!(sos_word, 0xffda);
        let parsed_scan = parse_sos(&mut reader, &mut parsed).unwrap();
        assert_eq!(parsed_scan.components, vec![0, 1, 2]);
        assert_eq!(parsed_scan.dc_table[1], 1);
        assert_eq!(parsed.components[1].dc_huff_table, 1);
    }

    #[test]
    fn lse_thresholds_roundtrip() {
        let t = Thresholds::for_precision(8, 2);
        let mut writer = ByteWriter::new();
        write_lse_thresholds(&mut writer, &t);

        let bytes = writer.into_inner();
        let mut tables = Tables::new();
        let mut reader = ByteReader::new(&bytes[2..]);
        parse_lse(&mut tables, &mut reader).unwrap();
        assert_eq!(tables.thresholds.unwrap(), t);
    }

    #[test]
    fn jfif_app0() {
        let mut writer = ByteWriter::new();
        let info = MiscInfo {
            x_density: 72,
            y_density: 72,
            density_unit: 1,
            ..MiscInfo::default()
        };
        write_jfif(&mut writer, &info);

        let bytes = writer.into_inner();
        let mut reader = ByteReader::new(&bytes[2..]);
        let mut parsed = MiscInfo::default();
        parse_app(&mut reader, 0, &mut parsed).unwrap();
        assert_eq!(parsed.x_density, 72);
        assert_eq!(parsed.density_unit, 1);
        assert_eq!(reader.remaining(), 0);
    }
}
