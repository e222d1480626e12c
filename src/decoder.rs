#![allow(clippy::cast_possible_truncation)]

//! The top level decoder: marker dispatch, frame lifecycle and the
//! post-processing pipeline from reconstructed planes to user pixels.

use crate::bitmap::{interleave_pixels, interleave_pixels16, planes_from_lines, upsample_planes};
use crate::blockbuffer::BlockBuffer;
use crate::bytestream::ByteReader;
use crate::errors::{ErrorKind, JpgError, JpgResult};
use crate::frame::Frame;
use crate::headers::{
    parse_app, parse_dac, parse_dht, parse_dnl, parse_dqt, parse_dri, parse_exp, parse_lse,
    parse_sof, parse_sos, skip_segment, MiscInfo,
};
use crate::hierarchical::HierarchicalRequester;
use crate::linebuffer::LineBuffer;
use crate::markers::Marker;
use crate::misc::{ColorSpace, SOFMarkers};
use crate::options::DecoderOptions;
use crate::scans::EntropyParser;
use crate::tables::Tables;
use crate::upsampler::Plane;

/// Image information gathered while decoding.
#[derive(Default, Clone, Eq, PartialEq)]
pub struct ImageInfo {
    /// Width of the image
    pub width:      usize,
    /// Height of the image
    pub height:     usize,
    /// Sample precision in bits
    pub precision:  u8,
    /// The coding process of the (last) frame
    pub sof:        SOFMarkers,
    /// Number of coded components
    pub components: usize,
    /// JFIF densities, when an APP0 was present
    pub x_density:  u16,
    pub y_density:  u16,
}

/// The state of the frame currently being decoded.
struct FrameState {
    frame:  Frame,
    lines:  LineBuffer,
    blocks: Option<BlockBuffer>,
}

/// A decoder instance.
pub struct Decoder {
    options: DecoderOptions,
    tables:  Tables,
    info:    ImageInfo,
    misc:    MiscInfo,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new()
    }
}

impl Decoder {
    /// Create a new decoder instance
    #[must_use]
    pub fn new() -> Decoder {
        Decoder::new_with_options(DecoderOptions::new())
    }

    #[must_use]
    pub fn new_with_options(options: DecoderOptions) -> Decoder {
        Decoder {
            options,
            tables: Tables::new(),
            info: ImageInfo::default(),
            misc: MiscInfo::default(),
        }
    }

    /// Returns the image information.
    ///
    /// Only meaningful after a successful decode.
    #[must_use]
    pub fn info(&self) -> Option<ImageInfo> {
        if self.info == ImageInfo::default() {
            return None;
        }
        Some(self.info.clone())
    }

    /// Decode a codestream already in memory into 8 bit pixels in the
    /// configured output colorspace. Precisions above 8 bits are
    /// scaled down; use [`decode_buffer_u16`](Self::decode_buffer_u16)
    /// to keep them.
    pub fn decode_buffer(&mut self, data: &[u8]) -> JpgResult<Vec<u8>> {
        let (frame, planes) = self.decode_planes(data)?;
        interleave_pixels(
            &frame,
            &planes,
            self.effective_out(&frame),
            self.misc.adobe_transform,
        )
    }

    /// Decode into 16 bit samples, keeping full precision.
    pub fn decode_buffer_u16(&mut self, data: &[u8]) -> JpgResult<Vec<u16>> {
        let (frame, planes) = self.decode_planes(data)?;
        interleave_pixels16(
            &frame,
            &planes,
            self.effective_out(&frame),
            self.misc.adobe_transform,
        )
    }

    /// Decode a codestream from a file.
    pub fn decode_file<P: AsRef<std::path::Path>>(&mut self, path: P) -> JpgResult<Vec<u8>> {
        let data = std::fs::read(path).map_err(|e| {
            JpgError::new(ErrorKind::InvalidParameter, "decode_file", e.to_string())
        })?;
        self.decode_buffer(&data)
    }

    /// Grayscale streams ignore a color output request; four
    /// component streams decode to CMYK.
    fn effective_out(&self, frame: &Frame) -> ColorSpace {
        match frame.components.len() {
            1 => {
                if self.options.out_colorspace == ColorSpace::GRAYSCALE {
                    ColorSpace::GRAYSCALE
                } else {
                    self.options.out_colorspace
                }
            }
            4 => ColorSpace::CMYK,
            _ => self.options.out_colorspace,
        }
    }

    /// The marker-dispatch main loop.
    fn decode_planes(&mut self, data: &[u8]) -> JpgResult<(Frame, Vec<Plane>)> {
        let mut reader = ByteReader::new(data);
        self.tables.strict = self.options.strict;

        let magic = reader.get_word("decode_planes")?;
        if magic != 0xffd8 {
            return Err(JpgError::malformed(
                "decode_planes",
                format!("illegal start bytes {magic:#06x}, expected the SOI marker"),
            ));
        }

        let mut state: Option<FrameState> = None;
        let mut hierarchy: Option<HierarchicalRequester> = None;
        let mut finished: Option<(Frame, Vec<Plane>)> = None;
        // the most recent frame header; a hierarchical image ends on
        // its full resolution differential frame
        let mut last_frame: Option<Frame> = None;

        loop {
            let marker = next_marker(&mut reader)?;
            match marker {
                Marker::SOI => {
                    return Err(JpgError::malformed(
                        "decode_planes",
                        "SOI marker in the middle of the stream",
                    ));
                }
                Marker::APP(n) => parse_app(&mut reader, n, &mut self.misc)?,
                Marker::COM => skip_segment(&mut reader)?,
                Marker::DQT => parse_dqt(&mut self.tables, &mut reader)?,
                Marker::DHT => parse_dht(&mut self.tables, &mut reader)?,
                Marker::DAC => parse_dac(&mut self.tables, &mut reader)?,
                Marker::DRI => parse_dri(&mut self.tables, &mut reader)?,
                Marker::LSE => parse_lse(&mut self.tables, &mut reader)?,
                Marker::DHP => {
                    if hierarchy.is_some() {
                        return Err(JpgError::malformed(
                            "decode_planes",
                            "second DHP segment in one image",
                        ));
                    }
                    // the DHP segment shares the frame header syntax;
                    // parse it under the widest precision rules
                    let shell = parse_sof(&mut reader, SOFMarkers::LosslessHuffman)?;
                    hierarchy =
                        Some(HierarchicalRequester::new(shell.width, shell.height));
                }
                Marker::EXP => {
                    let (h, v) = parse_exp(&mut reader)?;
                    match hierarchy.as_mut() {
                        Some(hierarchy) => {
                            // finish the pending frame first
                            if let Some(state) = state.take() {
                                let (frame, planes) = self.finish_frame(state)?;
                                let offset = differential_offset(&frame);
                                hierarchy.install_frame(&frame, planes, offset)?;
                                last_frame = Some(frame);
                            }
                            hierarchy.expand_reference(h, v);
                        }
                        None => {
                            return Err(JpgError::malformed(
                                "decode_planes",
                                "EXP segment outside a hierarchical image",
                            ));
                        }
                    }
                }
                Marker::SOF(id) => {
                    let sof_word = if id == 55 {
                        0xfff7
                    } else {
                        0xffc0 + u16::from(id)
                    };
                    let sof = SOFMarkers::from_int(sof_word).ok_or_else(|| {
                        JpgError::new(
                            ErrorKind::NotImplemented,
                            "decode_planes",
                            format!("unsupported frame type SOF{id}"),
                        )
                    })?;
                    if sof.is_differential() && hierarchy.is_none() {
                        return Err(JpgError::malformed(
                            "decode_planes",
                            "differential frame outside a hierarchical image",
                        ));
                    }
                    if let Some(state) = state.take() {
                        // a new frame closes the previous one
                        let (frame, planes) = self.finish_frame(state)?;
                        match hierarchy.as_mut() {
                            Some(hierarchy) => {
                                let offset = differential_offset(&frame);
                                hierarchy.install_frame(&frame, planes, offset)?;
                                last_frame = Some(frame);
                            }
                            None => finished = Some((frame, planes)),
                        }
                    }

                    let frame = parse_sof(&mut reader, sof)?;
                    if frame.width > self.options.max_width
                        || frame.height > self.options.max_height
                    {
                        return Err(JpgError::new(
                            ErrorKind::InvalidParameter,
                            "decode_planes",
                            format!(
                                "{}x{} exceeds the configured limit",
                                frame.width, frame.height
                            ),
                        ));
                    }

                    self.info = ImageInfo {
                        width:      frame.width,
                        height:     frame.height,
                        precision:  frame.precision,
                        sof:        frame.sof,
                        components: frame.components.len(),
                        x_density:  self.misc.x_density,
                        y_density:  self.misc.y_density,
                    };

                    let lines = LineBuffer::new(&frame);
                    let blocks = if frame.sof.is_lossless() {
                        None
                    } else {
                        Some(BlockBuffer::new(&frame))
                    };
                    state = Some(FrameState {
                        frame,
                        lines,
                        blocks,
                    });
                }
                Marker::SOS => {
                    let state = state.as_mut().ok_or_else(|| {
                        JpgError::malformed(
                            "decode_planes",
                            "scan header before any frame header",
                        )
                    })?;
                    let scan = parse_sos(&mut reader, &mut state.frame)?;
                    let mut parser =
                        EntropyParser::create(&state.frame, &scan, &self.tables);
                    trace!("scan over {} components", scan.components.len());

                    // a block buffer exists exactly for the DCT frames
                    let blocks = &mut state.blocks;

                    match &mut parser {
                        EntropyParser::Sequential(s) => s.parse_scan(
                            &mut reader,
                            &mut state.frame,
                            &self.tables,
                            need_blocks(blocks)?,
                        )?,
                        EntropyParser::Progressive(s) => s.parse_scan(
                            &mut reader,
                            &mut state.frame,
                            &self.tables,
                            need_blocks(blocks)?,
                        )?,
                        EntropyParser::ArithDct(s) => s.parse_scan(
                            &mut reader,
                            &mut state.frame,
                            &self.tables,
                            need_blocks(blocks)?,
                        )?,
                        EntropyParser::Lossless(s) => s.parse_scan(
                            &mut reader,
                            &mut state.frame,
                            &self.tables,
                            &mut state.lines,
                        )?,
                        EntropyParser::ArithLossless(s) => s.parse_scan(
                            &mut reader,
                            &mut state.frame,
                            &self.tables,
                            &mut state.lines,
                        )?,
                        EntropyParser::JpegLs(s) => s.parse_scan(
                            &mut reader,
                            &mut state.frame,
                            &self.tables,
                            &mut state.lines,
                        )?,
                    }

                    // the frame height may have been resolved by DNL
                    if self.info.height == 0 {
                        self.info.height = state.frame.height;
                    }
                }
                Marker::DNL => {
                    let state = state.as_mut().ok_or_else(|| {
                        JpgError::malformed("decode_planes", "DNL without a frame")
                    })?;
                    let height = parse_dnl(&mut reader)?;
                    if state.frame.height == 0 {
                        state.frame.resolve_height(height, "decode_planes")?;
                        state.lines.resolve_height(&state.frame);
                        self.info.height = height;
                    } else if state.frame.height != height {
                        warn!("DNL height disagrees with the frame header, keeping the header");
                    }
                }
                Marker::RST(_) => {
                    // a stray restart marker between segments
                    warn!("restart marker outside an entropy segment");
                }
                Marker::EOI => {
                    if let Some(state) = state.take() {
                        let (frame, planes) = self.finish_frame(state)?;
                        match hierarchy.as_mut() {
                            Some(hierarchy) => {
                                let offset = differential_offset(&frame);
                                hierarchy.install_frame(&frame, planes, offset)?;
                                last_frame = Some(frame);
                            }
                            None => finished = Some((frame, planes)),
                        }
                    }
                    break;
                }
            }
        }

        if let Some(hierarchy) = hierarchy {
            // the last frame of the pyramid has the output geometry
            let planes = hierarchy.into_planes()?;
            let frame = last_frame.ok_or_else(|| {
                JpgError::malformed(
                    "decode_planes",
                    "hierarchical stream carried no frame headers",
                )
            })?;
            let planes = upsample_planes(&frame, &planes);
            return Ok((frame, planes));
        }

        match finished {
            Some((frame, planes)) => {
                let planes = upsample_planes(&frame, &planes);
                Ok((frame, planes))
            }
            None => Err(JpgError::malformed(
                "decode_planes",
                "stream ended before any frame was decoded",
            )),
        }
    }

    /// Reconstruct sample planes from a finished frame.
    fn finish_frame(&mut self, state: FrameState) -> JpgResult<(Frame, Vec<Plane>)> {
        let FrameState {
            frame,
            lines,
            blocks,
        } = state;

        if frame.height == 0 {
            return Err(JpgError::malformed(
                "finish_frame",
                "frame height was never resolved by a DNL segment",
            ));
        }

        let mut planes = match blocks {
            Some(blocks) => {
                let clamp = !frame.sof.is_differential();
                crate::bitmap::planes_from_blocks(&frame, &blocks, &self.tables, clamp)?
            }
            None => planes_from_lines(&frame, &lines),
        };

        // undo a JPEG-LS reversible color transform, when announced
        if frame.sof == SOFMarkers::JpegLs && planes.len() > 1 {
            let uniform = planes
                .iter()
                .all(|p| p.width == planes[0].width && p.height == planes[0].height);
            if let (Some(trafo), true) = (&self.tables.ls_color_trafo, uniform) {
                for y in 0..planes[0].height.min(frame.height) {
                    let mut rows: Vec<&mut [i32]> =
                        planes.iter_mut().map(|p| p.row_mut(y)).collect();
                    crate::color_convert::ls_inverse_lines(trafo, &mut rows);
                }
            }
        }
        Ok((frame, planes))
    }

}

/// The coefficient buffer of a DCT frame, or a stream error for a
/// scan type that disagrees with its frame.
fn need_blocks(blocks: &mut Option<BlockBuffer>) -> JpgResult<&mut BlockBuffer> {
    blocks.as_mut().ok_or_else(|| {
        JpgError::malformed("decode_planes", "DCT scan inside a line based frame")
    })
}

/// The DC level a differential frame's samples carry.
fn differential_offset(frame: &Frame) -> i32 {
    if frame.sof.is_differential() && !frame.sof.is_lossless() {
        1 << (frame.precision - 1)
    } else {
        0
    }
}

/// Advance to the next marker, skipping fill bytes and logging any
/// garbage found in between.
fn next_marker(reader: &mut ByteReader) -> JpgResult<Marker> {
    let mut garbage = 0usize;
    loop {
        let byte = match reader.get() {
            Some(b) => b,
            None => return Err(JpgError::eof("next_marker")),
        };
        if byte != 0xff {
            garbage += 1;
            continue;
        }
        let mut id = match reader.get() {
            Some(b) => b,
            None => return Err(JpgError::eof("next_marker")),
        };
        while id == 0xff {
            // fill bytes collapse
            id = reader.get().ok_or_else(|| JpgError::eof("next_marker"))?;
        }
        if id == 0x00 || id == 0x01 {
            // stuffed zero or TEM, not a marker for us
            garbage += 2;
            continue;
        }
        if garbage > 0 {
            trace!("skipped {garbage} bytes before marker {id:#04x}");
        }
        match Marker::from_u8(id) {
            Some(marker) => return Ok(marker),
            None => {
                // an unknown but length-carrying segment
                warn!("skipping unknown marker {id:#04x}");
                skip_segment(reader)?;
                garbage = 0;
            }
        }
    }
}
