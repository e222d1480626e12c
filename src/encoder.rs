#![allow(clippy::cast_possible_truncation)]

//! The top level encoder: frame construction, marker emission and
//! scan scheduling for every supported coding process, including the
//! hierarchical pyramid.

use crate::bitmap::{blocks_from_planes, planes_from_blocks, planes_into_lines};
use crate::bytestream::ByteWriter;
use crate::components::Component;
use crate::errors::{ErrorKind, JpgError, JpgResult};
use crate::frame::{Frame, Scan};
use crate::headers::{
    write_dac, write_dht, write_dnl, write_dqt, write_dri, write_exp, write_jfif,
    write_lse_thresholds, write_sof, write_sos, MiscInfo,
};
use crate::hierarchical::Pyramid;
use crate::huffman::{
    default_chroma_ac, default_chroma_dc, default_luma_ac, default_luma_dc, HuffmanStatistics,
};
use crate::linebuffer::LineBuffer;
use crate::linemerger::LineMerger;
use crate::markers::Marker;
use crate::misc::{ColorSpace, SOFMarkers};
use crate::options::EncoderOptions;
use crate::scans::{
    AcLosslessScan, ArithDctScan, JpegLsScan, LosslessScan, ProgressiveScan, SequentialScan,
};
use crate::tables::{QuantizationTable, Tables, Thresholds};
use crate::upsampler::Plane;

/// An encoder instance.
pub struct Encoder {
    options: EncoderOptions,
    tables:  Tables,
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new()
    }
}

impl Encoder {
    #[must_use]
    pub fn new() -> Encoder {
        Encoder::new_with_options(EncoderOptions::new())
    }

    #[must_use]
    pub fn new_with_options(options: EncoderOptions) -> Encoder {
        Encoder {
            options,
            tables: Tables::new(),
        }
    }

    /// Encode 8 bit pixels.
    pub fn encode(
        &mut self, pixels: &[u8], width: usize, height: usize, colorspace: ColorSpace,
    ) -> JpgResult<Vec<u8>> {
        let wide: Vec<u16> = pixels.iter().map(|p| u16::from(*p)).collect();
        self.encode_u16(&wide, width, height, colorspace, 8)
    }

    /// Encode samples of 2..=16 bits.
    pub fn encode_u16(
        &mut self, pixels: &[u16], width: usize, height: usize, colorspace: ColorSpace,
        precision: u8,
    ) -> JpgResult<Vec<u8>> {
        let sof = self.options.sof;
        if sof.is_differential() {
            return Err(JpgError::new(
                ErrorKind::InvalidParameter,
                "encode_u16",
                "differential frames are produced by the hierarchical mode, not directly",
            ));
        }

        let frame = self.build_frame(sof, width, height, colorspace, precision)?;
        let planes = self.split_planes(&frame, pixels, colorspace)?;

        let mut writer = ByteWriter::new();
        writer.put_word(0xffd8); // SOI
        write_jfif(&mut writer, &MiscInfo::default());

        self.tables.restart_interval = self.options.restart_interval;

        if self.options.levels > 1 {
            self.encode_hierarchical(&mut writer, frame, planes)?;
        } else {
            self.install_quantization(&frame);
            if !sof.is_lossless() {
                let indices: Vec<usize> =
                    if frame.components.len() > 1 { vec![0, 1] } else { vec![0] };
                write_dqt(&self.tables, &mut writer, &indices)?;
            }
            if self.options.restart_interval > 0 {
                write_dri(&mut writer, self.options.restart_interval);
            }
            self.encode_frame(&mut writer, &frame, &planes)?;
        }

        writer.put_word(0xffd9); // EOI
        Ok(writer.into_inner())
    }

    /// Construct the frame that the chosen process codes.
    fn build_frame(
        &self, sof: SOFMarkers, width: usize, height: usize, colorspace: ColorSpace,
        precision: u8,
    ) -> JpgResult<Frame> {
        let color = colorspace != ColorSpace::GRAYSCALE;
        let subsample = if sof.is_lossless() || self.options.levels > 1 {
            1
        } else {
            usize::from(self.options.subsampling)
        };

        let components = if color {
            vec![
                Component::from([1, ((subsample as u8) << 4) | subsample as u8, 0], 0)?,
                Component::from([2, 0x11, 1], 1)?,
                Component::from([3, 0x11, 1], 2)?,
            ]
        } else {
            vec![Component::from([1, 0x11, 0], 0)?]
        };
        Frame::new(sof, precision, width, height, components)
    }

    /// Split and color-transform the input into component planes.
    /// Lossless processes keep RGB channels verbatim so the round
    /// trip stays bit exact.
    fn split_planes(
        &self, frame: &Frame, pixels: &[u16], colorspace: ColorSpace,
    ) -> JpgResult<Vec<Plane>> {
        let channels = colorspace.num_components();
        if pixels.len() < frame.width * frame.height * channels {
            return Err(JpgError::new(
                ErrorKind::InvalidParameter,
                "split_planes",
                "input buffer is smaller than width * height * channels",
            ));
        }

        if frame.sof.is_lossless() && colorspace != ColorSpace::GRAYSCALE {
            // raw channel split, no color transform
            let mut planes: Vec<Plane> = (0..frame.components.len())
                .map(|_| Plane::new(frame.width, frame.height))
                .collect();
            for y in 0..frame.height {
                for x in 0..frame.width {
                    let at = (y * frame.width + x) * channels;
                    for (c, plane) in planes.iter_mut().enumerate() {
                        plane.row_mut(y)[x] = i32::from(pixels[at + c.min(channels - 1)]);
                    }
                }
            }
            return Ok(planes);
        }

        crate::bitmap::planes_from_pixels(frame, pixels, colorspace)
    }

    fn install_quantization(&mut self, frame: &Frame) {
        if frame.sof.is_lossless() {
            return;
        }
        self.tables.quant[0] = Some(QuantizationTable::luma_for_quality(self.options.quality));
        if frame.components.len() > 1 {
            self.tables.quant[1] =
                Some(QuantizationTable::chroma_for_quality(self.options.quality));
        }
    }

    /// Table selectors of a scan: luma on slot 0, chroma on slot 1.
    fn scan_tables(frame: &Frame) -> ([usize; 4], [usize; 4]) {
        let mut dc = [0usize; 4];
        let mut ac = [0usize; 4];
        for i in 1..frame.components.len() {
            dc[i] = 1;
            ac[i] = 1;
        }
        (dc, ac)
    }

    /// Emit the frame header and its scans; returns the reconstructed
    /// planes when the process is lossy so hierarchical levels can
    /// reference them.
    fn encode_frame(
        &mut self, writer: &mut ByteWriter, frame: &Frame, planes: &[Plane],
    ) -> JpgResult<Option<Vec<Plane>>> {
        let deferred = self.options.deferred_height && !frame.sof.is_differential();

        // the frame header, possibly with a deferred height
        let mut header = frame.clone();
        if deferred {
            header.height = 0;
        }
        write_sof(writer, &header);

        let recon = match frame.sof {
            SOFMarkers::BaselineDct
            | SOFMarkers::ExtendedSequentialHuffman
            | SOFMarkers::DifferentialSequentialHuffman => {
                Some(self.encode_sequential(writer, frame, planes)?)
            }
            SOFMarkers::ProgressiveDctHuffman => {
                Some(self.encode_progressive(writer, frame, planes)?)
            }
            SOFMarkers::ExtendedSequentialDctArithmetic
            | SOFMarkers::DifferentialSequentialArithmetic => {
                Some(self.encode_arith_dct(writer, frame, planes, false)?)
            }
            SOFMarkers::ProgressiveDctArithmetic => {
                Some(self.encode_arith_dct(writer, frame, planes, true)?)
            }
            SOFMarkers::LosslessHuffman | SOFMarkers::DifferentialLosslessHuffman => {
                self.encode_lossless(writer, frame, planes)?;
                None
            }
            SOFMarkers::LosslessArithmetic
            | SOFMarkers::DifferentialLosslessArithmetic => {
                self.encode_aclossless(writer, frame, planes)?;
                None
            }
            SOFMarkers::JpegLs => {
                self.encode_jpegls(writer, frame, planes)?;
                None
            }
            _ => {
                return Err(JpgError::new(
                    ErrorKind::NotImplemented,
                    "encode_frame",
                    format!("no encoder for {:?}", frame.sof),
                ));
            }
        };

        if deferred {
            write_dnl(writer, frame.height);
        }
        Ok(recon)
    }

    fn encode_sequential(
        &mut self, writer: &mut ByteWriter, frame: &Frame, planes: &[Plane],
    ) -> JpgResult<Vec<Plane>> {
        let blocks = blocks_from_planes(frame, planes, &self.tables)?;
        let (dc, ac) = Self::scan_tables(frame);
        let scan = Scan {
            components: (0..frame.components.len()).collect(),
            dc_table: dc,
            ac_table: ac,
            spectral_start: 0,
            spectral_end: 63,
            approx_high: 0,
            approx_low: 0,
        };

        let mut driver = SequentialScan::new(
            frame,
            &scan,
            self.options.restart_interval,
            frame.sof.is_differential(),
        );

        // the Annex K default alphabets stop at the 8 bit categories,
        // so 12 bit frames always measure
        if self.options.optimize_huffman || frame.precision > 8 {
            let statistics = driver.measure_scan(&self.tables, &blocks);
            self.install_measured(frame, &scan, statistics)?;
        } else {
            self.install_default_huffman(frame);
        }

        let entries = Self::dht_entries(frame);
        write_dht(&self.tables, writer, &entries)?;
        write_sos(writer, frame, &scan);
        driver.write_scan(writer, &self.tables, &blocks)?;

        planes_from_blocks(frame, &blocks, &self.tables, !frame.sof.is_differential())
    }

    fn encode_progressive(
        &mut self, writer: &mut ByteWriter, frame: &Frame, planes: &[Plane],
    ) -> JpgResult<Vec<Plane>> {
        let blocks = blocks_from_planes(frame, planes, &self.tables)?;
        let (dc, ac) = Self::scan_tables(frame);

        self.install_default_huffman(frame);
        let entries = Self::dht_entries(frame);
        write_dht(&self.tables, writer, &entries)?;

        // DC of every component first, then each component's AC band
        // in two spectral halves, then one refinement bit each
        let mut scans: Vec<Scan> = Vec::new();
        scans.push(Scan {
            components: (0..frame.components.len()).collect(),
            dc_table: dc,
            ac_table: ac,
            spectral_start: 0,
            spectral_end: 0,
            approx_high: 0,
            approx_low: 1,
        });
        for comp in 0..frame.components.len() {
            for (ss, se) in [(1u8, 5u8), (6, 63)] {
                scans.push(Scan {
                    components: vec![comp],
                    dc_table: [dc[comp]; 4],
                    ac_table: [ac[comp]; 4],
                    spectral_start: ss,
                    spectral_end: se,
                    approx_high: 0,
                    approx_low: 1,
                });
            }
        }
        scans.push(Scan {
            components: (0..frame.components.len()).collect(),
            dc_table: dc,
            ac_table: ac,
            spectral_start: 0,
            spectral_end: 0,
            approx_high: 1,
            approx_low: 0,
        });
        for comp in 0..frame.components.len() {
            for (ss, se) in [(1u8, 5u8), (6, 63)] {
                scans.push(Scan {
                    components: vec![comp],
                    dc_table: [dc[comp]; 4],
                    ac_table: [ac[comp]; 4],
                    spectral_start: ss,
                    spectral_end: se,
                    approx_high: 1,
                    approx_low: 0,
                });
            }
        }

        for scan in &scans {
            write_sos(writer, frame, scan);
            let mut driver = ProgressiveScan::new(
                frame,
                scan,
                self.options.restart_interval,
                false,
            );
            driver.write_scan(writer, &self.tables, &blocks)?;
        }

        planes_from_blocks(frame, &blocks, &self.tables, true)
    }

    fn encode_arith_dct(
        &mut self, writer: &mut ByteWriter, frame: &Frame, planes: &[Plane],
        progressive: bool,
    ) -> JpgResult<Vec<Plane>> {
        let blocks = blocks_from_planes(frame, planes, &self.tables)?;
        let (dc, ac) = Self::scan_tables(frame);

        let tables_used = frame.components.len().min(2);
        let index_list: Vec<usize> = (0..tables_used).collect();
        write_dac(&self.tables, writer, &index_list, &index_list);

        if progressive {
            let mut scans: Vec<Scan> = vec![Scan {
                components: (0..frame.components.len()).collect(),
                dc_table: dc,
                ac_table: ac,
                spectral_start: 0,
                spectral_end: 0,
                approx_high: 0,
                approx_low: 1,
            }];
            for comp in 0..frame.components.len() {
                scans.push(Scan {
                    components: vec![comp],
                    dc_table: [dc[comp]; 4],
                    ac_table: [ac[comp]; 4],
                    spectral_start: 1,
                    spectral_end: 63,
                    approx_high: 0,
                    approx_low: 1,
                });
            }
            scans.push(Scan {
                components: (0..frame.components.len()).collect(),
                dc_table: dc,
                ac_table: ac,
                spectral_start: 0,
                spectral_end: 0,
                approx_high: 1,
                approx_low: 0,
            });
            for comp in 0..frame.components.len() {
                scans.push(Scan {
                    components: vec![comp],
                    dc_table: [dc[comp]; 4],
                    ac_table: [ac[comp]; 4],
                    spectral_start: 1,
                    spectral_end: 63,
                    approx_high: 1,
                    approx_low: 0,
                });
            }
            for scan in &scans {
                write_sos(writer, frame, scan);
                let mut driver = ArithDctScan::new(
                    frame,
                    scan,
                    self.options.restart_interval,
                    true,
                    false,
                );
                driver.write_scan(writer, &self.tables, &blocks)?;
            }
        } else {
            let scan = Scan {
                components: (0..frame.components.len()).collect(),
                dc_table: dc,
                ac_table: ac,
                spectral_start: 0,
                spectral_end: 63,
                approx_high: 0,
                approx_low: 0,
            };
            write_sos(writer, frame, &scan);
            let mut driver = ArithDctScan::new(
                frame,
                &scan,
                self.options.restart_interval,
                false,
                frame.sof.is_differential(),
            );
            driver.write_scan(writer, &self.tables, &blocks)?;
        }

        planes_from_blocks(frame, &blocks, &self.tables, !frame.sof.is_differential())
    }

    fn encode_lossless(
        &mut self, writer: &mut ByteWriter, frame: &Frame, planes: &[Plane],
    ) -> JpgResult<()> {
        let mut lines = LineBuffer::new(frame);
        planes_into_lines(frame, planes, &mut lines);

        let differential = frame.sof.is_differential();
        let scan = Scan {
            components: (0..frame.components.len()).collect(),
            dc_table: [0, 1, 2, 3],
            ac_table: [0; 4],
            spectral_start: if differential { 0 } else { self.options.predictor },
            spectral_end: 0,
            approx_high: 0,
            approx_low: self.options.point_transform,
        };

        let mut driver = LosslessScan::new(
            frame,
            &scan,
            self.options.restart_interval,
            differential,
        );

        // lossless tables are always measured, the default alphabets
        // carry no categories above eleven
        let statistics = driver.measure_scan(frame, &self.tables, &lines);
        let mut entries = Vec::new();
        for (slot, stats) in statistics.iter().enumerate() {
            self.tables.dc_huffman[scan.dc_table[slot]] = Some(stats.build_template()?);
            entries.push((false, scan.dc_table[slot]));
        }
        write_dht(&self.tables, writer, &entries)?;
        write_sos(writer, frame, &scan);
        driver.write_scan(writer, &self.tables, &lines)?;
        Ok(())
    }

    fn encode_aclossless(
        &mut self, writer: &mut ByteWriter, frame: &Frame, planes: &[Plane],
    ) -> JpgResult<()> {
        let mut lines = LineBuffer::new(frame);
        planes_into_lines(frame, planes, &mut lines);

        let differential = frame.sof.is_differential();
        let scan = Scan {
            components: (0..frame.components.len()).collect(),
            dc_table: [0; 4],
            ac_table: [0; 4],
            spectral_start: if differential { 0 } else { self.options.predictor },
            spectral_end: 0,
            approx_high: 0,
            approx_low: self.options.point_transform,
        };

        write_dac(&self.tables, writer, &[0], &[]);
        write_sos(writer, frame, &scan);
        let mut driver = AcLosslessScan::new(
            frame,
            &scan,
            self.options.restart_interval,
            differential,
        );
        driver.write_scan(writer, &self.tables, &lines)?;
        Ok(())
    }

    fn encode_jpegls(
        &mut self, writer: &mut ByteWriter, frame: &Frame, planes: &[Plane],
    ) -> JpgResult<()> {
        let mut lines = LineBuffer::new(frame);
        planes_into_lines(frame, planes, &mut lines);

        if self.options.near > 0 || self.tables.thresholds.is_some() {
            let thresholds = self
                .tables
                .thresholds
                .unwrap_or_else(|| Thresholds::for_precision(frame.precision, self.options.near));
            self.tables.thresholds = Some(thresholds);
            write_lse_thresholds(writer, &thresholds);
        }

        // color images interleave by line, grayscale codes plainly
        let interleave = if frame.components.len() > 1 { 1 } else { 0 };
        let scan = Scan {
            components: (0..frame.components.len()).collect(),
            dc_table: [0; 4],
            ac_table: [0; 4],
            spectral_start: self.options.near as u8,
            spectral_end: interleave,
            approx_high: 0,
            approx_low: self.options.point_transform,
        };

        write_sos(writer, frame, &scan);
        let mut frame_mut = frame.clone();
        let mut driver = JpegLsScan::new(frame, &scan, &self.tables);
        driver.write_scan(writer, &mut frame_mut, &self.tables, &mut lines)?;
        Ok(())
    }

    /// Install the Annex K default tables on the slots the frame uses.
    fn install_default_huffman(&mut self, frame: &Frame) {
        self.tables.dc_huffman[0] = Some(default_luma_dc());
        self.tables.ac_huffman[0] = Some(default_luma_ac());
        if frame.components.len() > 1 {
            self.tables.dc_huffman[1] = Some(default_chroma_dc());
            self.tables.ac_huffman[1] = Some(default_chroma_ac());
        }
    }

    /// Fold measured statistics into optimal tables on the scan's
    /// destination slots.
    fn install_measured(
        &mut self, frame: &Frame, scan: &Scan,
        statistics: Vec<(HuffmanStatistics, HuffmanStatistics)>,
    ) -> JpgResult<()> {
        let _ = frame;
        let mut dc_merged: [Option<HuffmanStatistics>; 4] = Default::default();
        let mut ac_merged: [Option<HuffmanStatistics>; 4] = Default::default();
        for (slot, (dc_stat, ac_stat)) in statistics.iter().enumerate() {
            let dc_index = scan.dc_table[slot];
            if let Some(merged) = &mut dc_merged[dc_index] {
                merged.merge(dc_stat);
            } else {
                dc_merged[dc_index] = Some(dc_stat.clone());
            }
            let ac_index = scan.ac_table[slot];
            if let Some(merged) = &mut ac_merged[ac_index] {
                merged.merge(ac_stat);
            } else {
                ac_merged[ac_index] = Some(ac_stat.clone());
            }
        }
        for (index, merged) in dc_merged.into_iter().enumerate() {
            if let Some(stats) = merged {
                self.tables.dc_huffman[index] = Some(stats.build_template()?);
            }
        }
        for (index, merged) in ac_merged.into_iter().enumerate() {
            if let Some(stats) = merged {
                self.tables.ac_huffman[index] = Some(stats.build_template()?);
            }
        }
        Ok(())
    }

    /// The DHT entries a frame's scans reference.
    fn dht_entries(frame: &Frame) -> Vec<(bool, usize)> {
        let mut entries = vec![(false, 0), (true, 0)];
        if frame.components.len() > 1 {
            entries.push((false, 1));
            entries.push((true, 1));
        }
        entries
    }

    /// Hierarchical pyramid: a coarse base frame followed by
    /// differential refinements, each preceded by an EXP segment.
    fn encode_hierarchical(
        &mut self, writer: &mut ByteWriter, frame: Frame, planes: Vec<Plane>,
    ) -> JpgResult<()> {
        let base_sof = frame.sof;
        let differential_sof = match base_sof {
            SOFMarkers::LosslessHuffman => SOFMarkers::DifferentialLosslessHuffman,
            SOFMarkers::LosslessArithmetic => SOFMarkers::DifferentialLosslessArithmetic,
            SOFMarkers::BaselineDct | SOFMarkers::ExtendedSequentialHuffman => {
                SOFMarkers::DifferentialSequentialHuffman
            }
            SOFMarkers::ExtendedSequentialDctArithmetic => {
                SOFMarkers::DifferentialSequentialArithmetic
            }
            other => {
                return Err(JpgError::new(
                    ErrorKind::NotImplemented,
                    "encode_hierarchical",
                    format!("no hierarchical mode for {other:?}"),
                ));
            }
        };

        let levels = usize::from(self.options.levels);
        self.install_quantization(&frame);
        if !base_sof.is_lossless() {
            let indices: Vec<usize> =
                if frame.components.len() > 1 { vec![0, 1] } else { vec![0] };
            write_dqt(&self.tables, writer, &indices)?;
        }
        if self.options.restart_interval > 0 {
            write_dri(writer, self.options.restart_interval);
        }

        // DHP: the frame header syntax under its own marker
        writer.put_word(0xff00 | u16::from(Marker::DHP.to_u8()));
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

        let pyramids: Vec<Pyramid> = planes
            .into_iter()
            .map(|plane| Pyramid::build(plane, levels))
            .collect();

        // base frame at the coarsest level
        let coarse = levels - 1;
        let base_planes: Vec<Plane> =
            pyramids.iter().map(|p| p.levels[coarse].clone()).collect();
        let base_frame = self.level_frame(&frame, base_sof, coarse)?;
        let recon = self.encode_frame(writer, &base_frame, &base_planes)?;
        let mut reference: Vec<Plane> = match recon {
            Some(recon) => recon,
            None => base_planes,
        };

        // refinements, finest last
        for level in (0..coarse).rev() {
            write_exp(writer, true, true);
            let offset = if base_sof.is_lossless() {
                0
            } else {
                1 << (frame.precision - 1)
            };
            let diff_frame = self.level_frame(&frame, differential_sof, level)?;
            let mut diff_planes = Vec::with_capacity(pyramids.len());
            for (pyramid, low) in pyramids.iter().zip(reference.iter()) {
                diff_planes.push(pyramid.differential_for_level(level, low, offset));
            }
            let recon = self.encode_frame(writer, &diff_frame, &diff_planes)?;

            // reconstruct this level for the next refinement
            let mut next_reference = Vec::with_capacity(pyramids.len());
            for (index, low) in reference.iter().enumerate() {
                let target = &pyramids[index].levels[level];
                let decoded_diff = match &recon {
                    Some(recon) => recon[index].clone(),
                    None => diff_planes[index].clone(),
                };
                let mut low_adapter =
                    crate::lineadapter::LineAdapter::for_reading(low.clone(), 0);
                let mut high_adapter =
                    crate::lineadapter::LineAdapter::for_reading(decoded_diff, offset);
                let mut merger = LineMerger::new(true, true, target.width);
                next_reference.push(merger.merge(&mut low_adapter, &mut high_adapter));
            }
            reference = next_reference;
        }
        Ok(())
    }

    /// The frame describing one pyramid level.
    fn level_frame(&self, full: &Frame, sof: SOFMarkers, level: usize) -> JpgResult<Frame> {
        let mut width = full.width;
        let mut height = full.height;
        for _ in 0..level {
            width = (width + 1) / 2;
            height = (height + 1) / 2;
        }
        let components = full
            .components
            .iter()
            .map(|c| Component {
                dc_huff_table: 0,
                ac_huff_table: 0,
                ..c.clone()
            })
            .collect();
        Frame::new(sof, full.precision, width, height, components)
    }
}
