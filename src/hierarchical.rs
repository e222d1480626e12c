//! Hierarchical (pyramidal) frame composition.
//!
//! A DHP segment opens the hierarchy; every following frame either
//! replaces the reference (non-differential) or refines it: an EXP
//! segment may double the reference first, then the differential
//! frame's samples are added through the line merger. The encoder
//! builds the pyramid by repeated 2x2 reduction and codes each level
//! against the expanded reconstruction of the previous one.

use crate::errors::{JpgError, JpgResult};
use crate::frame::Frame;
use crate::lineadapter::LineAdapter;
use crate::linemerger::LineMerger;
use crate::upsampler::{downsample, Plane};

/// Decoder-side state of a hierarchical image.
pub struct HierarchicalRequester {
    /// Reference planes per component, at the current level's size.
    reference:      Option<Vec<Plane>>,
    /// Expansion requested by an EXP segment for the next frame.
    pending_expand: Option<(bool, bool)>,
    /// Declared final dimensions from the DHP segment.
    pub width:      usize,
    pub height:     usize,
}

impl HierarchicalRequester {
    pub fn new(width: usize, height: usize) -> HierarchicalRequester {
        HierarchicalRequester {
            reference: None,
            pending_expand: None,
            width,
            height,
        }
    }

    /// Record an EXP segment; it applies to the next differential
    /// frame.
    pub fn expand_reference(&mut self, horizontal: bool, vertical: bool) {
        self.pending_expand = Some((horizontal, vertical));
    }

    /// Fold a finished frame into the hierarchy. `dc_offset` is the
    /// level shift the frame's coding process leaves on differential
    /// samples: the DCT processes carry `2^(P-1)`, the lossless ones
    /// zero.
    pub fn install_frame(
        &mut self, frame: &Frame, planes: Vec<Plane>, dc_offset: i32,
    ) -> JpgResult<()> {
        if !frame.sof.is_differential() {
            self.reference = Some(planes);
            self.pending_expand = None;
            return Ok(());
        }

        let reference = self.reference.take().ok_or_else(|| {
            JpgError::malformed(
                "HierarchicalRequester::install_frame",
                "differential frame without a reference frame",
            )
        })?;
        let (expand_h, expand_v) = self.pending_expand.take().unwrap_or((false, false));

        let mut merged = Vec::with_capacity(planes.len());
        for (low, high) in reference.into_iter().zip(planes.into_iter()) {
            let width = high.width;
            let mut low_adapter = LineAdapter::for_reading(low, 0);
            let mut high_adapter = LineAdapter::for_reading(high, dc_offset);
            let mut merger = LineMerger::new(expand_h, expand_v, width);
            merged.push(merger.merge(&mut low_adapter, &mut high_adapter));
        }
        self.reference = Some(merged);
        Ok(())
    }

    /// The fully composed planes at the end of the image.
    pub fn into_planes(self) -> JpgResult<Vec<Plane>> {
        self.reference.ok_or_else(|| {
            JpgError::malformed(
                "HierarchicalRequester::into_planes",
                "hierarchical stream carried no frames",
            )
        })
    }
}

/// Encoder-side pyramid of one component: planes from coarse to fine.
pub struct Pyramid {
    /// `levels[0]` is the full resolution input.
    pub levels: Vec<Plane>,
}

impl Pyramid {
    /// Build `count` levels by repeated 2x2 reduction.
    pub fn build(full: Plane, count: usize) -> Pyramid {
        let mut levels = vec![full];
        for _ in 1..count {
            let next = downsample(levels.last().unwrap(), 2, 2);
            levels.push(next);
        }
        Pyramid { levels }
    }

    /// The differential a level codes: its input minus the expanded
    /// reconstruction of the coarser level, plus the coding offset.
    pub fn differential_for_level(
        &self, level: usize, reconstruction: &Plane, dc_offset: i32,
    ) -> Plane {
        let input = &self.levels[level];
        let mut low = LineAdapter::for_reading(reconstruction.clone(), 0);
        let mut merger = LineMerger::new(true, true, input.width);
        merger.generate_differential(input, &mut low, dc_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::misc::SOFMarkers;

    fn plane(width: usize, height: usize, seed: i32) -> Plane {
        let mut p = Plane::new(width, height);
        for y in 0..height {
            for x in 0..width {
                p.row_mut(y)[x] = ((x as i32 * 13 + y as i32 * 29 + seed) % 256).abs();
            }
        }
        p
    }

    #[test]
    fn two_level_pyramid_reconstructs_losslessly() {
        let full = plane(16, 16, 3);
        let pyramid = Pyramid::build(full.clone(), 2);

        // lossless coding reproduces each level exactly, so the
        // reconstruction of the low level is the level itself
        let differential = pyramid.differential_for_level(0, &pyramid.levels[1], 0);

        // decoder side: install the low-pass, expand, add the
        // differential
        let mut requester = HierarchicalRequester::new(16, 16);
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        let low_frame =
            Frame::new(SOFMarkers::LosslessHuffman, 8, 8, 8, vec![c.clone()]).unwrap();
        requester
            .install_frame(&low_frame, vec![pyramid.levels[1].clone()], 0)
            .unwrap();
        requester.expand_reference(true, true);
        let diff_frame =
            Frame::new(SOFMarkers::DifferentialLosslessHuffman, 8, 16, 16, vec![c]).unwrap();
        requester
            .install_frame(&diff_frame, vec![differential], 0)
            .unwrap();

        let planes = requester.into_planes().unwrap();
        assert_eq!(planes[0].data, full.data);
    }
}
