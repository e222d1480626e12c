//! The hierarchical line composer.
//!
//! A merger couples two resolution levels of one component: `low`, a
//! coarser reconstruction, and `high`, the differential at output
//! resolution. On decode every output line is the expanded low-pass
//! line plus the differential minus the DC offset the differential's
//! coding process put on it. On encode the same expansion produces
//! the reference that is subtracted from the full resolution input.
//!
//! Expansion is separable and 1-tap bilinear: horizontally a source
//! sample followed by its average with the right neighbour, the last
//! sample replicated; vertically the first needed line replicated,
//! then the average of the two bracketing source lines on odd output
//! lines.

use crate::lineadapter::LineAdapter;
use crate::upsampler::Plane;

pub struct LineMerger {
    expand_h: bool,
    expand_v: bool,
    /// The buffered low-pass line a vertical pair interpolates from.
    vbuffer:  Option<Vec<i32>>,
    /// Output line counter driving the vertical phase.
    y:        usize,
    /// Output width.
    width:    usize,
}

impl LineMerger {
    pub fn new(expand_h: bool, expand_v: bool, width: usize) -> LineMerger {
        LineMerger {
            expand_h,
            expand_v,
            vbuffer: None,
            y: 0,
            width,
        }
    }

    /// Pull one low-pass line and expand it horizontally if needed.
    fn next_lowpass_line(&mut self, low: &mut LineAdapter) -> Vec<i32> {
        let src = low.get_next_line();
        if !self.expand_h {
            let mut out = vec![0; self.width];
            let n = src.len().min(self.width);
            out[..n].copy_from_slice(&src[..n]);
            // replicate when the level is narrower than declared
            for x in n..self.width {
                out[x] = src[src.len() - 1];
            }
            low.drop_line(src);
            return out;
        }

        let mut out = vec![0; self.width];
        let last = src.len() - 1;
        for x in 0..self.width {
            let sx = (x / 2).min(last);
            out[x] = if x % 2 == 0 {
                src[sx]
            } else {
                let right = (sx + 1).min(last);
                (src[sx] + src[right]) >> 1
            };
        }
        low.drop_line(src);
        out
    }

    /// The next fully expanded low-pass line.
    pub fn next_expanded_line(&mut self, low: &mut LineAdapter) -> Vec<i32> {
        if !self.expand_v {
            self.y += 1;
            return self.next_lowpass_line(low);
        }

        // a fresh source line is needed for the first output line and
        // then before every odd output line
        if self.y == 0 {
            let line = self.next_lowpass_line(low);
            self.vbuffer = Some(line);
        } else if self.y % 2 == 1 {
            let next = self.next_lowpass_line(low);
            let prev = self.vbuffer.replace(next).expect("primed on line zero");
            let next_ref = self.vbuffer.as_ref().unwrap();
            let mut out = vec![0; self.width];
            for x in 0..self.width {
                out[x] = (prev[x] + next_ref[x]) >> 1;
            }
            self.y += 1;
            return out;
        }
        self.y += 1;
        self.vbuffer.clone().expect("primed on line zero")
    }

    /// Decode composition: output = expanded low + (high - offset).
    pub fn merge(&mut self, low: &mut LineAdapter, high: &mut LineAdapter) -> Plane {
        let width = self.width;
        let height = high.height();
        let shift = high.dc_offset();
        let mut out = Plane::new(width, height);

        self.y = 0;
        self.vbuffer = None;
        for y in 0..height {
            let reference = self.next_expanded_line(low);
            let differential = high.get_next_line();
            let row = out.row_mut(y);
            for x in 0..width {
                row[x] = reference[x] + differential[x] - shift;
            }
            high.drop_line(differential);
        }
        out
    }

    /// Encode composition: the differential the next level codes,
    /// `input - expanded(reconstructed low) + offset`.
    pub fn generate_differential(
        &mut self, input: &Plane, low: &mut LineAdapter, dc_offset: i32,
    ) -> Plane {
        let width = self.width;
        let height = input.height;
        let mut out = Plane::new(width, height);

        self.y = 0;
        self.vbuffer = None;
        for y in 0..height {
            let reference = self.next_expanded_line(low);
            let row = out.row_mut(y);
            let src = input.row(y);
            for x in 0..width {
                row[x] = src[x] - reference[x] + dc_offset;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_from(rows: &[&[i32]]) -> Plane {
        let mut p = Plane::new(rows[0].len(), rows.len());
        for (y, row) in rows.iter().enumerate() {
            p.row_mut(y).copy_from_slice(row);
        }
        p
    }

    #[test]
    fn expansion_matches_the_separable_filter() {
        let low = plane_from(&[&[10, 30], &[50, 70]]);
        let mut adapter = LineAdapter::for_reading(low, 0);
        let mut merger = LineMerger::new(true, true, 4);

        assert_eq!(merger.next_expanded_line(&mut adapter), vec![10, 20, 30, 30]);
        // odd line averages the bracketing source lines
        assert_eq!(merger.next_expanded_line(&mut adapter), vec![30, 40, 50, 50]);
        assert_eq!(merger.next_expanded_line(&mut adapter), vec![50, 60, 70, 70]);
        // beyond the last pair the source replicates
        assert_eq!(merger.next_expanded_line(&mut adapter), vec![50, 60, 70, 70]);
    }

    #[test]
    fn merge_then_differential_is_identity() {
        let full = plane_from(&[
            &[12, 34, 56, 78],
            &[21, 43, 65, 87],
            &[13, 35, 57, 79],
            &[31, 53, 75, 97],
        ]);
        let low = plane_from(&[&[12, 56], &[13, 57]]);

        // encode: differential against the expanded low level
        let mut low_adapter = LineAdapter::for_reading(low, 0);
        let mut merger = LineMerger::new(true, true, 4);
        let differential = merger.generate_differential(&full, &mut low_adapter, 0);

        // decode: merging the same levels restores the input
        low_adapter.reset();
        let mut high_adapter = LineAdapter::for_reading(differential, 0);
        let mut merger = LineMerger::new(true, true, 4);
        let merged = merger.merge(&mut low_adapter, &mut high_adapter);

        assert_eq!(merged.data, full.data);
    }
}
