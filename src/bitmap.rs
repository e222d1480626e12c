#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

//! Couples user bitmaps to the scan machinery: color transformation,
//! chroma sampling changes, MCU padding by edge replication, and the
//! final interleaving into caller-facing pixel rows.

use crate::color_convert::{rgb_to_ycbcr, ycbcr_to_rgb};
use crate::errors::{ErrorKind, JpgError, JpgResult};
use crate::frame::Frame;
use crate::linebuffer::LineBuffer;
use crate::misc::ColorSpace;
use crate::upsampler::{downsample, upsample, Plane};

/// Extract the reconstructed planes of a frame from its line buffer.
pub fn planes_from_lines(frame: &Frame, lines: &LineBuffer) -> Vec<Plane> {
    frame
        .components
        .iter()
        .map(|c| {
            let width = c.width_for(frame.width);
            let height = c.height_for(frame.height);
            let mut plane = Plane::new(width, height);
            let comp = lines.component(c.index);
            for y in 0..height {
                if y < comp.allocated() {
                    plane.row_mut(y).copy_from_slice(&comp.line(y)[..width]);
                }
            }
            plane
        })
        .collect()
}

/// Load component planes into a line buffer for the scan drivers,
/// replicating the rightmost column and bottom line across the MCU
/// padding.
pub fn planes_into_lines(frame: &Frame, planes: &[Plane], lines: &mut LineBuffer) {
    for (index, plane) in planes.iter().enumerate() {
        let comp = lines.component_mut(index);
        let padded = comp.padded;
        let height = plane.height;
        // whole MCU rows for interleaved predictive scans
        let cell = frame.components[index].vertical_sample;
        let rows = (height + cell - 1) / cell * cell;
        comp.ensure_rows(rows);
        for y in 0..rows {
            let source = plane.row(y.min(height - 1));
            let line = comp.line_mut(y);
            line[..source.len()].copy_from_slice(source);
            let edge = source[source.len() - 1];
            for x in source.len()..padded {
                line[x] = edge;
            }
        }
    }
}

/// Reconstruct sample planes from a frame's coefficient buffer.
pub fn planes_from_blocks(
    frame: &Frame, blocks: &crate::blockbuffer::BlockBuffer, tables: &crate::tables::Tables,
    clamp: bool,
) -> JpgResult<Vec<Plane>> {
    let mut planes = Vec::with_capacity(frame.components.len());
    for c in &frame.components {
        let quant = tables.quant_table(
            usize::from(c.quantization_table_number),
            "planes_from_blocks",
        )?;
        let width = c.width_for(frame.width);
        let height = c.height_for(frame.height);
        let mut plane = Plane::new(width, height);
        let comp = blocks.component(c.index);
        let mut block = [0i32; crate::misc::DCT_BLOCK];
        for row in 0..comp.rows {
            for column in 0..comp.blocks_per_line {
                crate::idct::dequantize_and_idct_block(
                    comp.block(row, column),
                    quant,
                    frame.precision,
                    clamp,
                    &mut block,
                );
                for by in 0..8 {
                    let y = row * 8 + by;
                    if y >= height {
                        break;
                    }
                    for bx in 0..8 {
                        let x = column * 8 + bx;
                        if x >= width {
                            break;
                        }
                        plane.row_mut(y)[x] = block[by * 8 + bx];
                    }
                }
            }
        }
        planes.push(plane);
    }
    Ok(planes)
}

/// Transform sample planes into quantized coefficients, padding edge
/// blocks by replication.
pub fn blocks_from_planes(
    frame: &Frame, planes: &[Plane], tables: &crate::tables::Tables,
) -> JpgResult<crate::blockbuffer::BlockBuffer> {
    let mut blocks = crate::blockbuffer::BlockBuffer::new(frame);
    for (index, c) in frame.components.iter().enumerate() {
        let quant = tables.quant_table(
            usize::from(c.quantization_table_number),
            "blocks_from_planes",
        )?;
        let plane = &planes[index];
        let comp = blocks.component_mut(index);
        let mut samples = [0i32; crate::misc::DCT_BLOCK];
        for row in 0..comp.rows {
            for column in 0..comp.blocks_per_line {
                for by in 0..8 {
                    let y = (row * 8 + by).min(plane.height.saturating_sub(1));
                    for bx in 0..8 {
                        let x = (column * 8 + bx).min(plane.width.saturating_sub(1));
                        samples[by * 8 + bx] = plane.row(y)[x];
                    }
                }
                crate::idct::forward_dct_quantize(
                    &samples,
                    quant,
                    frame.precision,
                    comp.block_mut(row, column),
                );
            }
        }
    }
    Ok(blocks)
}

/// Expand subsampled planes to the frame resolution.
pub fn upsample_planes(frame: &Frame, planes: &[Plane]) -> Vec<Plane> {
    frame
        .components
        .iter()
        .zip(planes.iter())
        .map(|(c, plane)| upsample(plane, c.sub_x, c.sub_y, frame.width, frame.height))
        .collect()
}

/// Interleave full-resolution planes into 8 bit pixels in the
/// requested colorspace. Precisions above 8 are scaled down; use
/// [`interleave_pixels16`] to keep them.
pub fn interleave_pixels(
    frame: &Frame, planes: &[Plane], out: ColorSpace, adobe_transform: Option<u8>,
) -> JpgResult<Vec<u8>> {
    let wide = interleave_pixels16(frame, planes, out, adobe_transform)?;
    let shift = frame.precision.saturating_sub(8);
    Ok(wide.iter().map(|v| (v >> shift) as u8).collect())
}

/// Interleave full-resolution planes into 16 bit pixels.
pub fn interleave_pixels16(
    frame: &Frame, planes: &[Plane], out: ColorSpace, adobe_transform: Option<u8>,
) -> JpgResult<Vec<u16>> {
    let width = frame.width;
    let height = frame.height;
    let channels = out.num_components();
    let max = (1i32 << frame.precision) - 1;
    let mut pixels = vec![0u16; width * height * channels];

    let clamp = |v: i32| v.clamp(0, max) as u16;

    match (planes.len(), out) {
        (1, ColorSpace::GRAYSCALE) => {
            for y in 0..height {
                let row = planes[0].row(y);
                for x in 0..width {
                    pixels[y * width + x] = clamp(row[x]);
                }
            }
        }
        (1, ColorSpace::RGB | ColorSpace::RGBA) => {
            for y in 0..height {
                let row = planes[0].row(y);
                for x in 0..width {
                    let at = (y * width + x) * channels;
                    let v = clamp(row[x]);
                    pixels[at] = v;
                    pixels[at + 1] = v;
                    pixels[at + 2] = v;
                    if channels == 4 {
                        pixels[at + 3] = max as u16;
                    }
                }
            }
        }
        (3, ColorSpace::YCbCr) => {
            for y in 0..height {
                for x in 0..width {
                    let at = (y * width + x) * 3;
                    pixels[at] = clamp(planes[0].row(y)[x]);
                    pixels[at + 1] = clamp(planes[1].row(y)[x]);
                    pixels[at + 2] = clamp(planes[2].row(y)[x]);
                }
            }
        }
        (3, ColorSpace::RGB | ColorSpace::RGBA) => {
            // Adobe transform 0 means the stream is RGB already; the
            // lossless processes code untransformed channels too
            let coded_rgb = adobe_transform == Some(0) || frame.sof.is_lossless();
            for y in 0..height {
                for x in 0..width {
                    let at = (y * width + x) * channels;
                    let (a, b, c) = (
                        planes[0].row(y)[x],
                        planes[1].row(y)[x],
                        planes[2].row(y)[x],
                    );
                    let (r, g, bl) = if coded_rgb {
                        (a, b, c)
                    } else {
                        ycbcr_to_rgb(a, b, c, frame.precision)
                    };
                    pixels[at] = clamp(r);
                    pixels[at + 1] = clamp(g);
                    pixels[at + 2] = clamp(bl);
                    if channels == 4 {
                        pixels[at + 3] = max as u16;
                    }
                }
            }
        }
        (3, ColorSpace::GRAYSCALE) => {
            for y in 0..height {
                let row = planes[0].row(y);
                for x in 0..width {
                    pixels[y * width + x] = clamp(row[x]);
                }
            }
        }
        (4, ColorSpace::CMYK) => {
            // YCCK streams (Adobe transform 2) convert the luma part
            let ycck = adobe_transform == Some(2);
            for y in 0..height {
                for x in 0..width {
                    let at = (y * width + x) * 4;
                    let (a, b, c) = (
                        planes[0].row(y)[x],
                        planes[1].row(y)[x],
                        planes[2].row(y)[x],
                    );
                    let (cy, m, yel) = if ycck {
                        ycbcr_to_rgb(a, b, c, frame.precision)
                    } else {
                        (a, b, c)
                    };
                    pixels[at] = clamp(cy);
                    pixels[at + 1] = clamp(m);
                    pixels[at + 2] = clamp(yel);
                    pixels[at + 3] = clamp(planes[3].row(y)[x]);
                }
            }
        }
        (n, space) => {
            return Err(JpgError::new(
                ErrorKind::NotImplemented,
                "interleave_pixels",
                format!("no conversion from {n} components to {space:?}"),
            ));
        }
    }
    Ok(pixels)
}

/// Split interleaved input pixels into coded-domain planes:
/// color-transform, then reduce subsampled components.
pub fn planes_from_pixels(
    frame: &Frame, pixels: &[u16], input: ColorSpace,
) -> JpgResult<Vec<Plane>> {
    let width = frame.width;
    let height = frame.height;
    let channels = input.num_components();
    if pixels.len() < width * height * channels {
        return Err(JpgError::new(
            ErrorKind::InvalidParameter,
            "planes_from_pixels",
            format!(
                "{}x{} {input:?} input needs {} samples, got {}",
                width,
                height,
                width * height * channels,
                pixels.len()
            ),
        ));
    }

    let components = frame.components.len();
    let mut full: Vec<Plane> = (0..components).map(|_| Plane::new(width, height)).collect();

    match (input, components) {
        (ColorSpace::GRAYSCALE, 1) => {
            for y in 0..height {
                for x in 0..width {
                    full[0].row_mut(y)[x] = i32::from(pixels[y * width + x]);
                }
            }
        }
        (ColorSpace::RGB | ColorSpace::RGBA, 3) => {
            for y in 0..height {
                for x in 0..width {
                    let at = (y * width + x) * channels;
                    let (yy, cb, cr) = rgb_to_ycbcr(
                        i32::from(pixels[at]),
                        i32::from(pixels[at + 1]),
                        i32::from(pixels[at + 2]),
                        frame.precision,
                    );
                    full[0].row_mut(y)[x] = yy;
                    full[1].row_mut(y)[x] = cb;
                    full[2].row_mut(y)[x] = cr;
                }
            }
        }
        (ColorSpace::YCbCr, 3) => {
            for y in 0..height {
                for x in 0..width {
                    let at = (y * width + x) * 3;
                    for c in 0..3 {
                        full[c].row_mut(y)[x] = i32::from(pixels[at + c]);
                    }
                }
            }
        }
        (ColorSpace::CMYK, 4) => {
            for y in 0..height {
                for x in 0..width {
                    let at = (y * width + x) * 4;
                    for c in 0..4 {
                        full[c].row_mut(y)[x] = i32::from(pixels[at + c]);
                    }
                }
            }
        }
        (space, n) => {
            return Err(JpgError::new(
                ErrorKind::InvalidParameter,
                "planes_from_pixels",
                format!("cannot code {space:?} input as {n} components"),
            ));
        }
    }

    // reduce subsampled components
    Ok(frame
        .components
        .iter()
        .zip(full.into_iter())
        .map(|(c, plane)| downsample(&plane, c.sub_x, c.sub_y))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Component;
    use crate::misc::SOFMarkers;

    #[test]
    fn grayscale_pixels_roundtrip_planes() {
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        let frame = Frame::new(SOFMarkers::BaselineDct, 8, 5, 3, vec![c]).unwrap();
        let pixels: Vec<u16> = (0..15).map(|v| v * 16).collect();

        let planes = planes_from_pixels(&frame, &pixels, ColorSpace::GRAYSCALE).unwrap();
        let back = interleave_pixels16(&frame, &planes, ColorSpace::GRAYSCALE, None).unwrap();
        assert_eq!(back, pixels);
    }

    #[test]
    fn rgb_color_roundtrip_is_close() {
        let comps = vec![
            Component::from([1, 0x11, 0], 0).unwrap(),
            Component::from([2, 0x11, 1], 1).unwrap(),
            Component::from([3, 0x11, 1], 2).unwrap(),
        ];
        let frame = Frame::new(SOFMarkers::BaselineDct, 8, 4, 2, vec![comps[0].clone(), comps[1].clone(), comps[2].clone()]).unwrap();
        let pixels: Vec<u16> = vec![
            250, 10, 10, 10, 250, 10, 10, 10, 250, 128, 128, 128, //
            0, 0, 0, 255, 255, 255, 40, 90, 160, 200, 150, 100,
        ];

        let planes = planes_from_pixels(&frame, &pixels, ColorSpace::RGB).unwrap();
        let back = interleave_pixels16(&frame, &planes, ColorSpace::RGB, None).unwrap();
        for (a, b) in pixels.iter().zip(back.iter()) {
            assert!((i32::from(*a) - i32::from(*b)).abs() <= 3, "{a} vs {b}");
        }
    }

    #[test]
    fn padding_replicates_the_edge() {
        let c = Component::from([1, 0x11, 0], 0).unwrap();
        let frame = Frame::new(SOFMarkers::LosslessHuffman, 8, 5, 2, vec![c]).unwrap();
        let mut plane = Plane::new(5, 2);
        plane.row_mut(0).copy_from_slice(&[1, 2, 3, 4, 5]);
        plane.row_mut(1).copy_from_slice(&[6, 7, 8, 9, 10]);

        let mut lines = LineBuffer::new(&frame);
        planes_into_lines(&frame, &[plane], &mut lines);
        let line = lines.component(0).line(0);
        assert_eq!(&line[..5], &[1, 2, 3, 4, 5]);
        assert!(line[5..].iter().all(|v| *v == 5));
    }
}
