//! End to end JPEG-LS (T.87) coverage through the public codec API.

use omni_jpeg::{ColorSpace, Decoder, DecoderOptions, Encoder, EncoderOptions, SOFMarkers};

fn gray_decoder() -> Decoder {
    Decoder::new_with_options(DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE))
}

fn ls_encoder(near: u16) -> Encoder {
    Encoder::new_with_options(
        EncoderOptions::new()
            .set_scan_type(SOFMarkers::JpegLs)
            .set_near(near),
    )
}

/// A stand-in for a photographic test image: smooth areas, edges and
/// a noisy band, the three regimes the context modeler switches on.
fn synthetic_photo(width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let v = if y < height / 3 {
                (x * 255 / width) as u8
            } else if y < 2 * height / 3 {
                if x < width / 2 {
                    40
                } else {
                    200
                }
            } else {
                ((x * 97 + y * 61) % 251) as u8
            };
            out.push(v);
        }
    }
    out
}

#[test]
fn near_zero_is_bit_exact() {
    let (width, height) = (128, 96);
    let pixels = synthetic_photo(width, height);

    let bytes = ls_encoder(0)
        .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();
    // the JPEG-LS frame marker is on the wire
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xf7]));

    assert_eq!(gray_decoder().decode_buffer(&bytes).unwrap(), pixels);
}

#[test]
fn flat_image_compresses_to_runs() {
    let (width, height) = (256, 64);
    let pixels = vec![127u8; width * height];

    let bytes = ls_encoder(0)
        .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();
    // run mode squeezes a flat image far below one bit per pixel
    assert!(bytes.len() < width * height / 8);
    assert_eq!(gray_decoder().decode_buffer(&bytes).unwrap(), pixels);
}

#[test]
fn near_lossless_error_is_bounded() {
    let (width, height) = (64, 48);
    let pixels = synthetic_photo(width, height);

    for near in [1u16, 2, 4] {
        let bytes = ls_encoder(near)
            .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
            .unwrap();
        let decoded = gray_decoder().decode_buffer(&bytes).unwrap();
        for (d, s) in decoded.iter().zip(pixels.iter()) {
            assert!(
                (i32::from(*d) - i32::from(*s)).abs() <= i32::from(near),
                "near {near} violated"
            );
        }
    }
}

#[test]
fn color_line_interleaved_is_bit_exact() {
    let (width, height) = (40, 30);
    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x * 6) as u8);
            pixels.push((y * 8) as u8);
            pixels.push(((x + y) * 3) as u8);
        }
    }

    let bytes = ls_encoder(0).encode(&pixels, width, height, ColorSpace::RGB).unwrap();
    let mut decoder = Decoder::new();
    assert_eq!(decoder.decode_buffer(&bytes).unwrap(), pixels);
}

#[test]
fn custom_thresholds_ride_an_lse_segment() {
    let (width, height) = (32, 32);
    let pixels = synthetic_photo(width, height);

    let bytes = ls_encoder(2)
        .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();
    // near > 0 forces the preset parameters onto the wire
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xf8]));

    let decoded = gray_decoder().decode_buffer(&bytes).unwrap();
    assert_eq!(decoded.len(), pixels.len());
}
