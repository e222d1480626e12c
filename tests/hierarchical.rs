//! Hierarchical (pyramidal) frames: DHP, EXP and differential frames
//! through the public codec API.

use omni_jpeg::{ColorSpace, Decoder, DecoderOptions, Encoder, EncoderOptions, SOFMarkers};

fn gray_decoder() -> Decoder {
    Decoder::new_with_options(DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE))
}

fn gradient(width: usize, height: usize) -> Vec<u8> {
    (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            ((x * 5 + y * 3) % 256) as u8
        })
        .collect()
}

#[test]
fn two_level_lossless_pyramid_is_bit_exact() {
    let (width, height) = (16, 16);
    let pixels = gradient(width, height);

    let options = EncoderOptions::new()
        .set_scan_type(SOFMarkers::LosslessHuffman)
        .set_levels(2);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    // DHP, EXP and a differential SOF7 frame are on the wire
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xde]));
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xdf]));
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xc7]));

    assert_eq!(gray_decoder().decode_buffer(&bytes).unwrap(), pixels);
}

#[test]
fn pyramid_matches_single_level_coding() {
    let (width, height) = (16, 16);
    let pixels = gradient(width, height);

    let mut flat = Encoder::new_with_options(
        EncoderOptions::new().set_scan_type(SOFMarkers::LosslessHuffman),
    );
    let flat_bytes = flat.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    let mut pyramid = Encoder::new_with_options(
        EncoderOptions::new()
            .set_scan_type(SOFMarkers::LosslessHuffman)
            .set_levels(2),
    );
    let pyramid_bytes = pyramid.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    // both roads reconstruct the identical image
    assert_eq!(
        gray_decoder().decode_buffer(&flat_bytes).unwrap(),
        gray_decoder().decode_buffer(&pyramid_bytes).unwrap()
    );
}

#[test]
fn three_level_arithmetic_pyramid_is_bit_exact() {
    let (width, height) = (21, 17); // odd sizes exercise the expansion edges
    let pixels = gradient(width, height);

    let options = EncoderOptions::new()
        .set_scan_type(SOFMarkers::LosslessArithmetic)
        .set_levels(3);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    assert_eq!(gray_decoder().decode_buffer(&bytes).unwrap(), pixels);
}

#[test]
fn hierarchical_dct_stays_within_the_lossy_bound() {
    let (width, height) = (32, 32);
    let pixels: Vec<u8> = (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            (128.0 + 60.0 * ((x as f32) * 0.2).sin() + 40.0 * ((y as f32) * 0.15).cos()) as u8
        })
        .collect();

    let options = EncoderOptions::new().set_quality(90).set_levels(2);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    let decoded = gray_decoder().decode_buffer(&bytes).unwrap();
    let worst = pixels
        .iter()
        .zip(decoded.iter())
        .map(|(a, b)| (i32::from(*a) - i32::from(*b)).abs())
        .max()
        .unwrap();
    assert!(worst <= 24, "error {worst} too large for quality 90");
}
