//! End to end round trips of the lossless predictive processes.

use omni_jpeg::{ColorSpace, Decoder, DecoderOptions, Encoder, EncoderOptions, SOFMarkers};

fn gray_ramp(width: usize, height: usize) -> Vec<u8> {
    (0..width * height).map(|i| (i % 256) as u8).collect()
}

fn textured(width: usize, height: usize, channels: usize) -> Vec<u8> {
    (0..width * height * channels)
        .map(|i| ((i * 31) ^ (i / 7)) as u8)
        .collect()
}

fn roundtrip_gray(sof: SOFMarkers, pixels: &[u8], width: usize, height: usize) -> Vec<u8> {
    let options = EncoderOptions::new().set_scan_type(sof).set_predictor(1);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder
        .encode(pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
    );
    let decoded = decoder.decode_buffer(&bytes).unwrap();
    let info = decoder.info().unwrap();
    assert_eq!(info.width, width);
    assert_eq!(info.height, height);
    decoded
}

#[test]
fn sof3_ramp_is_bit_exact() {
    // an 8x8 ramp with the Left predictor codes tiny differences
    let pixels: Vec<u8> = (0..64).collect();
    let decoded = roundtrip_gray(SOFMarkers::LosslessHuffman, &pixels, 8, 8);
    assert_eq!(decoded, pixels);
}

#[test]
fn sof3_textured_image_is_bit_exact() {
    let pixels = textured(47, 31, 1);
    let decoded = roundtrip_gray(SOFMarkers::LosslessHuffman, &pixels, 47, 31);
    assert_eq!(decoded, pixels);
}

#[test]
fn sof3_every_predictor_is_bit_exact() {
    let pixels = textured(23, 17, 1);
    for predictor in 1..=7 {
        let options = EncoderOptions::new()
            .set_scan_type(SOFMarkers::LosslessHuffman)
            .set_predictor(predictor);
        let mut encoder = Encoder::new_with_options(options);
        let bytes = encoder.encode(&pixels, 23, 17, ColorSpace::GRAYSCALE).unwrap();

        let mut decoder = Decoder::new_with_options(
            DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
        );
        assert_eq!(
            decoder.decode_buffer(&bytes).unwrap(),
            pixels,
            "predictor {predictor}"
        );
    }
}

#[test]
fn sof11_arithmetic_is_bit_exact() {
    let pixels = textured(33, 20, 1);
    let decoded = roundtrip_gray(SOFMarkers::LosslessArithmetic, &pixels, 33, 20);
    assert_eq!(decoded, pixels);
}

#[test]
fn lossless_rgb_keeps_every_channel() {
    let pixels = textured(19, 13, 3);
    let options = EncoderOptions::new().set_scan_type(SOFMarkers::LosslessHuffman);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, 19, 13, ColorSpace::RGB).unwrap();

    let mut decoder = Decoder::new();
    assert_eq!(decoder.decode_buffer(&bytes).unwrap(), pixels);
}

#[test]
fn restart_markers_do_not_change_the_result() {
    let pixels = textured(64, 16, 1);
    let options = EncoderOptions::new()
        .set_scan_type(SOFMarkers::LosslessHuffman)
        .set_restart_interval(64);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, 64, 16, ColorSpace::GRAYSCALE).unwrap();
    // restart markers are on the wire
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xd0]));

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
    );
    assert_eq!(decoder.decode_buffer(&bytes).unwrap(), pixels);
}

#[test]
fn point_transform_is_a_clean_shift() {
    let pixels = gray_ramp(16, 8);
    let options = EncoderOptions::new()
        .set_scan_type(SOFMarkers::LosslessHuffman)
        .set_point_transform(2);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, 16, 8, ColorSpace::GRAYSCALE).unwrap();

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
    );
    let decoded = decoder.decode_buffer(&bytes).unwrap();
    for (d, s) in decoded.iter().zip(pixels.iter()) {
        assert_eq!(*d, (s >> 2) << 2);
    }
}

#[test]
fn sixteen_bit_samples_survive() {
    let width = 21;
    let height = 9;
    let pixels: Vec<u16> = (0..width * height).map(|i| ((i * 9973) % 65536) as u16).collect();

    let options = EncoderOptions::new().set_scan_type(SOFMarkers::LosslessHuffman);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder
        .encode_u16(&pixels, width, height, ColorSpace::GRAYSCALE, 16)
        .unwrap();

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
    );
    assert_eq!(decoder.decode_buffer_u16(&bytes).unwrap(), pixels);
}

#[test]
fn deferred_height_resolves_through_dnl() {
    let pixels = textured(24, 11, 1);
    let options = EncoderOptions::new()
        .set_scan_type(SOFMarkers::LosslessHuffman)
        .set_deferred_height(true);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, 24, 11, ColorSpace::GRAYSCALE).unwrap();
    // a DNL segment is on the wire
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xdc]));

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
    );
    let decoded = decoder.decode_buffer(&bytes).unwrap();
    assert_eq!(decoder.info().unwrap().height, 11);
    assert_eq!(decoded, pixels);
}
