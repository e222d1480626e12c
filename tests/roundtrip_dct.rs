//! End to end round trips of the DCT based processes. Lossy paths
//! are checked against an error bound and for idempotence on the
//! coded form.

use omni_jpeg::{ColorSpace, Decoder, DecoderOptions, Encoder, EncoderOptions, SOFMarkers};

fn smooth_gray(width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let v = 128.0
                + 90.0 * ((x as f32) * 0.07).sin() * ((y as f32) * 0.05).cos();
            out.push(v.clamp(0.0, 255.0) as u8);
        }
    }
    out
}

fn max_error(a: &[u8], b: &[u8]) -> i32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (i32::from(*x) - i32::from(*y)).abs())
        .max()
        .unwrap_or(0)
}

fn gray_decoder() -> Decoder {
    Decoder::new_with_options(DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE))
}

#[test]
fn baseline_error_is_bounded() {
    let (width, height) = (64, 48);
    let pixels = smooth_gray(width, height);

    let options = EncoderOptions::new().set_quality(90);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();
    assert_eq!(&bytes[..2], &[0xff, 0xd8]);

    let decoded = gray_decoder().decode_buffer(&bytes).unwrap();
    assert_eq!(decoded.len(), pixels.len());
    assert!(
        max_error(&pixels, &decoded) <= 12,
        "error {} exceeds the quality-90 bound",
        max_error(&pixels, &decoded)
    );
}

#[test]
fn decoding_is_idempotent_on_the_coded_form() {
    let (width, height) = (40, 24);
    let pixels = smooth_gray(width, height);

    let mut encoder = Encoder::new_with_options(EncoderOptions::new().set_quality(75));
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();
    let once = gray_decoder().decode_buffer(&bytes).unwrap();

    // re-encoding the decode of the coded form and decoding again
    // must reproduce the first decode
    let mut encoder = Encoder::new_with_options(EncoderOptions::new().set_quality(75));
    let bytes2 = encoder.encode(&once, width, height, ColorSpace::GRAYSCALE).unwrap();
    let twice = gray_decoder().decode_buffer(&bytes2).unwrap();
    assert!(max_error(&once, &twice) <= 1);
}

#[test]
fn single_pixel_image() {
    let pixels = [128u8];
    let mut encoder = Encoder::new_with_options(EncoderOptions::new().set_quality(75));
    let bytes = encoder.encode(&pixels, 1, 1, ColorSpace::GRAYSCALE).unwrap();

    // SOI, JFIF, DQT, SOF, DHT, SOS ... EOI
    assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    assert_eq!(&bytes[bytes.len() - 2..], &[0xff, 0xd9]);

    let decoded = gray_decoder().decode_buffer(&bytes).unwrap();
    assert_eq!(decoded.len(), 1);
    assert!((i32::from(decoded[0]) - 128).abs() <= 4);
}

#[test]
fn color_with_subsampling_is_close() {
    let (width, height) = (32, 32);
    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            pixels.push((x * 8) as u8);
            pixels.push((y * 8) as u8);
            pixels.push(128u8);
        }
    }

    let options = EncoderOptions::new().set_quality(95).set_subsampling(2);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::RGB).unwrap();

    let mut decoder = Decoder::new();
    let decoded = decoder.decode_buffer(&bytes).unwrap();
    assert_eq!(decoded.len(), pixels.len());
    // chroma subsampling smears edges, luma-ish content stays close
    assert!(max_error(&pixels, &decoded) <= 48);
}

#[test]
fn progressive_matches_baseline_content() {
    let (width, height) = (48, 32);
    let pixels = smooth_gray(width, height);

    let mut baseline = Encoder::new_with_options(EncoderOptions::new().set_quality(85));
    let base_bytes = baseline.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();
    let base = gray_decoder().decode_buffer(&base_bytes).unwrap();

    let options = EncoderOptions::new()
        .set_quality(85)
        .set_scan_type(SOFMarkers::ProgressiveDctHuffman);
    let mut progressive = Encoder::new_with_options(options);
    let prog_bytes = progressive
        .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();
    let prog = gray_decoder().decode_buffer(&prog_bytes).unwrap();

    // identical coefficients travel both ways
    assert_eq!(base, prog);
}

#[test]
fn arithmetic_sequential_matches_huffman_sequential() {
    let (width, height) = (40, 16);
    let pixels = smooth_gray(width, height);

    let mut huffman = Encoder::new_with_options(EncoderOptions::new().set_quality(80));
    let huffman_bytes = huffman.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();
    let from_huffman = gray_decoder().decode_buffer(&huffman_bytes).unwrap();

    let options = EncoderOptions::new()
        .set_quality(80)
        .set_scan_type(SOFMarkers::ExtendedSequentialDctArithmetic);
    let mut arithmetic = Encoder::new_with_options(options);
    let arith_bytes = arithmetic
        .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();
    let from_arithmetic = gray_decoder().decode_buffer(&arith_bytes).unwrap();

    assert_eq!(from_huffman, from_arithmetic);
    // the arithmetic stream carries no DHT segment
    assert!(!arith_bytes.windows(2).any(|w| w == [0xff, 0xc4]));
}

#[test]
fn arithmetic_progressive_roundtrips() {
    let (width, height) = (32, 24);
    let pixels = smooth_gray(width, height);

    let options = EncoderOptions::new()
        .set_quality(85)
        .set_scan_type(SOFMarkers::ProgressiveDctArithmetic);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    let decoded = gray_decoder().decode_buffer(&bytes).unwrap();
    assert!(max_error(&pixels, &decoded) <= 16);
}

#[test]
fn optimized_huffman_tables_shrink_the_stream() {
    let (width, height) = (64, 64);
    let pixels = smooth_gray(width, height);

    let mut plain = Encoder::new_with_options(EncoderOptions::new().set_quality(75));
    let plain_bytes = plain.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    let mut optimized = Encoder::new_with_options(
        EncoderOptions::new().set_quality(75).set_optimize_huffman(true),
    );
    let optimized_bytes = optimized
        .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();

    // both decode to the same pixels
    assert_eq!(
        gray_decoder().decode_buffer(&plain_bytes).unwrap(),
        gray_decoder().decode_buffer(&optimized_bytes).unwrap()
    );
    assert!(optimized_bytes.len() <= plain_bytes.len());
}

#[test]
fn dct_restart_interval_roundtrips() {
    let (width, height) = (48, 24);
    let pixels = smooth_gray(width, height);

    let options = EncoderOptions::new().set_quality(85).set_restart_interval(3);
    let mut encoder = Encoder::new_with_options(options);
    let bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();
    assert!(bytes.windows(2).any(|w| w == [0xff, 0xd0]));

    let plain = Encoder::new_with_options(EncoderOptions::new().set_quality(85))
        .encode(&pixels, width, height, ColorSpace::GRAYSCALE)
        .unwrap();

    // restart markers change the framing, not the pixels
    assert_eq!(
        gray_decoder().decode_buffer(&bytes).unwrap(),
        gray_decoder().decode_buffer(&plain).unwrap()
    );
}
