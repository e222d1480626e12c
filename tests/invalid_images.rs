//! Damaged and malformed inputs must fail cleanly, and entropy-level
//! damage inside a restart interval must stay local.

use omni_jpeg::{
    ColorSpace, Decoder, DecoderOptions, Encoder, EncoderOptions, ErrorKind, SOFMarkers,
};

fn gray_decoder() -> Decoder {
    Decoder::new_with_options(DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE))
}

#[test]
fn empty_input_is_an_error() {
    assert!(gray_decoder().decode_buffer(&[]).is_err());
}

#[test]
fn wrong_magic_is_an_error() {
    let err = gray_decoder().decode_buffer(b"PNG\r\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedStream);
}

#[test]
fn truncation_does_not_panic() {
    let pixels: Vec<u8> = (0..64u8).collect();
    let mut encoder = Encoder::new_with_options(
        EncoderOptions::new().set_scan_type(SOFMarkers::LosslessHuffman),
    );
    let bytes = encoder.encode(&pixels, 8, 8, ColorSpace::GRAYSCALE).unwrap();

    // every prefix either errors out or produces some pixels, never
    // a panic
    for cut in 0..bytes.len() {
        let _ = gray_decoder().decode_buffer(&bytes[..cut]);
    }
}

#[test]
fn oversized_dimensions_are_rejected() {
    let pixels = vec![0u8; 32 * 32];
    let mut encoder = Encoder::new();
    let bytes = encoder.encode(&pixels, 32, 32, ColorSpace::GRAYSCALE).unwrap();

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new()
            .set_out_colorspace(ColorSpace::GRAYSCALE)
            .set_max_dimensions(16, 16),
    );
    let err = decoder.decode_buffer(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

#[test]
fn bad_table_reference_is_detected() {
    // a scan referencing a Huffman table that was never installed
    let pixels = vec![10u8; 64];
    let mut encoder = Encoder::new();
    let mut bytes = encoder.encode(&pixels, 8, 8, ColorSpace::GRAYSCALE).unwrap();

    // strip the DHT segment (FFC4 len ...) out of the stream
    let dht = bytes
        .windows(2)
        .position(|w| w == [0xff, 0xc4])
        .expect("a baseline stream carries a DHT");
    let length = usize::from(bytes[dht + 2]) << 8 | usize::from(bytes[dht + 3]);
    bytes.drain(dht..dht + 2 + length);

    let err = gray_decoder().decode_buffer(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectDoesntExist);
}

#[test]
fn corrupt_restart_interval_damages_only_itself() {
    // an arithmetic lossless scan over a 64x16 image, one restart
    // marker every 16 MCUs
    let (width, height) = (64usize, 16usize);
    let pixels: Vec<u8> = (0..width * height)
        .map(|i| ((i * 7) % 256) as u8)
        .collect();

    let options = EncoderOptions::new()
        .set_scan_type(SOFMarkers::LosslessArithmetic)
        .set_restart_interval(16);
    let mut encoder = Encoder::new_with_options(options);
    let mut bytes = encoder.encode(&pixels, width, height, ColorSpace::GRAYSCALE).unwrap();

    // zero the entropy bytes of the interval that ends the first
    // line: the bytes between RST2 and RST3. The next interval opens
    // a fresh line, so prediction there starts from the neutral value
    // and the damage cannot leak past the marker.
    let rst2 = bytes
        .windows(2)
        .position(|w| w == [0xff, 0xd2])
        .expect("restart marker 2");
    let rst3 = bytes
        .windows(2)
        .position(|w| w == [0xff, 0xd3])
        .expect("restart marker 3");
    for b in &mut bytes[rst2 + 2..rst3] {
        *b = 0;
    }

    let decoded = gray_decoder().decode_buffer(&bytes).unwrap();

    // everything before the corrupted interval and every line after
    // it decodes bit identically; only samples 48..64 of row 0 are up
    // for grabs
    assert_eq!(decoded[..48], pixels[..48]);
    assert_eq!(decoded[64..], pixels[64..]);
}
