//! Round trip timings for the two workhorse paths: baseline DCT and
//! lossless predictive coding.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use omni_jpeg::{ColorSpace, Decoder, DecoderOptions, Encoder, EncoderOptions, SOFMarkers};

fn synthetic(width: usize, height: usize) -> Vec<u8> {
    (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            (128.0 + 100.0 * ((x as f32) * 0.05).sin() * ((y as f32) * 0.03).cos()) as u8
        })
        .collect()
}

fn bench_baseline(c: &mut Criterion) {
    let (width, height) = (128, 128);
    let pixels = synthetic(width, height);

    c.bench_function("baseline encode+decode 128x128", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new_with_options(EncoderOptions::new().set_quality(80));
            let bytes = encoder
                .encode(black_box(&pixels), width, height, ColorSpace::GRAYSCALE)
                .unwrap();
            let mut decoder = Decoder::new_with_options(
                DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
            );
            black_box(decoder.decode_buffer(&bytes).unwrap())
        });
    });
}

fn bench_lossless(c: &mut Criterion) {
    let (width, height) = (128, 128);
    let pixels = synthetic(width, height);

    c.bench_function("lossless encode+decode 128x128", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new_with_options(
                EncoderOptions::new()
                    .set_scan_type(SOFMarkers::LosslessHuffman)
                    .set_predictor(4),
            );
            let bytes = encoder
                .encode(black_box(&pixels), width, height, ColorSpace::GRAYSCALE)
                .unwrap();
            let mut decoder = Decoder::new_with_options(
                DecoderOptions::new().set_out_colorspace(ColorSpace::GRAYSCALE),
            );
            black_box(decoder.decode_buffer(&bytes).unwrap())
        });
    });
}

criterion_group!(benches, bench_baseline, bench_lossless);
criterion_main!(benches);
