use std::{io::Cursor, time::Duration};

use criterion::{criterion_group, criterion_main, Criterion};
use jpeg_recode::{BlockBasedImage, DecomposedJpeg, EnabledFeatures};

fn segment(marker: u8, body: &[u8]) -> Vec<u8> {
    let mut r = vec![0xFF, marker];
    r.extend_from_slice(&((body.len() + 2) as u16).to_be_bytes());
    r.extend_from_slice(body);
    r
}

/// 4:2:0 color header with flat 8 bit AC codes and a restart every 16 MCUs
fn color_header(width: u16, height: u16) -> Vec<u8> {
    let mut h = segment(0xDB, &[[0u8].as_slice(), &[1u8; 64]].concat());

    let mut frame = vec![8];
    frame.extend_from_slice(&height.to_be_bytes());
    frame.extend_from_slice(&width.to_be_bytes());
    frame.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 0, 3, 0x11, 0]);
    h.extend(segment(0xC0, &frame));

    let mut dc = vec![0x00];
    let mut counts = [0u8; 16];
    counts[3] = 12;
    dc.extend_from_slice(&counts);
    dc.extend(0..12u8);
    h.extend(segment(0xC4, &dc));

    let ac_symbols: Vec<u8> = (0..=255u8).filter(|x| x & 0xf <= 10).collect();
    let mut ac = vec![0x10];
    let mut counts = [0u8; 16];
    counts[7] = ac_symbols.len() as u8;
    ac.extend_from_slice(&counts);
    ac.extend_from_slice(&ac_symbols);
    h.extend(segment(0xC4, &ac));

    h.extend(segment(0xDD, &16u16.to_be_bytes()));
    h.extend(segment(0xDA, &[3, 1, 0x00, 2, 0x00, 3, 0x00, 0, 63, 0]));
    h
}

/// builds a 1024x768 jpeg with busy coefficients so there is plenty of entropy coded data
fn synthesize_jpeg() -> Vec<u8> {
    let raw = color_header(1024, 768);
    let features = EnabledFeatures::default();

    let probe = DecomposedJpeg::from_parts(
        raw.clone(),
        Vec::new(),
        None,
        Vec::new(),
        Vec::new(),
        &features,
    )
    .unwrap();

    let jh = probe.header();
    let mut seed = 0x1234_5678u32;
    let image_data = (0..jh.cmpc)
        .map(|i| {
            let ci = &jh.cmp_info[i];
            let blocks = (0..ci.bch * ci.bcv)
                .map(|_| {
                    let mut b = [0i16; 64];
                    for c in b.iter_mut().take(20) {
                        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                        *c = ((seed >> 16) % 201) as i16 - 100;
                    }
                    b
                })
                .collect();
            BlockBasedImage::from_blocks(ci.bch, ci.bcv, blocks)
        })
        .collect();

    let jpeg = DecomposedJpeg::from_parts(
        raw,
        vec![0xFF, 0xD9],
        None,
        Vec::new(),
        image_data,
        &features,
    )
    .unwrap();

    let mut output = Vec::new();
    jpeg_recode::recode_jpeg(&jpeg, &mut output, u64::MAX, &features).unwrap();
    output
}

fn end_to_end_benches(c: &mut Criterion) {
    let jpeg = synthesize_jpeg();
    let features = EnabledFeatures::default();
    let decomposed = jpeg_recode::read_jpeg(&mut Cursor::new(&jpeg), &features).unwrap();

    let mut container = Vec::new();
    jpeg_recode::encode_container(&jpeg, &mut container, &features).unwrap();

    c.bench_function("jpeg decompose", |b| {
        b.iter(|| jpeg_recode::read_jpeg(&mut Cursor::new(&jpeg), &features))
    });

    c.bench_function("jpeg recode", |b| {
        b.iter(|| {
            let mut output = Vec::with_capacity(jpeg.len());
            jpeg_recode::recode_jpeg(&decomposed, &mut output, u64::MAX, &features)
        })
    });

    c.bench_function("container decode", |b| {
        b.iter(|| {
            let mut output = Vec::with_capacity(jpeg.len());
            jpeg_recode::decode_container(&mut Cursor::new(&container), &mut output, &features)
        })
    });
}

criterion_group! {
   name = group1;
   config = Criterion::default().warm_up_time(Duration::from_secs(5));
   targets = end_to_end_benches
}

fn micro_benchmarks(c: &mut Criterion) {
    use jpeg_recode::micro_benchmark::{benchmark_byte_stuffing, benchmark_encode_block};

    c.bench_function("byte stuffing", |b| b.iter(benchmark_byte_stuffing()));

    c.bench_function("encode block", |b| b.iter(benchmark_encode_block()));
}

criterion_group!(group2, micro_benchmarks);

criterion_main!(group1, group2);
