//! Benchmarks for the jforex-ws codec
//!
//! Run with: cargo bench

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use jforex_ws::MAX_FRAME_SIZE;
use jforex_ws::frame::{OpCode, decode_frame, encode_frame};
use jforex_ws::mask::apply_mask;
use jforex_ws::protocol::Protocol;

/// Benchmark mask application
fn bench_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask");

    for size in [64, 256, 1024, 4096, 16384, 65536] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("apply_mask", size), &size, |b, &size| {
            let mut data = vec![0x42u8; size];
            let mask = [0x37, 0xfa, 0x21, 0x3d];

            b.iter(|| {
                apply_mask(black_box(&mut data), black_box(mask));
            });
        });
    }

    group.finish();
}

/// Benchmark frame decoding
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [8, 64, 256, 1024, 4096, 70000] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, OpCode::Text, &payload, None);

        let frame_data = buf.freeze();
        group.throughput(Throughput::Bytes(frame_data.len() as u64));

        group.bench_with_input(BenchmarkId::new("unmasked", size), &frame_data, |b, data| {
            b.iter(|| {
                let mut buf = BytesMut::from(data.as_ref());
                decode_frame(black_box(&mut buf))
            });
        });
    }

    group.finish();
}

/// Benchmark client frame encoding
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [8, 64, 256, 1024, 4096, 16384] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));

        let mask = [0x37, 0xfa, 0x21, 0x3d];
        group.bench_with_input(BenchmarkId::new("masked", size), &payload, |b, data| {
            let mut buf = BytesMut::with_capacity(size + 14);

            b.iter(|| {
                buf.clear();
                encode_frame(black_box(&mut buf), OpCode::Text, black_box(data), Some(mask));
            });
        });
    }

    group.finish();
}

/// Benchmark dispatch of a burst of small ticker messages
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    let tick = br#"{"instID":"EURUSD","bid":1.08412,"ask":1.08415,"ts":1700000000000}"#;
    let mut burst = BytesMut::new();
    for _ in 0..100 {
        encode_frame(&mut burst, OpCode::Text, tick, None);
    }
    let burst = burst.freeze();
    group.throughput(Throughput::Bytes(burst.len() as u64));

    group.bench_function("text_x100", |b| {
        let mut replies = BytesMut::new();
        b.iter(|| {
            let mut protocol = Protocol::new(burst.len(), MAX_FRAME_SIZE);
            protocol.extend(black_box(&burst));
            protocol.process(&mut replies).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_mask, bench_decode, bench_encode, bench_dispatch);

criterion_main!(benches);
