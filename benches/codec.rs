use bytes::Bytes;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use smcp::protocol::{Command, Frame, FrameHeader, MAX_ELEMENTS, Options, SubBlock, decode, encode};

fn frame(values: usize, blocks: usize) -> Frame {
    let header = FrameHeader::new(
        5,
        600,
        42,
        Options::from_bits(Options::REQ | Options::REQ_ACK),
        Command::GotoPos.as_u16(),
    );
    let args: Vec<i32> = (0..values).map(|v| i32::try_from(v).unwrap() * 1000).collect();
    let mut frame = Frame::new(header);
    for _ in 0..blocks {
        frame = frame.with_block(SubBlock::int32(&args));
    }
    frame
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    // Header only
    let ack = frame(0, 0);
    group.throughput(Throughput::Bytes(ack.encoded_len() as u64));
    group.bench_function("encode_ack", |b| {
        b.iter(|| {
            black_box(encode(&ack).unwrap());
        });
    });

    // Typical goto: 7 arguments
    let goto = frame(7, 1);
    group.throughput(Throughput::Bytes(goto.encoded_len() as u64));
    group.bench_function("encode_goto", |b| {
        b.iter(|| {
            black_box(encode(&goto).unwrap());
        });
    });

    // Largest single block
    let full = frame(MAX_ELEMENTS, 1);
    group.throughput(Throughput::Bytes(full.encoded_len() as u64));
    group.bench_function("encode_full", |b| {
        b.iter(|| {
            black_box(encode(&full).unwrap());
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let goto: Bytes = encode(&frame(7, 1)).unwrap();
    group.throughput(Throughput::Bytes(goto.len() as u64));
    group.bench_function("decode_goto", |b| {
        b.iter(|| {
            black_box(decode(goto.clone()).unwrap());
        });
    });

    // Two blocks, as sent by goto with per-axis speeds
    let ext: Bytes = encode(&frame(4, 2)).unwrap();
    group.throughput(Throughput::Bytes(ext.len() as u64));
    group.bench_function("decode_two_blocks", |b| {
        b.iter(|| {
            black_box(decode(ext.clone()).unwrap());
        });
    });

    let full: Bytes = encode(&frame(MAX_ELEMENTS, 1)).unwrap();
    group.throughput(Throughput::Bytes(full.len() as u64));
    group.bench_function("decode_full", |b| {
        b.iter(|| {
            black_box(decode(full.clone()).unwrap());
        });
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let msg = frame(4, 1);
    group.throughput(Throughput::Bytes(msg.encoded_len() as u64));
    group.bench_function("roundtrip_positions", |b| {
        b.iter(|| {
            let encoded = encode(&msg).unwrap();
            let decoded = decode(encoded).unwrap();
            black_box(decoded);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_roundtrip);
criterion_main!(benches);
