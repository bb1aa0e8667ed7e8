//! Criterion benchmarks for the Craft line codec.
//!
//! Measures stream reassembly and per-message decoding, which run once for
//! every line the server sends.
//!
//! Run with:
//! ```bash
//! cargo bench --package craft-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use craft_core::protocol::{decode_message, encode_message, Field, StreamDecoder};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const POSITION: &str = "U,1,2.0,3.0,4.0,5.0,6.0";
const BLOCK: &str = "B,0,0,12,-40,64,3";
const SIGN: &str = "S,0,0,12,-40,64,3,welcome, traveller";
const TEXT: &str = "T,alice> hello there";

fn world_burst(lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..lines {
        let line = match i % 4 {
            0 => POSITION,
            1 => BLOCK,
            2 => SIGN,
            _ => TEXT,
        };
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_decode_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_message");
    for (name, text) in [("position", POSITION), ("block", BLOCK), ("sign", SIGN), ("text", TEXT)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| decode_message(black_box(text)))
        });
    }
    group.finish();
}

fn bench_encode_message(c: &mut Criterion) {
    let fields = [Field::from("player"), Field::from("0123456789abcdef")];
    c.bench_function("encode_message/identify", |b| {
        b.iter(|| encode_message(black_box('A'), black_box(&fields)))
    });
}

fn bench_stream_reassembly(c: &mut Criterion) {
    let burst = world_burst(256);
    let mut group = c.benchmark_group("stream_reassembly");
    for chunk in [64usize, 1460, 16 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut decoder = StreamDecoder::new();
                let mut count = 0;
                for piece in burst.chunks(chunk) {
                    count += decoder.decode(black_box(piece)).len();
                }
                count
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode_message,
    bench_encode_message,
    bench_stream_reassembly
);
criterion_main!(benches);
