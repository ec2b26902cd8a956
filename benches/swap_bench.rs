//! Criterion benchmarks for ghostmem hot paths.
//!
//! Run with: cargo bench
//! The codec and keystream groups are pure computation; the fault group
//! drives the real engine through the public API.

use std::sync::OnceLock;

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ghostmem::{GhostBuf, GhostConfig, PAGE_SIZE};

fn page_with(pattern: &str) -> Vec<u8> {
    match pattern {
        "constant" => vec![0xaa; PAGE_SIZE],
        "text" => {
            let text = b"The quick brown fox jumps over the lazy dog. ";
            (0..PAGE_SIZE).map(|i| text[i % text.len()]).collect()
        }
        _ => {
            // xorshift noise: the incompressible worst case
            let mut state = 0x9e3779b97f4a7c15u64;
            (0..PAGE_SIZE)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state & 0xff) as u8
                })
                .collect()
        }
    }
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress_page");
    for pattern in ["constant", "text", "random"] {
        let page = page_with(pattern);
        group.bench_with_input(BenchmarkId::from_parameter(pattern), &page, |b, page| {
            b.iter(|| black_box(lz4_flex::block::compress(page)));
        });
    }
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress_page");
    for pattern in ["constant", "text", "random"] {
        let blob = lz4_flex::block::compress(&page_with(pattern));
        group.bench_with_input(BenchmarkId::from_parameter(pattern), &blob, |b, blob| {
            b.iter(|| black_box(lz4_flex::block::decompress(blob, PAGE_SIZE).unwrap()));
        });
    }
    group.finish();
}

fn bench_keystream(c: &mut Criterion) {
    let key = [7u8; 32];
    let nonce = [3u8; 12];
    let mut page = page_with("text");

    c.bench_function("chacha20_page", |b| {
        b.iter(|| {
            let mut cipher = ChaCha20::new(&key.into(), &nonce.into());
            cipher.apply_keystream(&mut page);
            black_box(page[0]);
        });
    });
}

fn bench_fault_cycle(c: &mut Criterion) {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        ghostmem::init(GhostConfig::default()).expect("engine init");
    });

    // double the resident budget in pages: every sweep faults on every page
    let mut buf = GhostBuf::new(10 * PAGE_SIZE).unwrap();

    c.bench_function("freeze_thaw_sweep", |b| {
        b.iter(|| {
            for page in 0..10 {
                buf[page * PAGE_SIZE] = buf[page * PAGE_SIZE].wrapping_add(1);
            }
            black_box(buf[0]);
        });
    });
}

criterion_group!(
    benches,
    bench_compress,
    bench_decompress,
    bench_keystream,
    bench_fault_cycle
);
criterion_main!(benches);
