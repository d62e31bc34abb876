#![allow(clippy::unwrap_used, clippy::uninlined_format_args)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use packet_pipeline::utils::compression::{
    compress, decompress, CompressionAlgorithm, CompressionLevel,
};

fn game_like_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i % 64) as u8) ^ ((i / 512) as u8)).collect()
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");
    let sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &sizes {
        let data = game_like_data(size);
        group.throughput(Throughput::Bytes(size as u64));

        for algorithm in CompressionAlgorithm::ALL {
            let name = algorithm.name();
            group.bench_function(format!("{}_compress_{}b", name, size), |b| {
                b.iter_batched(
                    || data.clone(),
                    |d| {
                        let _ = compress(&d, algorithm, CompressionLevel::Optimal).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });
            group.bench_function(format!("{}_decompress_{}b", name, size), |b| {
                let compressed = compress(&data, algorithm, CompressionLevel::Optimal).unwrap();
                b.iter(|| {
                    let out = decompress(&compressed, algorithm).unwrap();
                    assert_eq!(out.len(), data.len());
                })
            });
        }
    }

    group.finish();
}

fn bench_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_levels");
    let data = game_like_data(65536);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for level in [
        CompressionLevel::Fastest,
        CompressionLevel::Optimal,
        CompressionLevel::SmallestSize,
    ] {
        group.bench_function(format!("gzip_{:?}", level), |b| {
            b.iter(|| compress(&data, CompressionAlgorithm::Gzip, level).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compression, bench_levels);
criterion_main!(benches);
