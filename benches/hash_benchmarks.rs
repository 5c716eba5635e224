use std::fs;
use std::path::Path;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dupescan::events;
use dupescan::hash::HashAlgorithm;
use dupescan::index::FileIndex;
use dupescan::pipeline::{compute_full, ExecMode, Pipeline, WorkerPool};
use dupescan::scan::{ScanFilters, Traversal};
use tempfile::TempDir;

// 1. One-shot digest throughput per strategy (what the profiler measures)
fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest_8mb");
    let payload: Vec<u8> = (0..8 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();

    for algo in HashAlgorithm::ALL {
        let strategy = algo.strategy(256);
        group.bench_function(algo.name(), |b| {
            b.iter(|| black_box(strategy.digest(&payload)));
        });
    }
    group.finish();
}

// 2. Streaming full-file hash at several file sizes
fn bench_streaming(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_fast64");
    let strategy = HashAlgorithm::Fast64.strategy(0);

    for size_kb in [4usize, 1024, 10 * 1024] {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bench.dat");
        fs::write(&path, vec![0xa5u8; size_kb * 1024]).unwrap();

        group.bench_function(format!("{size_kb}KB"), |b| {
            b.iter(|| black_box(compute_full(&path, strategy.as_ref(), None).unwrap()));
        });
    }
    group.finish();
}

fn populate(root: &Path, dirs: usize, files_per_dir: usize) {
    let content = vec![0x42u8; 16 * 1024];
    for d in 0..dirs {
        let dir = root.join(format!("dir_{d}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..files_per_dir {
            fs::write(dir.join(format!("file_{f}.dat")), &content).unwrap();
        }
    }
}

// 3. Full pipeline over a small tree of identical files
fn bench_pipeline(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    populate(dir.path(), 8, 10);

    c.bench_function("pipeline_80_files", |b| {
        b.iter(|| {
            let index = Arc::new(FileIndex::open_in_memory().unwrap());
            let (tx, _rx) = events::channel();
            Traversal::new(ScanFilters::default()).scan(
                &[dir.path().to_path_buf()],
                &index,
                &tx,
            );

            let strategy = Arc::from(HashAlgorithm::Fast64.strategy(0));
            let pipeline = Pipeline::new(
                index,
                strategy,
                WorkerPool::new(ExecMode::Parallel { workers: 4 }),
            );
            black_box(pipeline.run(&tx).unwrap());
        });
    });
}

criterion_group!(benches, bench_digest, bench_streaming, bench_pipeline);
criterion_main!(benches);
