use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tanglepack::package::ChunkOptions;
use tanglepack::{chunker, unchunker, CancelToken};

fn bench_package(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("input.bin");
    let mut data = vec![0u8; 8 * 1024 * 1024];
    StdRng::seed_from_u64(42).fill_bytes(&mut data);
    std::fs::write(&input, &data).unwrap();

    let opts = ChunkOptions { force: true, ..ChunkOptions::default() };
    let cancel = CancelToken::new();

    c.bench_function("chunk_8mib", |b| {
        b.iter(|| {
            chunker::chunk_with_rng(
                &input,
                dir.path(),
                &opts,
                &cancel,
                &mut StdRng::seed_from_u64(7),
            )
            .unwrap()
        })
    });

    // A fixed-seed package to read back.
    let packaged = chunker::chunk_with_rng(
        &input,
        dir.path(),
        &opts,
        &cancel,
        &mut StdRng::seed_from_u64(7),
    )
    .unwrap();
    let manifest_path = packaged.layout.manifest_path();

    c.bench_function("unchunk_8mib", |b| {
        b.iter(|| {
            let out = dir.path().join("out.bin");
            unchunker::unchunk(&manifest_path, dir.path(), &out, true, &cancel).unwrap()
        })
    });

    c.bench_function("verify_8mib", |b| {
        b.iter(|| unchunker::verify_package(&manifest_path, dir.path(), &cancel).unwrap())
    });
}

criterion_group!(benches, bench_package);
criterion_main!(benches);
