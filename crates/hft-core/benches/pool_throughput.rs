use criterion::{criterion_group, criterion_main, Criterion};
use hft_core::config::PoolConfig;
use hft_core::pool::Pool;
use std::hint::black_box;

fn bench_acquire_release(c: &mut Criterion) {
    let pool = Pool::new(PoolConfig {
        pool_bytes: 4096 * 1024,
        block_bytes: 4096,
        use_mapped_arena: true,
    })
    .unwrap();

    c.bench_function("pool_acquire_release_roundtrip", |b| {
        b.iter(|| {
            let handle = pool.acquire().expect("pool should not be exhausted");
            pool.release(black_box(handle));
        });
    });
}

fn bench_acquire_burst(c: &mut Criterion) {
    let pool = Pool::new(PoolConfig {
        pool_bytes: 4096 * 1024,
        block_bytes: 4096,
        use_mapped_arena: true,
    })
    .unwrap();

    c.bench_function("pool_acquire_burst_then_release", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..64).filter_map(|_| pool.acquire()).collect();
            for h in handles {
                pool.release(black_box(h));
            }
        });
    });
}

criterion_group!(benches, bench_acquire_release, bench_acquire_burst);
criterion_main!(benches);
