use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::collections::BTreeMap;
use tensorgate::gpu::{Gib, GpuPool};

fn model_memory() -> BTreeMap<String, u64> {
    let mut m = BTreeMap::new();
    m.insert("gpt-4".to_string(), 16);
    m.insert("gpt-4o-mini".to_string(), 8);
    m
}

fn pool(device_count: usize) -> GpuPool {
    let devices = (0..device_count).map(|i| (format!("gpu{i}"), Gib(80)));
    GpuPool::new(devices, model_memory(), true)
}

fn bench_allocate_release_cycle(c: &mut Criterion) {
    c.bench_function("allocate_release_cycle_8_devices", |b| {
        let mut pool = pool(8);
        b.iter(|| {
            let lease = pool
                .try_allocate(black_box("gpt-4o-mini"))
                .expect("capacity available");
            pool.release(&lease);
        });
    });
}

fn bench_allocate_under_contention(c: &mut Criterion) {
    c.bench_function("allocate_until_exhausted_8_devices", |b| {
        b.iter_batched(
            || pool(8),
            |mut pool| {
                let mut leases = Vec::new();
                while let Some(lease) = pool.try_allocate(black_box("gpt-4")) {
                    leases.push(lease);
                }
                leases.len()
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let mut pool = pool(16);
    for _ in 0..10 {
        let _ = pool.try_allocate("gpt-4o-mini");
    }

    c.bench_function("snapshot_16_devices", |b| {
        b.iter(|| black_box(pool.snapshot()));
    });
}

criterion_group!(
    benches,
    bench_allocate_release_cycle,
    bench_allocate_under_contention,
    bench_snapshot
);
criterion_main!(benches);
