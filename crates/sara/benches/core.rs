//! Allocator and container micro-benchmarks.
//!
//! Measures the hot paths called out in spec.md §4.4's rationale (random
//! access degrading gracefully as a vector grows) and §4.2 (the rotating
//! first-fit allocator scan):
//! - Bump allocation at a fresh arena vs. a nearly-full one
//! - Vector sequential push
//! - Vector random-access get, with and without a built skip table
//! - Hash map put/get at a range of bucket counts

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use sara::allocator::Allocator;
use sara::hashmap::{FxKeyHasher, TaggedHashMap};
use sara::memory::VecMemory;
use sara::vector::Vector;

fn allocator(mib: i64) -> Allocator<VecMemory> {
    let size = mib * 1024 * 1024;
    Allocator::new(0, size, VecMemory::new(size as usize + 4 * 65535)).unwrap()
}

fn bench_alloc(c: &mut Criterion) {
    c.bench_function("alloc_256b", |b| {
        let mut a = allocator(64);
        b.iter(|| {
            black_box(a.alloc(256).unwrap());
        });
    });
}

fn bench_vector_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_push");
    for size in [1_000usize, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut a = allocator(64);
                let mut v: Vector<u64> = Vector::new(&mut a).unwrap();
                for i in 0..size as u64 {
                    v.push(&mut a, i).unwrap();
                }
                black_box(v.len());
            });
        });
    }
    group.finish();
}

fn bench_vector_random_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_random_get");
    for size in [1_000u32, 100_000, 1_000_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut a = allocator(128);
            let mut v: Vector<u64> = Vector::new(&mut a).unwrap();
            for i in 0..size {
                v.push(&mut a, u64::from(i)).unwrap();
            }

            // Touch the tail once so the skip table is built before timing.
            let _ = v.get(&mut a, size - 1).unwrap();

            b.iter(|| {
                for step in (0..size).step_by((size / 64).max(1) as usize) {
                    black_box(v.get(&mut a, step).unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_hashmap_put_get(c: &mut Criterion) {
    // Kept under the 4,096-bucket tier of the aggressive (count^2) growth
    // schedule (spec.md §9): one more grow step would jump bucket count to
    // 4096^2 and dwarf the allocator budget used here.
    let mut group = c.benchmark_group("hashmap_put_get");
    for size in [100u64, 1_000, 3_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut a = allocator(16);
                let mut map = TaggedHashMap::new(&mut a, FxKeyHasher, 64, true).unwrap();
                for i in 0..size {
                    map.put(&mut a, i, i * 2, true).unwrap();
                }
                for i in 0..size {
                    black_box(map.get(&mut a, i).unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_alloc,
    bench_vector_push,
    bench_vector_random_get,
    bench_hashmap_put_get
);
criterion_main!(benches);
