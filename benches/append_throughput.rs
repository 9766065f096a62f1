//! Append throughput benchmarks.
//!
//! Measures the hot push path per locking mode and payload size, and the
//! colder extraction path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use diaglog_core::{BufferFlags, LockingMode, LogRegistry, RegistryConfig};

fn bench_ring_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_append");

    for (name, locking) in [
        ("none", LockingMode::None),
        ("state_only", LockingMode::StateOnly),
        ("full", LockingMode::Full),
    ] {
        for size in [16usize, 256, 4096] {
            let registry = LogRegistry::new(RegistryConfig::default());
            let handle = registry
                .register_buffer(64 * 1024, BufferFlags::ring(locking), 1)
                .unwrap();
            let payload = vec![0xA5u8; size];

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_function(BenchmarkId::new(name, size), |b| {
                b.iter(|| {
                    registry
                        .append(black_box(handle), black_box(&payload))
                        .unwrap()
                })
            });
        }
    }

    group.finish();
}

fn bench_extract_chunk(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_chunk");

    let registry = LogRegistry::new(RegistryConfig::default());
    let handle = registry
        .register_buffer(64 * 1024, BufferFlags::ring(LockingMode::Full), 1)
        .unwrap();
    registry.append(handle, &vec![0x5Au8; 64 * 1024]).unwrap();

    for chunk_size in [512usize, 4096] {
        let mut dest = vec![0u8; chunk_size];
        group.throughput(Throughput::Bytes(chunk_size as u64));
        group.bench_function(BenchmarkId::new("chunk", chunk_size), |b| {
            b.iter(|| {
                registry
                    .extract_chunk(black_box(handle), 3, chunk_size, &mut dest)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ring_append, bench_extract_chunk);
criterion_main!(benches);
