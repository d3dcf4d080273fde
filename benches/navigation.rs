//! Cursor navigation benchmarks.
//!
//! Measures a full forward scan and a back-and-forth walk at several fetch
//! counts, against the in-process remote cursor.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cursorcache::{BufferedCursor, CursorConfig, MemoryCursor};

const ROWS: usize = 2_000;

fn open(fetch_count: usize) -> BufferedCursor<MemoryCursor> {
    let config = CursorConfig::default().with_fetch_count(fetch_count);
    let mut cursor = BufferedCursor::new(MemoryCursor::numbered(ROWS).unwrap(), config).unwrap();
    cursor.open().unwrap();
    cursor
}

fn bench_forward_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_scan");
    group.throughput(Throughput::Elements(ROWS as u64));

    for fetch_count in [1, 5, 20, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(fetch_count),
            &fetch_count,
            |b, &fetch_count| {
                b.iter_with_setup(
                    || open(fetch_count),
                    |mut cursor| {
                        while cursor.next().unwrap() {
                            black_box(cursor.select().unwrap());
                        }
                        cursor
                    },
                );
            },
        );
    }
    group.finish();
}

fn bench_jitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_prior_jitter");

    for fetch_count in [1, 20] {
        group.bench_with_input(
            BenchmarkId::from_parameter(fetch_count),
            &fetch_count,
            |b, &fetch_count| {
                b.iter_with_setup(
                    || open(fetch_count),
                    |mut cursor| {
                        // Two steps forward, one back
                        for _ in 0..500 {
                            cursor.next().unwrap();
                            cursor.next().unwrap();
                            cursor.prior().unwrap();
                        }
                        cursor
                    },
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_forward_scan, bench_jitter);
criterion_main!(benches);
