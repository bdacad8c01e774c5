//! Contention Scaling: Local Writes vs Shared Counters vs Locks
//!
//! Three ways for a worker to announce liveness, measured under increasing
//! thread counts:
//!
//! - `local_write_em`: one release store into the thread's own padded slot,
//! - `global_write_em`: fetch_add/fetch_sub on the shared epoch counter,
//! - `mutex_epoch_table`: the lock-based strawman.
//!
//! A second group isolates the cost of false sharing by running the same
//! store storm against cache-padded and unpadded slot arrays.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use quiesce_memory::{GlobalWriteEm, LocalWriteEm};

const THREAD_COUNTS: &[usize] = &[1, 2, 4, 8];

/// Runs `op(thread_id)` `iters` times on each of `threads` workers and
/// returns the wall-clock time of the whole storm.
fn storm<F>(threads: usize, iters: u64, op: F) -> Duration
where
    F: Fn(usize) + Sync,
{
    let start = Instant::now();
    thread::scope(|scope| {
        for thread_id in 0..threads {
            let op = &op;
            scope.spawn(move || {
                for _ in 0..iters {
                    op(thread_id);
                }
            });
        }
    });
    start.elapsed()
}

fn bench_announce_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("announce_scaling");

    for &threads in THREAD_COUNTS {
        group.throughput(Throughput::Elements(threads as u64));

        group.bench_with_input(
            BenchmarkId::new("local_write_em", threads),
            &threads,
            |b, &threads| {
                let em: LocalWriteEm<u64> = LocalWriteEm::new(threads);
                b.iter_custom(|iters| {
                    storm(threads, iters, |thread_id| em.announce_enter(thread_id))
                });
                em.signal_exit();
            },
        );

        group.bench_with_input(
            BenchmarkId::new("global_write_em", threads),
            &threads,
            |b, &threads| {
                let em: GlobalWriteEm<u64> = GlobalWriteEm::new();
                b.iter_custom(|iters| {
                    storm(threads, iters, |_| {
                        let _guard = em.enter();
                    })
                });
                em.signal_exit();
            },
        );

        group.bench_with_input(
            BenchmarkId::new("mutex_epoch_table", threads),
            &threads,
            |b, &threads| {
                let table = Mutex::new(vec![0u64; threads]);
                let epoch = AtomicU64::new(0);
                b.iter_custom(|iters| {
                    storm(threads, iters, |thread_id| {
                        let mut table = table.lock();
                        table[thread_id] = epoch.load(Ordering::Acquire);
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_false_sharing(c: &mut Criterion) {
    let mut group = c.benchmark_group("false_sharing");
    let threads = 4;
    group.throughput(Throughput::Elements(threads as u64));

    group.bench_function("padded_slots", |b| {
        let slots: Vec<CachePadded<AtomicU64>> =
            (0..threads).map(|_| CachePadded::new(AtomicU64::new(0))).collect();
        b.iter_custom(|iters| {
            storm(threads, iters, |thread_id| {
                slots[thread_id].store(1, Ordering::Release);
            })
        });
    });

    group.bench_function("unpadded_slots", |b| {
        let slots: Vec<AtomicU64> = (0..threads).map(|_| AtomicU64::new(0)).collect();
        b.iter_custom(|iters| {
            storm(threads, iters, |thread_id| {
                slots[thread_id].store(1, Ordering::Release);
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_announce_contention, bench_false_sharing);
criterion_main!(benches);
