//! Single-thread operation costs of the reclamation primitives.
//!
//! The numbers here are floors: `announce_enter` is one release store plus an
//! epoch load, `enter`/`leave` one fetch_add/fetch_sub pair on a shared
//! counter. Multi-thread contention behavior lives in the
//! `quiesce-benchmarks` crate.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use quiesce_memory::{AtomicStack, GlobalWriteEm, LocalWriteEm};

fn bench_announce_enter(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_write_em");
    group.throughput(Throughput::Elements(1));

    let em: LocalWriteEm<u64> = LocalWriteEm::new(4);

    group.bench_function("announce_enter", |b| {
        b.iter(|| em.announce_enter(black_box(0)));
    });

    group.bench_function("retire_collect_batch", |b| {
        b.iter(|| {
            for i in 0..64u64 {
                // SAFETY: fresh allocation, never reachable elsewhere.
                unsafe { em.retire(Box::into_raw(Box::new(i))) };
            }
            em.advance_epoch();
            em.announce_enter(0);
            em.collect();
        });
    });

    em.signal_exit();
    group.finish();
}

fn bench_enter_leave(c: &mut Criterion) {
    let mut group = c.benchmark_group("global_write_em");
    group.throughput(Throughput::Elements(1));

    let em: GlobalWriteEm<u64> = GlobalWriteEm::new();

    group.bench_function("enter_leave", |b| {
        b.iter(|| {
            let guard = em.enter();
            black_box(&guard);
        });
    });

    em.signal_exit();
    group.finish();
}

fn bench_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomic_stack");
    group.throughput(Throughput::Elements(1));

    let stack: AtomicStack<u64> = AtomicStack::new();

    group.bench_function("push_pop_pair", |b| {
        b.iter(|| {
            stack.push(black_box(7));
            // SAFETY: single-threaded; the node is freed immediately.
            let node = unsafe { stack.pop() }.expect("stack cannot be empty here");
            drop(unsafe { Box::from_raw(node.as_ptr()) });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_announce_enter,
    bench_enter_leave,
    bench_stack
);
criterion_main!(benches);
