//! End-to-end tests of the global-write epoch manager.

#![cfg(not(loom))]

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use quiesce_memory::stack::Node;
use quiesce_memory::{AtomicStack, GlobalWriteEm};

#[test]
fn test_enter_leave_churn_with_collector() {
    const THREADS: u64 = 8;
    const ITERATIONS: u64 = 20_000;

    let em: GlobalWriteEm<u64> = GlobalWriteEm::new();
    em.set_gc_interval(1);
    em.start_collector();

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let em = &em;
            scope.spawn(move || {
                for _ in 0..ITERATIONS {
                    let _guard = em.enter();
                }
            });
        }
    });

    #[cfg(debug_assertions)]
    {
        assert_eq!(em.epoch_joins(), em.epoch_leaves());
        assert_eq!(em.epoch_joins(), THREADS * ITERATIONS);
    }

    // Quiesced epochs are reclaimed as the chain churns; the teardown drains
    // the remainder completely.
    let stats = em.shutdown();
    assert_eq!(stats.epochs_created, stats.epochs_freed);
}

#[test]
fn test_collector_started_and_immediately_signalled() {
    let em: GlobalWriteEm<u64> = GlobalWriteEm::new();
    em.start_collector();
    em.signal_exit();

    let stats = em.shutdown();
    assert_eq!(stats.epochs_created, stats.epochs_freed);
}

#[test]
fn test_mixed_push_pop_with_gc() {
    const PUSHERS: u64 = 4;
    const POPPERS: u64 = 4;
    const OPS: u64 = 16_384;

    let em: GlobalWriteEm<Node<u64>> = GlobalWriteEm::new();
    em.set_gc_interval(2);
    em.start_collector();

    let stack: AtomicStack<u64> = AtomicStack::new();
    let popped_sum = AtomicU64::new(0);

    thread::scope(|scope| {
        for id in 0..PUSHERS + POPPERS {
            let em = &em;
            let stack = &stack;
            let popped_sum = &popped_sum;

            scope.spawn(move || {
                if id % 2 == 0 {
                    for _ in 0..OPS {
                        loop {
                            let _guard = em.enter();

                            // SAFETY: inside an entered epoch; the node goes
                            // straight to retire.
                            if let Some(node) = unsafe { stack.pop() } {
                                popped_sum
                                    .fetch_add(unsafe { node.as_ref().data }, Ordering::Relaxed);
                                unsafe { em.retire(node.as_ptr()) };
                                break;
                            }
                        }
                    }
                } else {
                    let lane = (id - 1) / 2;
                    let mut value = lane;
                    while value < PUSHERS * OPS {
                        let _guard = em.enter();
                        stack.push(value);
                        value += PUSHERS;
                    }
                }
            });
        }
    });

    let total = PUSHERS * OPS;
    assert_eq!(popped_sum.load(Ordering::Relaxed), total * (total - 1) / 2);
    assert!(stack.is_empty());

    let stats = em.shutdown();
    assert_eq!(stats.nodes_freed, total);
    assert_eq!(stats.epochs_created, stats.epochs_freed);
}

#[test]
fn test_epoch_chain_stays_short_when_quiescent() {
    let em: GlobalWriteEm<u64> = GlobalWriteEm::new();

    // With no one inside, every superseded epoch is reclaimed by the next
    // cycle: at most the current epoch and one predecessor are alive.
    for _ in 0..10 {
        em.perform_gc_cycle();
        let alive = em.epochs_created() - em.epochs_freed();
        assert!(alive <= 2, "epoch chain grew to {alive} nodes");
    }
    assert_eq!(em.epochs_created(), 11);

    em.signal_exit();
    let stats = em.shutdown();
    assert_eq!(stats.epochs_created, stats.epochs_freed);
}

#[test]
fn test_internal_collector_advances_epochs() {
    let em: GlobalWriteEm<u64> = GlobalWriteEm::new();
    em.set_gc_interval(5);
    em.start_collector();

    thread::sleep(Duration::from_millis(100));

    assert!(em.current_epoch() > 0);
    drop(em);
}
