//! Benchmark Harness for the Quiesce Reclamation Crates
//!
//! Shared plumbing for the `smr_bench` driver and the criterion benches:
//! a dependency-free argument parser, thread-affinity helpers, deterministic
//! hash/random workload generators and a scoped thread launcher.

pub mod affinity;
pub mod args;
pub mod workload;

/// Launches `thread_count` workers running `body(thread_id)` and joins them
/// all before returning.
///
/// # Panics
///
/// Propagates a panic from any worker.
pub fn run_threads<F>(thread_count: u64, body: F)
where
    F: Fn(u64) + Sync,
{
    std::thread::scope(|scope| {
        for thread_id in 0..thread_count {
            let body = &body;
            scope.spawn(move || body(thread_id));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_run_threads_joins_all() {
        let sum = AtomicU64::new(0);
        run_threads(8, |id| {
            sum.fetch_add(id, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 28);
    }
}
