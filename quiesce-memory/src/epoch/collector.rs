//! Background Collector Task
//!
//! A single dedicated OS thread drives garbage-collection cycles for a
//! reclamation manager:
//!
//! ```text
//! loop {
//!     if exited { break }
//!     run one GC cycle (advance the epoch, collect garbage)
//!     sleep(interval)
//! }
//! ```
//!
//! The sleep keeps worker threads' L1-cached reads of the epoch counter
//! undisturbed most of the time; shortening the interval trades reclamation
//! latency for cache-coherence traffic. Cancellation is cooperative: after
//! `signal_exit`, the task terminates at the top of its next iteration. An
//! individual cycle needs no timeout: the garbage list is finite at the
//! moment it is walked, so a cycle always terminates.
//!
//! The work is CPU-bound and the sleep coarse, so a plain OS thread is the
//! right vehicle; no async runtime is involved.

use std::sync::Arc;
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

/// One garbage-collection cycle of a reclamation manager, as seen by the
/// background task.
///
/// Implementations must uphold the single-collector invariant: `run_gc_cycle`
/// is only ever called from one thread at a time.
pub(crate) trait GcCycle: Send + Sync + 'static {
    /// Whether `signal_exit` has been observed.
    fn has_exited(&self) -> bool;

    /// Advances the epoch and collects reclaimable garbage.
    fn run_gc_cycle(&self);

    /// The pause between consecutive cycles.
    fn gc_interval(&self) -> Duration;
}

/// Spawns the collector task for `driver` on a named thread.
pub(crate) fn spawn_collector<D: GcCycle>(driver: Arc<D>, name: &str) -> JoinHandle<()> {
    let result = Builder::new().name(name.to_owned()).spawn(move || {
        loop {
            if driver.has_exited() {
                break;
            }
            driver.run_gc_cycle();
            std::thread::sleep(driver.gc_interval());
        }

        #[cfg(debug_assertions)]
        eprintln!("collector task exited");
    });

    match result {
        Ok(handle) => handle,
        Err(err) => panic!("failed to spawn collector thread: {err}"),
    }
}
