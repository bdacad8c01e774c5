//! Quiesce Memory: Epoch-Based Safe Memory Reclamation for Lock-Free Data Structures
//!
//! This crate solves the use-after-free problem inherent to lock-free data
//! structures: readers traverse nodes without locks while a writer may have
//! already unlinked them. A node detached from a shared structure must not be
//! physically freed until every thread that might still hold a reference to it
//! has provably left the critical section in which that reference was acquired.
//!
//! # Architecture
//!
//! Two reclamation schemes are provided, sharing a background collector task:
//!
//! - [`LocalWriteEm`]: a per-core announcement epoch manager. A worker thread
//!   announces liveness by writing only to its own cache-line-isolated slot;
//!   the collector derives the safe-to-reclaim epoch from the minimum of those
//!   slots. No global atomic is written on the fast path.
//! - [`GlobalWriteEm`]: a reference-counted epoch list. Every critical section
//!   increments and decrements the current epoch's active counter. Simpler,
//!   but serializes on that counter.
//!
//! An auxiliary lock-free [`AtomicStack`] serves as the canonical client:
//! popped nodes are handed to a reclaimer as garbage.
//!
//! # Safety Invariant
//!
//! A retired record `(r, e)` is physically freed only once every live
//! announcement exceeds `e` (local-write scheme), or once every epoch whose
//! lifetime could have exposed `r` reports zero active threads (global-write
//! scheme):
//!
//! ```text
//! free(r, e) ⟹ ∀ live announcements a: a > e
//! ```
//!
//! Stale announcements delay reclamation but never break safety: the
//! collector's lower bound is always ≤ the true lower bound.
//!
//! # Example
//!
//! ```rust
//! use quiesce_memory::{AtomicStack, LocalWriteEm};
//!
//! let em = LocalWriteEm::new(4);
//! let stack: AtomicStack<u64> = AtomicStack::new();
//!
//! stack.push(7);
//!
//! // Announce before touching shared state, retire what is detached.
//! em.announce_enter(0);
//! if let Some(node) = unsafe { stack.pop() } {
//!     assert_eq!(unsafe { node.as_ref().data }, 7);
//!     unsafe { em.retire(node.as_ptr()) };
//! }
//!
//! em.signal_exit();
//! let stats = em.shutdown();
//! assert_eq!(stats.nodes_freed, 1);
//! ```
//!
//! # Loom Verification
//!
//! The `sync` module switches every atomic in the crate to Loom's
//! model-checked implementations when built with the `loom` feature and
//! `RUSTFLAGS="--cfg loom"`, enabling exhaustive interleaving exploration of
//! the announcement, retirement and collection protocols.
//!
//! # References
//!
//! - Fraser, K. "Practical lock-freedom." University of Cambridge technical
//!   report UCAM-CL-TR-579, 2004.
//! - Hart, McKenney, Brown, Walpole. "Performance of memory reclamation for
//!   lockless synchronization." JPDC 67(12), 2007.
//! - Treiber, R. K. "Systems programming: Coping with parallelism." IBM
//!   research report RJ 5118, 1986.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Atomics resolve to loom's model-checked types under `--cfg loom`
pub mod sync;

pub mod epoch;
pub mod padded;
pub mod stack;

// The two managers, their guards and stats, and the stack client all live at
// the root; `epoch::` paths are only needed for the module docs.
pub use epoch::{Epoch, EpochGuard, GlobalEmStats, GlobalWriteEm, LocalEmStats, LocalWriteEm};
pub use padded::Padded;
pub use stack::AtomicStack;

/// Layout and timing constants shared by both managers
pub mod config {
    /// Cache line size assumed for padding and alignment
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Default collector cycle interval in milliseconds
    ///
    /// The sleep keeps worker threads' L1-cached reads of the epoch counter
    /// undisturbed most of the time; shortening it trades reclamation latency
    /// for cache-coherence traffic. Reasonable range: 10 ms to 1 s.
    pub const DEFAULT_GC_INTERVAL_MS: u64 = 50;
}
