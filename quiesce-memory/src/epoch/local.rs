//! Local-Write Epoch Manager
//!
//! A scalable epoch manager in which a worker thread announces liveness by
//! writing only to its own cache-line-isolated counter. Traditional epoch
//! managers make every critical section increment and decrement a shared
//! counter, which serializes all workers on one cache line. Here the worker
//! fast path is a single release store into a per-core slot:
//!
//! ```text
//! A[core] <- C          (announce: store-release of the acquire-loaded epoch)
//! ```
//!
//! The collector periodically bumps the global epoch `C` and computes
//! `m = min(A[0..N])`; every garbage record retired strictly before `m` is
//! unreachable from any live critical section and can be freed. Workers read
//! `C` from their own L1 cache almost always, since the collector writes it
//! only once per cycle, and never write anything another worker reads.
//!
//! # Garbage List and ABA
//!
//! Retired records form a singly linked list onto which workers CAS-prepend.
//! The collector unlinks only records *strictly after* the head: if it freed
//! the head record, the allocator could hand the same address to a worker
//! whose prepend-CAS would then succeed against a stale-but-equal pointer.
//! Leaving the head to the final sweep removes that ABA window entirely.

use std::ptr;
use std::sync::Arc;
#[cfg(not(all(feature = "loom", loom)))]
use std::sync::Mutex;
#[cfg(not(all(feature = "loom", loom)))]
use std::thread::JoinHandle;
#[cfg(not(all(feature = "loom", loom)))]
use std::time::Duration;

use crate::config::DEFAULT_GC_INTERVAL_MS;
use crate::padded::Padded;
use crate::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

#[cfg(not(all(feature = "loom", loom)))]
use super::collector::{spawn_collector, GcCycle};
use super::Epoch;

/// A retired allocation awaiting reclamation.
///
/// `next` is written by the retiring worker before the publishing CAS and
/// never afterwards; once a record is linked, only the collector touches the
/// list structure.
struct GarbageNode<G> {
    garbage: *mut G,
    retired_at: Epoch,
    next: *mut GarbageNode<G>,
}

/// State shared between worker threads, the collector task and the manager
/// handle.
///
/// Every atomic written by workers and read by the collector (announcement
/// slots, the garbage-list head) sits on its own cache line, and the epoch
/// counter is co-located with nothing workers write.
struct Shared<G> {
    /// Per-core announcement slots; slot `i` is written only by the worker
    /// pinned to core `i` and read by the collector.
    announcements: Box<[Padded<AtomicU64>]>,

    /// The global epoch counter; shared-read by workers, bumped by the
    /// collector once per cycle.
    epoch: Padded<AtomicU64>,

    /// Head of the garbage list; CAS-prepend target for workers.
    garbage_head: Padded<AtomicPtr<GarbageNode<G>>>,

    /// Cooperative shutdown flag.
    exited: AtomicBool,

    /// Pause between collector cycles, in milliseconds.
    interval_ms: AtomicU64,

    /// Latch upholding the single-collector invariant.
    gc_active: AtomicBool,

    /// Guards the teardown protocol against running twice.
    torn_down: AtomicBool,

    /// Number of payloads freed, including by the final sweep.
    nodes_freed: AtomicU64,

    /// Number of records reclaimed by the final sweep.
    nodes_left: AtomicU64,
}

// SAFETY: the raw pointers reference heap allocations handed over through
// retire; G crosses to the collector thread, hence the Send bound.
unsafe impl<G: Send> Send for Shared<G> {}
unsafe impl<G: Send> Sync for Shared<G> {}

impl<G> Shared<G> {
    fn announce_enter(&self, core_id: usize) {
        assert!(
            core_id < self.announcements.len(),
            "announce_enter: core id {core_id} out of range (core count {})",
            self.announcements.len()
        );

        // Acquire on the epoch load, release on the slot store: the
        // announcement is observable to the collector before any load of
        // shared state this thread performs afterwards.
        let epoch = self.epoch.load(Ordering::Acquire);
        self.announcements[core_id].store(epoch, Ordering::Release);
    }

    unsafe fn retire(&self, garbage: *mut G) {
        // The epoch is sampled after the caller made the allocation
        // unreachable, so every thread that could still see it announced at
        // an epoch <= retired_at.
        let record = Box::into_raw(Box::new(GarbageNode {
            garbage,
            retired_at: self.epoch.load(Ordering::Acquire),
            next: ptr::null_mut(),
        }));

        let mut head = self.garbage_head.load(Ordering::Acquire);
        loop {
            // Unpublished until the CAS succeeds.
            unsafe { (*record).next = head };

            match self.garbage_head.compare_exchange(
                head,
                record,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    fn advance_epoch(&self) {
        // Monotonicity is the only property required here.
        self.epoch.fetch_add(1, Ordering::Relaxed);
    }

    /// The reclamation lower bound: no live critical section can have
    /// announced below this value.
    fn min_announced(&self) -> Epoch {
        let mut min = u64::MAX;
        for slot in self.announcements.iter() {
            min = min.min(slot.load(Ordering::Acquire));
        }
        min
    }

    fn collect(&self) {
        assert!(
            !self.gc_active.swap(true, Ordering::Acquire),
            "concurrent GC cycle: at most one collector may run at a time"
        );

        let min = self.min_announced();

        // The head record is deliberately never reclaimed here; see the
        // module docs on ABA. Workers CAS against a head the collector does
        // not modify.
        let head = self.garbage_head.load(Ordering::Acquire);
        if !head.is_null() {
            let mut prev = head;
            // SAFETY: linked records stay alive until this thread frees them;
            // next pointers of published records are immutable until unlink.
            let mut node = unsafe { (*prev).next };

            while !node.is_null() {
                let retired_at = unsafe { (*node).retired_at };
                let next = unsafe { (*node).next };

                if retired_at < min {
                    // Unlink, then free. prev is never freed in this pass, so
                    // the write below cannot race with anything.
                    unsafe {
                        (*prev).next = next;
                        self.free_record(node);
                    }
                } else {
                    prev = node;
                }
                node = next;
            }
        }

        self.gc_active.store(false, Ordering::Release);
    }

    /// Frees every remaining record regardless of its retire epoch.
    ///
    /// Only sound once no worker or collector can touch the list again; the
    /// teardown protocol guarantees that.
    fn sweep_all(&self) {
        let mut node = self.garbage_head.swap(ptr::null_mut(), Ordering::Acquire);
        while !node.is_null() {
            let next = unsafe { (*node).next };
            unsafe { self.free_record(node) };
            self.nodes_left.fetch_add(1, Ordering::Relaxed);
            node = next;
        }
    }

    /// Frees a record and its payload.
    ///
    /// # Safety
    ///
    /// `record` must be unlinked and unreachable by any other thread.
    unsafe fn free_record(&self, record: *mut GarbageNode<G>) {
        let record = unsafe { Box::from_raw(record) };
        drop(unsafe { Box::from_raw(record.garbage) });
        self.nodes_freed.fetch_add(1, Ordering::Relaxed);
    }

    fn signal_exit(&self) {
        self.exited.store(true, Ordering::Release);
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}

#[cfg(not(all(feature = "loom", loom)))]
impl<G: Send + 'static> GcCycle for Shared<G> {
    fn has_exited(&self) -> bool {
        Shared::has_exited(self)
    }

    fn run_gc_cycle(&self) {
        self.advance_epoch();
        self.collect();
    }

    fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }
}

/// Final reclamation counters of a [`LocalWriteEm`], returned by
/// [`LocalWriteEm::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEmStats {
    /// Payloads freed over the manager's lifetime, final sweep included.
    pub nodes_freed: u64,
    /// Records that were still linked when the final sweep ran.
    pub nodes_left: u64,
}

/// Per-core announcement epoch manager.
///
/// Worker threads call [`announce_enter`](Self::announce_enter) before every
/// operation on the shared structure this manager arbitrates, and surrender
/// detached nodes through [`retire`](Self::retire). A background collector
/// (internal via [`start_collector`](Self::start_collector), or an external
/// thread driving [`advance_epoch`](Self::advance_epoch) and
/// [`collect`](Self::collect)) frees retired nodes once no announcement can
/// reach them.
///
/// # Thread Safety
///
/// The manager is `Send + Sync`; share it by reference from scoped threads or
/// through an `Arc`. Announcement slots are indexed by core id: the client
/// must ensure a stable slot per thread (pin the thread, or derive the slot
/// from a stable thread id).
///
/// # Example
///
/// ```rust
/// use quiesce_memory::LocalWriteEm;
///
/// let em: LocalWriteEm<u64> = LocalWriteEm::new(4);
/// em.start_collector();
///
/// em.announce_enter(0);
/// let detached = Box::into_raw(Box::new(9u64));
/// // ... unlink `detached` from the shared structure, then:
/// unsafe { em.retire(detached) };
///
/// drop(em); // joins the collector and sweeps the remainder
/// ```
pub struct LocalWriteEm<G> {
    shared: Arc<Shared<G>>,

    /// Handle of the internal collector, when one was started.
    #[cfg(not(all(feature = "loom", loom)))]
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<G> LocalWriteEm<G> {
    /// Creates a manager with `core_count` announcement slots, all at epoch 0.
    ///
    /// # Panics
    ///
    /// Panics if `core_count` is zero.
    pub fn new(core_count: usize) -> Self {
        assert!(core_count > 0, "core count must be at least 1");

        let announcements = (0..core_count)
            .map(|_| Padded::new(AtomicU64::new(0)))
            .collect();

        Self {
            shared: Arc::new(Shared {
                announcements,
                epoch: Padded::new(AtomicU64::new(0)),
                garbage_head: Padded::new(AtomicPtr::new(ptr::null_mut())),
                exited: AtomicBool::new(false),
                interval_ms: AtomicU64::new(DEFAULT_GC_INTERVAL_MS),
                gc_active: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                nodes_freed: AtomicU64::new(0),
                nodes_left: AtomicU64::new(0),
            }),
            #[cfg(not(all(feature = "loom", loom)))]
            handle: Mutex::new(None),
        }
    }

    /// Announces that the calling thread enters a critical section on core
    /// `core_id`.
    ///
    /// Must be called before any access to shared state this reclaimer
    /// arbitrates, at least once per logical operation. A single release
    /// store; never blocks, contends on nothing workers write.
    ///
    /// Back-to-back announcements observe non-decreasing epochs.
    ///
    /// # Panics
    ///
    /// Panics if `core_id` is outside the core count given at construction;
    /// that programmer error would silently break the reclamation bound.
    #[inline]
    pub fn announce_enter(&self, core_id: usize) {
        self.shared.announce_enter(core_id);
    }

    /// Surrenders a detached allocation for deferred freeing.
    ///
    /// # Safety
    ///
    /// - `garbage` must originate from `Box::into_raw` and must not be
    ///   retired twice.
    /// - At the time of the call, `garbage` must no longer be reachable from
    ///   the shared structure through any path observable to a thread that
    ///   announced at or after the current epoch; the CAS that unlinked it
    ///   must carry release ordering.
    pub unsafe fn retire(&self, garbage: *mut G) {
        unsafe { self.shared.retire(garbage) }
    }

    /// Bumps the global epoch. Collector-side; worker threads never call it.
    pub fn advance_epoch(&self) {
        self.shared.advance_epoch();
    }

    /// Runs one collection pass: frees every record retired strictly before
    /// the minimum live announcement, except the list head.
    ///
    /// # Panics
    ///
    /// Panics if another collection pass is running; the single-collector
    /// invariant is a hard contract.
    pub fn collect(&self) {
        self.shared.collect();
    }

    /// The current value of the epoch counter. Debugging aid.
    pub fn current_epoch(&self) -> Epoch {
        self.shared.epoch.load(Ordering::Acquire)
    }

    /// Sets the pause between internal collector cycles, in milliseconds.
    ///
    /// Takes effect from the next cycle on.
    pub fn set_gc_interval(&self, interval_ms: u64) {
        self.shared.interval_ms.store(interval_ms, Ordering::Relaxed);
    }

    /// The pause between internal collector cycles, in milliseconds.
    pub fn gc_interval(&self) -> u64 {
        self.shared.interval_ms.load(Ordering::Relaxed)
    }

    /// Signals the collector (internal or external) to terminate after its
    /// current cycle. Idempotent.
    pub fn signal_exit(&self) {
        self.shared.signal_exit();
    }

    /// Whether the exit signal has been issued.
    ///
    /// An external collector thread should check this every cycle and stop
    /// once it reads `true`; the manager may only be dropped after that
    /// thread has been joined.
    pub fn has_exited(&self) -> bool {
        self.shared.has_exited()
    }

    /// Payloads freed so far, final sweep included. Debugging aid.
    pub fn nodes_freed(&self) -> u64 {
        self.shared.nodes_freed.load(Ordering::Relaxed)
    }

    /// Records reclaimed by the final sweep; zero before teardown.
    pub fn nodes_left(&self) -> u64 {
        self.shared.nodes_left.load(Ordering::Relaxed)
    }

    /// Tears the manager down and returns the final counters.
    ///
    /// Equivalent to dropping it: joins the internal collector (after
    /// signalling exit); when no internal collector was started, requires
    /// that [`signal_exit`](Self::signal_exit) was already called and any
    /// external collector joined. Every remaining record is then freed
    /// unconditionally.
    pub fn shutdown(self) -> LocalEmStats {
        self.shutdown_in_place();
        LocalEmStats {
            nodes_freed: self.shared.nodes_freed.load(Ordering::Relaxed),
            nodes_left: self.shared.nodes_left.load(Ordering::Relaxed),
        }
    }

    fn shutdown_in_place(&self) {
        if self.shared.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(not(all(feature = "loom", loom)))]
        {
            let handle = match self.handle.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };

            if let Some(handle) = handle {
                self.shared.signal_exit();
                if handle.join().is_err() {
                    panic!("collector thread panicked");
                }
            } else {
                assert!(
                    self.shared.has_exited(),
                    "manager dropped without signal_exit while no internal collector runs"
                );
            }
        }

        #[cfg(all(feature = "loom", loom))]
        assert!(
            self.shared.has_exited(),
            "manager dropped without signal_exit while no internal collector runs"
        );

        self.shared.sweep_all();

        #[cfg(debug_assertions)]
        eprintln!(
            "local-write reclaimer torn down: nodes_freed = {}, nodes_left = {}",
            self.shared.nodes_freed.load(Ordering::Relaxed),
            self.shared.nodes_left.load(Ordering::Relaxed),
        );
    }
}

#[cfg(not(all(feature = "loom", loom)))]
impl<G: Send + 'static> LocalWriteEm<G> {
    /// Starts the internal collector task.
    ///
    /// The task runs `advance_epoch`/`collect` cycles separated by the
    /// configured interval until [`signal_exit`](Self::signal_exit); dropping
    /// the manager signals and joins it.
    ///
    /// # Panics
    ///
    /// Panics if a collector is already running or exit was already
    /// signalled.
    pub fn start_collector(&self) {
        assert!(!self.has_exited(), "collector started after signal_exit");

        let mut slot = match self.handle.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        assert!(slot.is_none(), "collector already running");

        *slot = Some(spawn_collector(
            Arc::clone(&self.shared),
            "quiesce-local-collector",
        ));
    }
}

impl<G> Drop for LocalWriteEm<G> {
    fn drop(&mut self) {
        self.shutdown_in_place();
    }
}
