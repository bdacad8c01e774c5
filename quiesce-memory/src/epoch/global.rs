//! Global-Write Epoch Manager
//!
//! A reference-counted epoch list: every critical section atomically
//! increments and decrements the active counter of the current epoch node.
//! Simpler than the local-write scheme, but all workers serialize on that one
//! counter. This manager exists as the contrast case and for clients with
//! few threads.
//!
//! ```text
//! head_epoch ──> E0 ──> E1 ──> E2 = current_epoch
//!               (active, garbage, next)
//! ```
//!
//! The collector latches the oldest epoch by swapping its active count from
//! zero to a very large negative value. Any worker whose increment lands on a
//! latched epoch observes a negative previous value, abandons it, and retries
//! on the freshly published current epoch; the spurious increment is absorbed
//! by the latch offset. Once latched, an epoch's garbage and the node itself
//! are freed and the head advances.
//!
//! A full GC cycle is collect-then-advance, in that order: the reverse order
//! widens the window in which a worker could observe the just-published
//! current epoch while the collector latches its immediate predecessor.

use core::marker::PhantomData;
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
use crate::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicU64, Ordering};

#[cfg(not(all(feature = "loom", loom)))]
use super::collector::{spawn_collector, GcCycle};
use super::Epoch;

/// Latch value for a quiesced epoch: large enough in magnitude that no
/// realistic number of concurrent spurious increments can drag it back to
/// zero.
const LATCHED: i64 = i64::MIN;

/// A retired allocation, linked into the garbage list of the epoch that was
/// current at retirement time.
struct GarbageNode<G> {
    garbage: *mut G,
    next: *mut GarbageNode<G>,
}

/// One node of the epoch list.
struct EpochNode<G> {
    /// Number of threads currently inside this epoch; [`LATCHED`] once the
    /// collector has claimed the node for reclamation.
    active: Padded<AtomicI64>,

    /// Head of this epoch's garbage list; CAS-prepend target for workers.
    garbage_head: Padded<AtomicPtr<GarbageNode<G>>>,

    /// Successor epoch; written by the collector before the successor is
    /// published as current, read only by the collector.
    next: AtomicPtr<EpochNode<G>>,
}

impl<G> EpochNode<G> {
    fn allocate() -> *mut Self {
        Box::into_raw(Box::new(Self {
            active: Padded::new(AtomicI64::new(0)),
            garbage_head: Padded::new(AtomicPtr::new(ptr::null_mut())),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// State shared between workers, the collector task and the manager handle.
struct Shared<G> {
    /// The newest epoch; loaded by every `enter` and `retire`, stored once
    /// per cycle by the collector.
    current: Padded<AtomicPtr<EpochNode<G>>>,

    /// The oldest epoch; touched only by the collector and the teardown.
    head: AtomicPtr<EpochNode<G>>,

    /// Cooperative shutdown flag.
    exited: AtomicBool,

    /// Pause between collector cycles, in milliseconds.
    interval_ms: AtomicU64,

    /// Latch upholding the single-collector invariant.
    gc_active: AtomicBool,

    /// Guards the teardown protocol against running twice.
    torn_down: AtomicBool,

    /// Number of payloads freed.
    nodes_freed: AtomicU64,

    /// Epoch nodes created, the initial one included.
    epochs_created: AtomicU64,

    /// Epoch nodes reclaimed.
    epochs_freed: AtomicU64,

    /// Successful `enter` calls. Hot-path counter, debug builds only.
    #[cfg(debug_assertions)]
    epoch_joins: AtomicU64,

    /// `leave` calls (guard drops). Hot-path counter, debug builds only.
    #[cfg(debug_assertions)]
    epoch_leaves: AtomicU64,
}

// SAFETY: the raw pointers reference heap allocations owned by the epoch
// chain; G payloads cross to the collector thread, hence the Send bound.
unsafe impl<G: Send> Send for Shared<G> {}
unsafe impl<G: Send> Sync for Shared<G> {}

impl<G> Shared<G> {
    fn enter(&self) -> *const EpochNode<G> {
        loop {
            let epoch = self.current.load(Ordering::Acquire);

            // SAFETY: the current epoch is immortal until a successor is
            // published, and a superseded epoch becomes latchable no earlier
            // than the collect phase of the *next* cycle, one full interval
            // after it stopped being current. The load-to-increment window
            // here is two instructions.
            let previous = unsafe { (*epoch).active.fetch_add(1, Ordering::AcqRel) };

            if previous >= 0 {
                #[cfg(debug_assertions)]
                self.epoch_joins.fetch_add(1, Ordering::Relaxed);

                return epoch;
            }
            // The collector latched this epoch between our load and the
            // increment; the increment is absorbed by the latch offset.
            // Reload the current pointer and try again.
        }
    }

    fn leave(&self, epoch: *const EpochNode<G>) {
        // SAFETY: the epoch cannot have been reclaimed: our own membership
        // kept its active count positive, so the latch CAS could not succeed.
        unsafe { (*epoch).active.fetch_sub(1, Ordering::AcqRel) };

        #[cfg(debug_assertions)]
        self.epoch_leaves.fetch_add(1, Ordering::Relaxed);
    }

    unsafe fn retire(&self, garbage: *mut G) {
        // Snapshot current before anything else: every thread that might
        // still reach the allocation entered at this epoch or earlier, and
        // none of those epochs can be latched while the caller's guard is
        // held.
        let epoch = self.current.load(Ordering::Acquire);

        let record = Box::into_raw(Box::new(GarbageNode {
            garbage,
            next: ptr::null_mut(),
        }));

        // SAFETY: see enter; the snapshot epoch outlives this call.
        let epoch_ref = unsafe { &*epoch };
        let list = &epoch_ref.garbage_head;

        let mut head = list.load(Ordering::Acquire);
        loop {
            unsafe { (*record).next = head };

            match list.compare_exchange(head, record, Ordering::Release, Ordering::Acquire) {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Frees every quiesced epoch from the head of the list.
    ///
    /// Single-collector only; `perform_gc_cycle` and the teardown serialize
    /// their calls.
    fn collect(&self) {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let current = self.current.load(Ordering::Acquire);

            // The newest epoch is never collected; during teardown `current`
            // is null and the chain drains completely.
            if head == current {
                break;
            }

            let head_ref = unsafe { &*head };

            // Latch: from here on every fetch_add on this node returns a
            // negative value, bouncing late arrivals to the newer epoch.
            if head_ref
                .active
                .compare_exchange(0, LATCHED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // Live threads remain in the oldest epoch; nothing newer can
                // be quiesced either.
                break;
            }

            let mut record = head_ref.garbage_head.load(Ordering::Acquire);
            while !record.is_null() {
                // SAFETY: records were published with release CASes and no
                // worker can reach this epoch's list anymore.
                let boxed = unsafe { Box::from_raw(record) };
                drop(unsafe { Box::from_raw(boxed.garbage) });
                self.nodes_freed.fetch_add(1, Ordering::Relaxed);
                record = boxed.next;
            }

            let next = head_ref.next.load(Ordering::Acquire);

            // SAFETY: latched and drained; the collector is the unique
            // deleter of epoch nodes.
            drop(unsafe { Box::from_raw(head) });
            self.epochs_freed.fetch_add(1, Ordering::Relaxed);

            self.head.store(next, Ordering::Relaxed);
        }
    }

    /// Publishes a fresh epoch as the successor of the current one.
    fn advance(&self) {
        let fresh = EpochNode::allocate();

        let current = self.current.load(Ordering::Relaxed);
        // SAFETY: only the collector writes the successor link, and the
        // current node is alive by definition.
        unsafe { (*current).next.store(fresh, Ordering::Release) };

        // Release: a worker that acquires the new pointer sees a fully
        // initialized node.
        self.current.store(fresh, Ordering::Release);
        self.epochs_created.fetch_add(1, Ordering::Relaxed);
    }

    fn perform_gc_cycle(&self) {
        assert!(
            !self.gc_active.swap(true, Ordering::Acquire),
            "concurrent GC cycle: at most one collector may run at a time"
        );

        self.collect();
        self.advance();

        self.gc_active.store(false, Ordering::Release);
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
        self.perform_gc_cycle();
    }

    fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }
}

/// An entered epoch; dropping the guard leaves it.
///
/// While any guard on an epoch exists, neither that epoch's garbage nor the
/// garbage of any later epoch is freed. The guard is tied to the manager's
/// lifetime and is neither `Send` nor `Sync`; it represents one thread's
/// presence in one critical section.
#[must_use]
pub struct EpochGuard<'a, G> {
    epoch: *const EpochNode<G>,
    em: &'a GlobalWriteEm<G>,
    _not_send: PhantomData<*mut ()>,
}

impl<G> Drop for EpochGuard<'_, G> {
    fn drop(&mut self) {
        self.em.shared.leave(self.epoch);
    }
}

/// Final reclamation counters of a [`GlobalWriteEm`], returned by
/// [`GlobalWriteEm::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalEmStats {
    /// Payloads freed over the manager's lifetime, teardown included.
    pub nodes_freed: u64,
    /// Epoch nodes created, the initial one included.
    pub epochs_created: u64,
    /// Epoch nodes reclaimed; equals `epochs_created` after teardown.
    pub epochs_freed: u64,
}

/// Reference-counted epoch-list manager.
///
/// Critical sections bracket themselves with [`enter`](Self::enter) (the
/// returned guard leaves on drop) and surrender detached nodes through
/// [`retire`](Self::retire). A background collector (internal via
/// [`start_collector`](Self::start_collector), or an external thread driving
/// [`perform_gc_cycle`](Self::perform_gc_cycle)) frees each epoch's garbage
/// once the epoch has quiesced.
///
/// `enter` is lock-free but not wait-free: its retry loop is bounded in
/// practice by the number of GC cycles that overlap the call. That trade is
/// the price of the scheme's simplicity.
///
/// # Example
///
/// ```rust
/// use quiesce_memory::GlobalWriteEm;
///
/// let em: GlobalWriteEm<u64> = GlobalWriteEm::new();
/// em.start_collector();
///
/// {
///     let _guard = em.enter();
///     let detached = Box::into_raw(Box::new(3u64));
///     // ... unlink `detached` from the shared structure, then:
///     unsafe { em.retire(detached) };
/// }
///
/// drop(em); // joins the collector and drains the epoch chain
/// ```
pub struct GlobalWriteEm<G> {
    shared: Arc<Shared<G>>,

    /// Handle of the internal collector, when one was started.
    #[cfg(not(all(feature = "loom", loom)))]
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<G> GlobalWriteEm<G> {
    /// Creates a manager whose epoch list holds a single quiescent epoch.
    pub fn new() -> Self {
        let initial = EpochNode::allocate();

        Self {
            shared: Arc::new(Shared {
                current: Padded::new(AtomicPtr::new(initial)),
                head: AtomicPtr::new(initial),
                exited: AtomicBool::new(false),
                interval_ms: AtomicU64::new(DEFAULT_GC_INTERVAL_MS),
                gc_active: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                nodes_freed: AtomicU64::new(0),
                epochs_created: AtomicU64::new(1),
                epochs_freed: AtomicU64::new(0),
                #[cfg(debug_assertions)]
                epoch_joins: AtomicU64::new(0),
                #[cfg(debug_assertions)]
                epoch_leaves: AtomicU64::new(0),
            }),
            #[cfg(not(all(feature = "loom", loom)))]
            handle: Mutex::new(None),
        }
    }

    /// Enters the current epoch.
    ///
    /// Memory retired during or after this epoch is not freed until the
    /// returned guard (and every other guard on the epoch) is dropped.
    pub fn enter(&self) -> EpochGuard<'_, G> {
        EpochGuard {
            epoch: self.shared.enter(),
            em: self,
            _not_send: PhantomData,
        }
    }

    /// Surrenders a detached allocation to the current epoch's garbage list.
    ///
    /// # Safety
    ///
    /// - `garbage` must originate from `Box::into_raw` and must not be
    ///   retired twice.
    /// - The caller must hold an [`EpochGuard`], and `garbage` must already
    ///   be unreachable for threads entering from now on (the CAS that
    ///   unlinked it must carry release ordering).
    pub unsafe fn retire(&self, garbage: *mut G) {
        unsafe { self.shared.retire(garbage) }
    }

    /// Runs one full GC cycle: collect quiesced epochs, then publish a fresh
    /// one.
    ///
    /// # Panics
    ///
    /// Panics if another cycle is running; the single-collector invariant is
    /// a hard contract.
    pub fn perform_gc_cycle(&self) {
        self.shared.perform_gc_cycle();
    }

    /// Index of the current epoch (epochs created so far minus one).
    /// Debugging aid.
    pub fn current_epoch(&self) -> Epoch {
        self.shared.epochs_created.load(Ordering::Relaxed) - 1
    }

    /// Sets the pause between internal collector cycles, in milliseconds.
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
    pub fn has_exited(&self) -> bool {
        self.shared.has_exited()
    }

    /// Payloads freed so far. Debugging aid.
    pub fn nodes_freed(&self) -> u64 {
        self.shared.nodes_freed.load(Ordering::Relaxed)
    }

    /// Epoch nodes created so far, the initial one included.
    pub fn epochs_created(&self) -> u64 {
        self.shared.epochs_created.load(Ordering::Relaxed)
    }

    /// Epoch nodes reclaimed so far.
    pub fn epochs_freed(&self) -> u64 {
        self.shared.epochs_freed.load(Ordering::Relaxed)
    }

    /// Successful `enter` calls so far. Debug builds only.
    #[cfg(debug_assertions)]
    pub fn epoch_joins(&self) -> u64 {
        self.shared.epoch_joins.load(Ordering::Relaxed)
    }

    /// Guard drops so far. Debug builds only.
    #[cfg(debug_assertions)]
    pub fn epoch_leaves(&self) -> u64 {
        self.shared.epoch_leaves.load(Ordering::Relaxed)
    }

    /// Tears the manager down and returns the final counters.
    ///
    /// Equivalent to dropping it: joins the internal collector (after
    /// signalling exit); when no internal collector was started, requires
    /// that [`signal_exit`](Self::signal_exit) was already called and any
    /// external collector joined. The epoch chain is then drained
    /// unconditionally.
    pub fn shutdown(self) -> GlobalEmStats {
        self.shutdown_in_place();
        GlobalEmStats {
            nodes_freed: self.shared.nodes_freed.load(Ordering::Relaxed),
            epochs_created: self.shared.epochs_created.load(Ordering::Relaxed),
            epochs_freed: self.shared.epochs_freed.load(Ordering::Relaxed),
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

        // With no workers left, retire the current pointer so collect drains
        // the whole chain, the once-current epoch included.
        self.shared.current.store(ptr::null_mut(), Ordering::Relaxed);
        self.shared.collect();

        assert!(
            self.shared.head.load(Ordering::Relaxed).is_null(),
            "epoch chain not drained: a guard outlived the manager"
        );

        #[cfg(debug_assertions)]
        eprintln!(
            "global-write reclaimer torn down: nodes_freed = {}, epochs = {}/{} created/freed, \
             joins = {}, leaves = {}",
            self.shared.nodes_freed.load(Ordering::Relaxed),
            self.shared.epochs_created.load(Ordering::Relaxed),
            self.shared.epochs_freed.load(Ordering::Relaxed),
            self.shared.epoch_joins.load(Ordering::Relaxed),
            self.shared.epoch_leaves.load(Ordering::Relaxed),
        );
    }
}

#[cfg(not(all(feature = "loom", loom)))]
impl<G: Send + 'static> GlobalWriteEm<G> {
    /// Starts the internal collector task.
    ///
    /// The task runs full GC cycles separated by the configured interval
    /// until [`signal_exit`](Self::signal_exit); dropping the manager signals
    /// and joins it.
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
            "quiesce-global-collector",
        ));
    }
}

impl<G> Default for GlobalWriteEm<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> Drop for GlobalWriteEm<G> {
    fn drop(&mut self) {
        self.shutdown_in_place();
    }
}
