//! Thread Affinity Helpers
//!
//! The local-write manager's announcement slots are per-core; pinning worker
//! threads keeps a thread's slot index stable and its counter resident in one
//! L1 cache. Linux-only; on other platforms the helpers degrade to no-ops so
//! benchmarks still run (unpinned).

/// The core the calling thread is currently running on, or -1 when the
/// platform cannot tell.
#[cfg(target_os = "linux")]
pub fn current_core() -> i32 {
    // SAFETY: sched_getcpu has no preconditions.
    unsafe { libc::sched_getcpu() }
}

/// See the Linux implementation; always -1 here.
#[cfg(not(target_os = "linux"))]
pub fn current_core() -> i32 {
    -1
}

/// Pins the calling thread to `core_id`. Returns whether the kernel accepted
/// the mask.
#[cfg(target_os = "linux")]
pub fn pin_to_core(core_id: usize) -> bool {
    // SAFETY: the cpu_set_t is zero-initialized and manipulated only through
    // the libc macros; pthread_self is always valid.
    unsafe {
        let mut cpu_set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut cpu_set);
        libc::CPU_SET(core_id, &mut cpu_set);

        libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpu_set,
        ) == 0
    }
}

/// See the Linux implementation; always `false` here.
#[cfg(not(target_os = "linux"))]
pub fn pin_to_core(_core_id: usize) -> bool {
    false
}

/// Hardware concurrency, counting hyper-threads as distinct cores.
pub fn core_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
