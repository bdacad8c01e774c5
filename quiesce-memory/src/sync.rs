//! Atomic Type Selection for Model Checking
//!
//! Every atomic in the reclamation core is named through this module, so one
//! cfg switch decides whether the crate runs on real hardware atomics or on
//! Loom's instrumented ones. Under Loom, the announcement, retirement and
//! collection protocols are explored across all interleavings; otherwise the
//! re-exports compile away entirely.
//!
//! # Loom Integration
//!
//! ```bash
//! RUSTFLAGS="--cfg loom" cargo test --features loom --test loom_verification --release
//! ```
//!
//! Both the `loom` feature and the `--cfg loom` flag are required, so a plain
//! `cargo build --all-features` never drags model-checking types into a
//! production binary.

#[cfg(all(feature = "loom", loom))]
pub mod atomic {
    //! Loom's instrumented atomics; every ordering is tracked by the model
    //! checker.

    pub use loom::sync::atomic::{
        fence, AtomicBool, AtomicI64, AtomicPtr, AtomicU64, AtomicUsize, Ordering,
    };
}

#[cfg(not(all(feature = "loom", loom)))]
pub mod atomic {
    //! Hardware atomics; zero-cost re-exports of `std::sync::atomic`.

    pub use std::sync::atomic::{
        fence, AtomicBool, AtomicI64, AtomicPtr, AtomicU64, AtomicUsize, Ordering,
    };
}

#[cfg(test)]
mod tests {
    use super::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_selected_atomics_are_usable() {
        #[cfg(all(feature = "loom", loom))]
        loom::model(|| {
            let epoch = AtomicU64::new(0);
            assert_eq!(epoch.fetch_add(1, Ordering::Relaxed), 0);
            assert_eq!(epoch.load(Ordering::Acquire), 1);
        });

        #[cfg(not(all(feature = "loom", loom)))]
        {
            let epoch = AtomicU64::new(0);
            assert_eq!(epoch.fetch_add(1, Ordering::Relaxed), 0);
            assert_eq!(epoch.load(Ordering::Acquire), 1);
        }
    }
}
