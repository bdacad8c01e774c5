//! Epoch-Based Reclamation Managers
//!
//! Two cooperating schemes defer the physical free of detached nodes until no
//! thread can still hold a reference:
//!
//! - [`LocalWriteEm`]: workers announce the epoch they observed into per-core
//!   cache-line-isolated slots; the collector frees garbage retired strictly
//!   before the minimum announcement. The worker fast path is a single store.
//! - [`GlobalWriteEm`]: critical sections reference-count the current node of
//!   an epoch list; the collector frees an epoch's garbage once its count is
//!   latched at zero.
//!
//! Both managers optionally run an internal collector task (see
//! [`collector`]) that drives `advance`/`collect` cycles at a configurable
//! interval, and both support an external collector instead: signal exit,
//! wait for the external thread, then drop the manager.
//!
//! # Protocol
//!
//! ```text
//! worker                       collector
//! ------                       ---------
//! announce / enter             advance epoch
//! operate on shared data       read announcements -> lower bound
//! retire detached nodes        free garbage below the bound
//! ```
//!
//! Announcements use release stores; the collector reads them with acquire
//! loads. Retirement samples the epoch after the detachment became invisible
//! to new readers (the detaching CAS carries release), so the collector never
//! frees a record that a live announcement could still reach.

#[cfg(not(all(feature = "loom", loom)))]
pub(crate) mod collector;
pub mod global;
pub mod local;

pub use global::{EpochGuard, GlobalEmStats, GlobalWriteEm};
pub use local::{LocalEmStats, LocalWriteEm};

/// A point in the logical time of a reclamation manager.
///
/// Monotonically non-decreasing; wraparound of the 64-bit counter is not
/// handled (at one tick per 50 ms that is more than 29 billion years).
pub type Epoch = u64;
