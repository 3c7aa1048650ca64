//! # word-spinlock 🌀
//!
//! A **`no_std`** spinlock built from a single atomic word, for single-core
//! bare-metal targets where concurrency comes from sequential "pseudo-threads"
//! and from interrupt handlers preempting them.
//!
//! The crate includes:
//!
//! - [`AtomicWord`]: the reserve/commit (load-reserved / store-conditional) primitive.
//! - [`RawSpinLock`]: acquire / try_acquire / release on one word, no data attached.
//! - [`SpinLock<T>`]: the same lock owning its data behind an RAII guard.
//! - [`CheckedSpinLock`]: tracks the holder; rejects reentrancy and foreign
//!   releases, and can give up after a retry budget or a deadline.
//! - [`InterruptMask`] and [`SpinLock::lock_masked`]: mask an interrupt source
//!   for as long as the lock is held.
//! - [`ExecutionContext`] and [`Harness`]: pseudo-threads incrementing a shared
//!   counter, and the "no lost updates" oracle.
//!
//! ## ✨ Features
//!
//! - ✅ `no_std` (uses `core` only)
//! - ⚙️ Optional `std` feature: thread yielding in [`BackOff`], [`StdClock`],
//!   threaded harness runs, `std::error::Error` impls
//! - 🧩 RISC-V backends for the interrupt mask (`mie`) and clock (`time`)
//!
//! ## 🚀 Quick Example
//!
//! ```rust
//! use word_spinlock::{ContextId, ExecutionContext, Harness, RawSpinLock, SharedCounter};
//!
//! let lock = RawSpinLock::new();
//! let counter = SharedCounter::new(&lock);
//!
//! let threads = [
//!     ExecutionContext::new(ContextId::new(1).unwrap(), 5),
//!     ExecutionContext::new(ContextId::new(2).unwrap(), 5),
//! ];
//! let report = Harness::new(&threads).run_sequential(&counter);
//! assert_eq!(report.verify(), Ok(10));
//! ```
//!
//! ## 🧠 Design
//!
//! The lock word is `0` when free and `1` when held. `acquire` reserves the
//! word with acquire ordering; if it is held it backs off and reserves again
//! without attempting a write, and only a free word is followed by a commit
//! (acquire-release). `release` is a plain release store of `0`. The
//! release/acquire pair on the word is the only ordering the lock provides.
//!
//! ## ⚠️ Safety & Usage Notes
//!
//! - Short critical sections only; waiters burn their whole time slice.
//! - Not reentrant. [`RawSpinLock`] and [`SpinLock`] deadlock on a second
//!   acquire by the holder; [`CheckedSpinLock`] reports it instead.
//! - A lock shared with an interrupt handler on the same core **must** be taken
//!   with the interrupt masked ([`SpinLock::lock_masked`] /
//!   [`RawSpinLock::with_masked`]); otherwise the handler can preempt the holder
//!   and spin forever.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(test, not(feature = "std")))]
extern crate std;

pub mod backoff;
pub mod checked;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod irq;
pub mod raw;
pub mod spinlock;
pub mod word;

pub use backoff::BackOff;
pub use checked::CheckedSpinLock;
pub use clock::Clock;
#[cfg(feature = "std")]
pub use clock::StdClock;
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use clock::TimeCsr;
pub use config::LockConfig;
pub use context::{ContextId, Counter, ExecutionContext, Harness, RunReport, SharedCounter};
pub use error::{HarnessError, LockError};
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use irq::MachineInterrupts;
pub use irq::{InterruptMask, IrqSet, IrqSource, MaskState, MaskedGuard, SimulatedInterrupts};
pub use raw::RawSpinLock;
pub use spinlock::{SpinGuard, SpinLock};
pub use word::{AtomicWord, Reservation};
