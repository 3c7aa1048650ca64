//! # BackOff
//!
//! Paces the busy-wait of a contended lock. Each [`BackOff::wait`] issues a
//! run of [`core::hint::spin_loop`] hints that doubles in length up to the
//! configured limit, so a waiter that keeps finding the lock held puts less
//! and less pressure on the memory system.
//!
//! With the `std` feature, once a step grows past the yield threshold the
//! thread also calls [`std::thread::yield_now`]. That only matters for
//! hosted ports; on bare metal there is nobody to yield to.
//!
//! ## Example
//! ```rust
//! use word_spinlock::BackOff;
//!
//! let backoff = BackOff::new();
//! let mut tries = 0;
//! loop {
//!     tries += 1;
//!     if tries == 3 {
//!         break;
//!     }
//!     backoff.wait();
//! }
//! assert_eq!(backoff.waits(), 2);
//! ```

use core::{cell::Cell, hint::spin_loop};

use crate::config::LockConfig;

/// Exponential spin pacing for one waiter.
///
/// Not `Sync`: every waiter owns its own `BackOff`.
pub struct BackOff {
    spin: Cell<u32>,
    waits: Cell<u32>,
    start: u32,
    limit: u32,
    #[cfg_attr(not(feature = "std"), allow(dead_code))]
    yield_threshold: u32,
}

impl BackOff {
    /// Creates a [`BackOff`] with [`LockConfig::DEFAULT`] parameters.
    #[inline(always)]
    pub const fn new() -> Self {
        Self::with_config(&LockConfig::DEFAULT)
    }

    /// Creates a [`BackOff`] using the step sizes from `config`.
    #[inline(always)]
    pub const fn with_config(config: &LockConfig) -> Self {
        Self {
            spin: Cell::new(config.backoff_start),
            waits: Cell::new(0),
            start: config.backoff_start,
            limit: config.backoff_limit,
            yield_threshold: config.yield_threshold,
        }
    }

    /// Spins for the current step, then doubles the next step (capped).
    #[inline(always)]
    pub fn wait(&self) {
        let end = self.spin.get();

        for _ in 0..end {
            spin_loop();
        }

        self.spin.set(end.saturating_mul(2).min(self.limit));
        self.waits.set(self.waits.get().saturating_add(1));

        #[cfg(feature = "std")]
        if end > self.yield_threshold {
            if end / 2 <= self.yield_threshold {
                log::trace!("backoff passed {} spins, yielding", self.yield_threshold);
            }
            std::thread::yield_now();
        }
    }

    /// Spin count the next [`wait`](BackOff::wait) will issue.
    #[inline(always)]
    pub fn current(&self) -> u32 {
        self.spin.get()
    }

    /// Number of [`wait`](BackOff::wait) calls since creation or the last reset.
    #[inline(always)]
    pub fn waits(&self) -> u32 {
        self.waits.get()
    }

    /// Returns to the starting step.
    #[inline(always)]
    pub fn reset(&self) {
        self.spin.set(self.start);
        self.waits.set(0);
    }
}

impl Default for BackOff {
    fn default() -> Self {
        Self::new()
    }
}
