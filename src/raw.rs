//! # RawSpinLock
//!
//! The bare mutual-exclusion primitive: one [`AtomicWord`] holding
//! [`UNLOCKED`] or [`LOCKED`], with explicit `acquire` / `release` calls and no
//! data attached. [`SpinLock<T>`](crate::SpinLock) wraps it with an RAII guard.
//!
//! ## Acquire algorithm
//! Each round reserves the word. If it is already locked the waiter backs off
//! and reserves again without attempting a commit, so a visibly held lock is
//! polled with plain loads rather than write attempts. Only an observed
//! `UNLOCKED` is followed by a commit of `LOCKED`, and a failed commit simply
//! starts the next round.
//!
//! ## Contract
//! - Not reentrant. Calling [`acquire`](RawSpinLock::acquire) while already
//!   holding the lock spins forever.
//! - [`release`](RawSpinLock::release) performs no ownership check. Releasing a
//!   lock you do not hold breaks mutual exclusion for whoever does hold it,
//!   which is why it is `unsafe`.
//! - If an interrupt handler on the same core can take this lock, hold it
//!   through [`with_masked`](RawSpinLock::with_masked) or the handler may
//!   preempt the holder and spin forever.

use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

use crate::backoff::BackOff;
use crate::config::LockConfig;
use crate::word::AtomicWord;

/// Word value of a free lock.
pub const UNLOCKED: u32 = 0;
/// Word value of a held lock.
pub const LOCKED: u32 = 1;

/// A spinlock that guards no data of its own.
#[derive(Debug)]
pub struct RawSpinLock {
    word: AtomicWord,
    config: LockConfig,
}

impl RawSpinLock {
    /// Creates an unlocked lock.
    #[inline(always)]
    pub const fn new() -> Self {
        Self::with_config(LockConfig::DEFAULT)
    }

    /// Creates an unlocked lock whose waiters back off per `config`.
    ///
    /// Only the backoff fields apply; a plain acquire has no retry budget.
    #[inline(always)]
    pub const fn with_config(config: LockConfig) -> Self {
        Self {
            word: AtomicWord::new(UNLOCKED),
            config,
        }
    }

    /// The configuration this lock was built with.
    #[inline(always)]
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Spins until the lock moves from unlocked to locked under the caller.
    #[inline]
    pub fn acquire(&self) {
        let backoff = BackOff::with_config(&self.config);
        loop {
            let r = self.word.reserve(Acquire);
            if r.observed() != UNLOCKED {
                backoff.wait();
                continue;
            }
            if self.word.commit(r, LOCKED, AcqRel) {
                return;
            }
        }
    }

    /// One reserve/commit round. Never spins on a held lock.
    ///
    /// Returns `false` if the lock is held, leaving it untouched. A spurious
    /// commit failure on a free lock is retried, so `false` always means some
    /// other holder owns the lock.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        loop {
            let r = self.word.reserve(Acquire);
            if r.observed() != UNLOCKED {
                return false;
            }
            if self.word.commit(r, LOCKED, AcqRel) {
                return true;
            }
        }
    }

    /// Stores `UNLOCKED` with release ordering.
    ///
    /// # Safety
    /// The caller must currently hold the lock through a successful
    /// [`acquire`](RawSpinLock::acquire) or [`try_acquire`](RawSpinLock::try_acquire)
    /// that has not yet been released.
    #[inline(always)]
    pub unsafe fn release(&self) {
        self.word.store_release(UNLOCKED);
    }

    /// Checks whether the lock is currently held.
    ///
    /// The answer may be stale by the time the caller acts on it.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.word.load(Relaxed) != UNLOCKED
    }

    /// Runs `f` between an acquire and its matching release.
    ///
    /// The lock is released even if `f` panics.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        self.acquire();
        let _held = Held(self);
        f()
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the lock it was built from when dropped.
struct Held<'a>(&'a RawSpinLock);

impl Drop for Held<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        // SAFETY: only constructed right after a successful acquire.
        unsafe { self.0.release() }
    }
}
