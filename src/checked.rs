//! # CheckedSpinLock
//!
//! A hardened variant of [`RawSpinLock`](crate::RawSpinLock) that stores the
//! holder's [`ContextId`] in the lock word instead of a bare `1`. Knowing the
//! holder lets it reject reentrant acquisition and foreign releases, and the
//! bounded forms of `acquire` give up with an error instead of spinning
//! forever.
//!
//! Context ids must be unique among the contexts sharing one lock.
//!
//! ```rust
//! use word_spinlock::{CheckedSpinLock, ContextId, LockError};
//!
//! let lock = CheckedSpinLock::new();
//! let a = ContextId::new(1).unwrap();
//! let b = ContextId::new(2).unwrap();
//!
//! lock.acquire(a).unwrap();
//! assert_eq!(lock.acquire(a), Err(LockError::Reentrant { holder: a }));
//! assert_eq!(lock.release(b), Err(LockError::NotOwner { holder: a, caller: b }));
//! lock.release(a).unwrap();
//! ```

use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crate::backoff::BackOff;
use crate::clock::Clock;
use crate::config::LockConfig;
use crate::context::ContextId;
use crate::error::LockError;
use crate::raw::UNLOCKED;
use crate::word::AtomicWord;

/// Spinlock that tracks its holder and reports misuse.
#[derive(Debug)]
pub struct CheckedSpinLock {
    word: AtomicWord,
    config: LockConfig,
}

impl CheckedSpinLock {
    /// Creates an unlocked lock with [`LockConfig::DEFAULT`].
    pub const fn new() -> Self {
        Self::with_config(LockConfig::DEFAULT)
    }

    /// Creates an unlocked lock with custom backoff and retry budget.
    pub const fn with_config(config: LockConfig) -> Self {
        Self {
            word: AtomicWord::new(UNLOCKED),
            config,
        }
    }

    /// The configuration this lock was built with.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// The current holder, if any. May be stale by the time it is used.
    pub fn holder(&self) -> Option<ContextId> {
        ContextId::new(self.word.load(Relaxed))
    }

    /// Spins until `id` holds the lock.
    ///
    /// Fails only with [`LockError::Reentrant`]; contention is waited out.
    pub fn acquire(&self, id: ContextId) -> Result<(), LockError> {
        self.acquire_with(id, |_| None)
    }

    /// Like [`acquire`](Self::acquire) but gives up after
    /// [`LockConfig::retry_budget`] attempts with
    /// [`LockError::ContentionExhausted`].
    pub fn acquire_bounded(&self, id: ContextId) -> Result<(), LockError> {
        let budget = self.config.retry_budget;
        self.acquire_with(id, |attempts| {
            (attempts >= budget).then_some(LockError::ContentionExhausted { attempts })
        })
    }

    /// Like [`acquire`](Self::acquire) but gives up once `clock` reaches
    /// `deadline`, with [`LockError::Timeout`].
    pub fn acquire_until<C: Clock>(
        &self,
        id: ContextId,
        clock: C,
        deadline: u64,
    ) -> Result<(), LockError> {
        let start = clock.now();
        self.acquire_with(id, |_| {
            let now = clock.now();
            (now >= deadline).then(|| LockError::Timeout {
                waited: now.saturating_sub(start),
            })
        })
    }

    /// A single attempt. `Ok(false)` means another context holds the lock.
    pub fn try_acquire(&self, id: ContextId) -> Result<bool, LockError> {
        loop {
            let r = self.word.reserve(Acquire);
            match r.observed() {
                UNLOCKED => {
                    if self.word.commit(r, id.get(), AcqRel) {
                        return Ok(true);
                    }
                }
                held if held == id.get() => return Err(self.reentrant(id)),
                _ => return Ok(false),
            }
        }
    }

    /// Releases the lock held by `id`.
    ///
    /// A lock held by someone else, or by nobody, is left untouched and the
    /// misuse is reported.
    pub fn release(&self, id: ContextId) -> Result<(), LockError> {
        loop {
            let r = self.word.reserve(Relaxed);
            match ContextId::new(r.observed()) {
                None => {
                    log::error!("context {} released an unlocked lock", id);
                    return Err(LockError::NotLocked { caller: id });
                }
                Some(holder) if holder != id => {
                    log::error!("context {} released a lock held by {}", id, holder);
                    return Err(LockError::NotOwner { holder, caller: id });
                }
                Some(_) => {
                    if self.word.commit(r, UNLOCKED, Release) {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn acquire_with(
        &self,
        id: ContextId,
        mut give_up: impl FnMut(u32) -> Option<LockError>,
    ) -> Result<(), LockError> {
        let backoff = BackOff::with_config(&self.config);
        let mut attempts = 0u32;
        loop {
            let r = self.word.reserve(Acquire);
            match r.observed() {
                UNLOCKED => {
                    if self.word.commit(r, id.get(), AcqRel) {
                        return Ok(());
                    }
                }
                held if held == id.get() => return Err(self.reentrant(id)),
                _ => backoff.wait(),
            }

            attempts = attempts.saturating_add(1);
            if let Some(err) = give_up(attempts) {
                log::warn!("context {} gave up on lock: {}", id, err);
                return Err(err);
            }
        }
    }

    fn reentrant(&self, id: ContextId) -> LockError {
        log::error!("context {} tried to re-acquire a lock it holds", id);
        LockError::Reentrant { holder: id }
    }
}

impl Default for CheckedSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    fn id(n: u32) -> ContextId {
        ContextId::new(n).unwrap()
    }

    /// Advances a fixed step on every read.
    struct SteppingClock {
        now: Cell<u64>,
        step: u64,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> u64 {
            let t = self.now.get();
            self.now.set(t + self.step);
            t
        }
    }

    #[test]
    fn holder_is_tracked() {
        let lock = CheckedSpinLock::new();
        assert_eq!(lock.holder(), None);

        lock.acquire(id(4)).unwrap();
        assert_eq!(lock.holder(), Some(id(4)));

        lock.release(id(4)).unwrap();
        assert_eq!(lock.holder(), None);
    }

    #[test]
    fn reentrant_acquire_is_rejected_not_deadlocked() {
        let lock = CheckedSpinLock::new();
        lock.acquire(id(1)).unwrap();

        assert_eq!(lock.acquire(id(1)), Err(LockError::Reentrant { holder: id(1) }));
        assert_eq!(lock.try_acquire(id(1)), Err(LockError::Reentrant { holder: id(1) }));
        assert_eq!(lock.holder(), Some(id(1)), "rejection must keep the original holder");
    }

    #[test]
    fn foreign_and_double_release_are_rejected() {
        let lock = CheckedSpinLock::new();
        lock.acquire(id(1)).unwrap();

        assert_eq!(
            lock.release(id(2)),
            Err(LockError::NotOwner { holder: id(1), caller: id(2) })
        );
        assert!(lock.holder().is_some());

        lock.release(id(1)).unwrap();
        assert_eq!(lock.release(id(1)), Err(LockError::NotLocked { caller: id(1) }));
    }

    #[test]
    fn try_acquire_reports_contention() {
        let lock = CheckedSpinLock::new();
        assert_eq!(lock.try_acquire(id(1)), Ok(true));
        assert_eq!(lock.try_acquire(id(2)), Ok(false));
        assert_eq!(lock.holder(), Some(id(1)));
    }

    #[test]
    fn bounded_acquire_exhausts_budget() {
        let cfg = LockConfig::DEFAULT.with_backoff(1, 8).with_retry_budget(10);
        let lock = CheckedSpinLock::with_config(cfg);
        lock.acquire(id(1)).unwrap();

        assert_eq!(
            lock.acquire_bounded(id(2)),
            Err(LockError::ContentionExhausted { attempts: 10 })
        );
        assert_eq!(lock.holder(), Some(id(1)));
    }

    #[test]
    fn bounded_acquire_succeeds_when_free() {
        let lock = CheckedSpinLock::with_config(LockConfig::DEFAULT.with_retry_budget(1));
        assert_eq!(lock.acquire_bounded(id(3)), Ok(()));
    }

    #[test]
    fn deadline_turns_starvation_into_timeout() {
        let lock = CheckedSpinLock::with_config(LockConfig::DEFAULT.with_backoff(1, 4));
        lock.acquire(id(1)).unwrap();

        let clock = SteppingClock { now: Cell::new(100), step: 5 };
        let err = lock.acquire_until(id(2), &clock, 120).unwrap_err();

        match err {
            LockError::Timeout { waited } => assert!(waited >= 20),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[cfg(feature = "std")]
    #[test]
    fn holders_exclude_each_other_across_threads() {
        use std::thread;

        let lock = CheckedSpinLock::new();
        let inside = core::sync::atomic::AtomicU32::new(0);

        thread::scope(|s| {
            for n in 1..=4 {
                let (lock, inside) = (&lock, &inside);
                s.spawn(move || {
                    for _ in 0..2_000 {
                        lock.acquire(id(n)).unwrap();
                        assert_eq!(inside.fetch_add(1, Relaxed), 0);
                        inside.fetch_sub(1, Relaxed);
                        lock.release(id(n)).unwrap();
                    }
                });
            }
        });

        assert_eq!(lock.holder(), None);
    }
}
