//! # SpinLock
//!
//! A data-owning spinlock built on [`RawSpinLock`]. The protected value lives
//! inside the lock and is reachable only through a [`SpinGuard`], so "mutate
//! only while held" is enforced by the type system instead of by convention.
//!
//! ## Example
//! ```rust
//! use word_spinlock::SpinLock;
//!
//! static COUNTER: SpinLock<u32> = SpinLock::new(0);
//!
//! fn increment() {
//!     let mut guard = COUNTER.lock();
//!     *guard += 1;
//! }
//!
//! increment();
//! assert_eq!(*COUNTER.lock(), 1);
//! ```
//!
//! ## Safety
//! - The `SpinLock` is **not fair**; starvation is possible under heavy contention.
//! - It is **not reentrant**: locking twice from the same context deadlocks.
//! - Shared with an interrupt handler on the same core, it must be taken with
//!   [`SpinLock::lock_masked`] instead of [`SpinLock::lock`].

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::config::LockConfig;
use crate::raw::RawSpinLock;

/// A spin-based mutual exclusion primitive owning the data it protects.
pub struct SpinLock<T> {
    raw: RawSpinLock,
    data: UnsafeCell<T>,
}

/// A guard that releases the [`SpinLock`] when dropped.
#[must_use = "if unused the SpinLock will immediately unlock"]
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Drop for SpinGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: a guard only exists while its lock is held.
        unsafe { self.lock.raw.release() }
    }
}

impl<T> SpinLock<T> {
    /// Creates a new, unlocked [`SpinLock`] wrapping the given data.
    #[inline(always)]
    pub const fn new(data: T) -> Self {
        SpinLock {
            raw: RawSpinLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Like [`new`](Self::new), with waiters backing off per `config`.
    #[inline(always)]
    pub const fn with_config(data: T, config: LockConfig) -> Self {
        SpinLock {
            raw: RawSpinLock::with_config(config),
            data: UnsafeCell::new(data),
        }
    }

    /// The configuration of the underlying lock.
    #[inline(always)]
    pub fn config(&self) -> &LockConfig {
        self.raw.config()
    }

    /// Acquires the lock, spinning until it becomes available.
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_, T> {
        self.raw.acquire();
        SpinGuard { lock: self }
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// Returns `None` if the lock is held; the lock is left as it was.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        if self.raw.try_acquire() {
            Some(SpinGuard { lock: self })
        } else {
            None
        }
    }

    /// Checks whether the lock is currently held.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Runs a closure with exclusive access to the data.
    ///
    /// ```
    /// use word_spinlock::SpinLock;
    /// let lock = SpinLock::new(0i32);
    /// let after = lock.with_lock(|data| {
    ///     *data += 1;
    ///     *data
    /// });
    /// assert_eq!(after, 1);
    /// ```
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut *guard)
    }

    /// Mutable access without locking; the `&mut self` borrow proves exclusivity.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the lock and returns the data.
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("data", &&*guard).finish(),
            None => f.debug_struct("SpinLock").field("data", &"<locked>").finish(),
        }
    }
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { &*(self.lock.data.get()) }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

// Safety: SpinLock enforces mutual exclusion via atomic operations.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

#[cfg(test)]
mod test {
    use crate::SpinLock;

    #[test]
    fn test_basic_lock_unlock() {
        let lock = SpinLock::new(10);

        {
            let mut guard = lock.lock();
            *guard += 5;
            assert_eq!(*guard, 15);
        } // guard dropped here, automatically unlocks

        assert!(!lock.is_locked(), "Lock should be released after guard drop");
    }

    #[test]
    fn try_lock_fails_while_guard_alive() {
        let lock = SpinLock::new(42);

        let guard = lock.lock();
        assert!(lock.try_lock().is_none(), "Lock should not be acquirable while held");
        assert!(lock.is_locked());

        drop(guard);
        assert!(lock.try_lock().is_some(), "Lock should succeed after previous guard drop");
    }

    #[test]
    fn debug_does_not_block_on_held_lock() {
        use std::format;

        let lock = SpinLock::new(3u8);
        let _guard = lock.lock();
        assert_eq!(format!("{:?}", lock), "SpinLock { data: \"<locked>\" }");
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let lock = Arc::new(SpinLock::new(0usize));
        let mut handles = vec![];

        for _ in 0..8 {
            let lock_cloned = lock.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    let mut guard = lock_cloned.lock();
                    *guard += 1;
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let final_value = *lock.lock();
        assert_eq!(final_value, 8 * 10_000, "Counter should match total increments");
    }
    #[cfg(feature = "std")]
    #[test]
    fn configured_lock_counts_correctly() {
        use crate::LockConfig;
        use std::thread;

        let cfg = LockConfig::DEFAULT.with_backoff(1, 2);
        let lock = SpinLock::with_config(0usize, cfg);
        assert_eq!(lock.config().backoff_limit, 2);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        *lock.lock() += 1;
                    }
                });
            }
        });

        assert_eq!(lock.into_inner(), 4 * 10_000);
    }
}
