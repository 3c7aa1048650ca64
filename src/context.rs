//! # Execution contexts
//!
//! An [`ExecutionContext`] is a "pseudo-thread": an identity plus a fixed
//! number of protected increments it performs against a shared counter. The
//! [`Harness`] drives a set of contexts one after another, interleaved one
//! critical section at a time, or (with `std`) on real threads, and checks
//! the oracle: the counter grew by exactly the sum of all increments.
//!
//! ```rust
//! use word_spinlock::{ContextId, ExecutionContext, Harness, SpinLock};
//!
//! let counter = SpinLock::new(0u64);
//! let contexts = [
//!     ExecutionContext::new(ContextId::new(1).unwrap(), 5),
//!     ExecutionContext::new(ContextId::new(2).unwrap(), 5),
//! ];
//!
//! let report = Harness::new(&contexts).run_sequential(&counter);
//! assert_eq!(report.verify(), Ok(10));
//! ```

use core::cell::UnsafeCell;
use core::fmt;
use core::num::NonZeroU32;

use crate::error::HarnessError;
use crate::raw::RawSpinLock;
use crate::spinlock::SpinLock;

/// Identity of an execution context. Zero is reserved for "no holder".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(NonZeroU32);

impl ContextId {
    /// Returns `None` for zero.
    #[inline]
    pub const fn new(id: u32) -> Option<Self> {
        match NonZeroU32::new(id) {
            Some(id) => Some(ContextId(id)),
            None => None,
        }
    }

    /// The raw non-zero id.
    #[inline(always)]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State that can be bumped under its guarding lock.
pub trait Counter {
    /// One critical section: acquire, add one, release.
    fn increment(&self);

    /// Current value, read under the lock.
    fn read(&self) -> u64;
}

impl Counter for SpinLock<u64> {
    #[inline]
    fn increment(&self) {
        *self.lock() += 1;
    }

    #[inline]
    fn read(&self) -> u64 {
        *self.lock()
    }
}

/// A counter guarded by a [`RawSpinLock`] it references but does not own.
///
/// Every access goes through `acquire` / `release` on that lock; the value is
/// never touched outside it.
pub struct SharedCounter<'l> {
    lock: &'l RawSpinLock,
    value: UnsafeCell<u64>,
}

impl<'l> SharedCounter<'l> {
    /// A zeroed counter guarded by `lock`.
    pub const fn new(lock: &'l RawSpinLock) -> Self {
        Self {
            lock,
            value: UnsafeCell::new(0),
        }
    }

    /// The lock guarding this counter.
    pub fn lock(&self) -> &'l RawSpinLock {
        self.lock
    }

    /// Reads the value without locking; `&mut self` rules out running contexts.
    pub fn get_mut(&mut self) -> &mut u64 {
        self.value.get_mut()
    }
}

impl Counter for SharedCounter<'_> {
    #[inline]
    fn increment(&self) {
        self.lock.acquire();
        // SAFETY: `value` is only accessed while `lock` is held.
        unsafe { *self.value.get() += 1 };
        // SAFETY: acquired above.
        unsafe { self.lock.release() };
    }

    #[inline]
    fn read(&self) -> u64 {
        // SAFETY: read while holding `lock`.
        self.lock.with(|| unsafe { *self.value.get() })
    }
}

// Safety: the value is only reached through the referenced lock.
unsafe impl Sync for SharedCounter<'_> {}

/// A pseudo-thread performing `increments` protected increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    id: ContextId,
    increments: u32,
}

impl ExecutionContext {
    /// A context performing `increments` critical sections.
    pub const fn new(id: ContextId, increments: u32) -> Self {
        Self { id, increments }
    }

    /// This context's identity.
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Number of critical sections [`run`](Self::run) performs.
    pub const fn increments(&self) -> u32 {
        self.increments
    }

    /// Runs the whole loop to completion.
    pub fn run<C: Counter + ?Sized>(&self, counter: &C) {
        for _ in 0..self.increments {
            counter.increment();
        }
    }
}

/// Result of one harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Sum of every context's increments.
    pub expected: u64,
    /// How far the counter actually moved.
    pub observed: u64,
}

impl RunReport {
    /// `Ok(observed)` when no update was lost or doubled.
    pub fn verify(&self) -> Result<u64, HarnessError> {
        if self.expected == self.observed {
            Ok(self.observed)
        } else {
            Err(HarnessError::LostUpdates {
                expected: self.expected,
                observed: self.observed,
            })
        }
    }
}

/// Drives a fixed set of contexts against one counter.
#[derive(Debug, Clone, Copy)]
pub struct Harness<'c> {
    contexts: &'c [ExecutionContext],
}

impl<'c> Harness<'c> {
    /// A harness over `contexts`; ids are not checked for uniqueness.
    pub const fn new(contexts: &'c [ExecutionContext]) -> Self {
        Self { contexts }
    }

    /// Sum of all contexts' increments.
    pub fn expected(&self) -> u64 {
        self.contexts.iter().map(|c| u64::from(c.increments)).sum()
    }

    /// Each context runs to completion before the next one starts.
    pub fn run_sequential<C: Counter + ?Sized>(&self, counter: &C) -> RunReport {
        log::debug!("sequential run of {} contexts", self.contexts.len());
        let before = counter.read();
        for ctx in self.contexts {
            ctx.run(counter);
            log::trace!("context {} finished", ctx.id);
        }
        self.report(before, counter.read())
    }

    /// Round-robin: each round gives every unfinished context one critical
    /// section.
    pub fn run_interleaved<C: Counter + ?Sized>(&self, counter: &C) -> RunReport {
        log::debug!("interleaved run of {} contexts", self.contexts.len());
        let before = counter.read();
        let rounds = self.contexts.iter().map(|c| c.increments).max().unwrap_or(0);
        for round in 0..rounds {
            for ctx in self.contexts.iter().filter(|c| round < c.increments) {
                counter.increment();
                if round + 1 == ctx.increments {
                    log::trace!("context {} finished", ctx.id);
                }
            }
        }
        self.report(before, counter.read())
    }

    /// One OS thread per context.
    #[cfg(feature = "std")]
    pub fn run_threaded<C: Counter + Sync + ?Sized>(&self, counter: &C) -> RunReport {
        log::debug!("threaded run of {} contexts", self.contexts.len());
        let before = counter.read();
        std::thread::scope(|s| {
            for ctx in self.contexts {
                s.spawn(move || ctx.run(counter));
            }
        });
        self.report(before, counter.read())
    }

    fn report(&self, before: u64, after: u64) -> RunReport {
        let report = RunReport {
            expected: self.expected(),
            observed: after.wrapping_sub(before),
        };
        if report.verify().is_err() {
            log::error!(
                "lost updates: expected {} observed {}",
                report.expected,
                report.observed
            );
        }
        report
    }
}
