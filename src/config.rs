//! Tuning knobs shared by the lock variants.
//!
//! Everything here is `const`-constructible so a lock living in a `static`
//! can carry its configuration without any runtime setup.

/// Maximum spin iteration limit for one backoff step.
pub const MAX_SPIN: u32 = 1 << 22;

/// Default number of spin hints issued by the first backoff step.
pub const START_SPIN: u32 = 1 << 5;

/// Spin count above which a `std` build also yields the thread.
pub const YIELD_THRESHOLD: u32 = 1 << 10;

/// Default number of reserve/commit attempts before the bounded acquire of
/// [`CheckedSpinLock`](crate::CheckedSpinLock) gives up.
pub const RETRY_BUDGET: u32 = 1 << 16;

/// Contention handling parameters.
///
/// ```rust
/// use word_spinlock::LockConfig;
///
/// const TIGHT: LockConfig = LockConfig::DEFAULT
///     .with_backoff(1, 64)
///     .with_retry_budget(100);
///
/// assert_eq!(TIGHT.retry_budget, 100);
/// assert_eq!(TIGHT.backoff_limit, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Spin hints issued by the first backoff step.
    pub backoff_start: u32,
    /// Upper bound a backoff step can grow to.
    pub backoff_limit: u32,
    /// Step size past which `std` builds yield to the scheduler.
    pub yield_threshold: u32,
    /// Attempts allowed before a bounded acquire reports exhaustion.
    pub retry_budget: u32,
}

impl LockConfig {
    /// [`START_SPIN`], [`MAX_SPIN`], [`YIELD_THRESHOLD`] and [`RETRY_BUDGET`].
    pub const DEFAULT: LockConfig = LockConfig {
        backoff_start: START_SPIN,
        backoff_limit: MAX_SPIN,
        yield_threshold: YIELD_THRESHOLD,
        retry_budget: RETRY_BUDGET,
    };

    /// Sets the first and largest backoff step. `start` is clamped to at
    /// least one spin and `limit` to at least `start`.
    pub const fn with_backoff(mut self, start: u32, limit: u32) -> Self {
        let start = if start == 0 { 1 } else { start };
        self.backoff_start = start;
        self.backoff_limit = if limit < start { start } else { limit };
        self
    }

    /// Sets the step size past which `std` builds yield the thread.
    pub const fn with_yield_threshold(mut self, threshold: u32) -> Self {
        self.yield_threshold = threshold;
        self
    }

    /// Sets the attempt cap for bounded acquisition. Zero is raised to one so
    /// an uncontended lock can always be taken.
    pub const fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = if budget == 0 { 1 } else { budget };
        self
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
