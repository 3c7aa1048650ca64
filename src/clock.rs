//! Monotonic time sources for deadline-bounded acquisition.
//!
//! A [`Clock`] reports ticks in whatever unit the platform counts; deadlines
//! passed to [`CheckedSpinLock::acquire_until`](crate::CheckedSpinLock::acquire_until)
//! are in the same unit.

/// A monotonic tick counter.
pub trait Clock {
    /// Current tick count. Must never go backwards.
    fn now(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// Nanoseconds since the clock was created, from [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Starts counting from now.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    #[inline]
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// The RISC-V `time` CSR (the platform's `mtime`, typically 1 MHz or 10 MHz).
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeCsr;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl Clock for TimeCsr {
    #[inline]
    fn now(&self) -> u64 {
        riscv::register::time::read64()
    }
}
