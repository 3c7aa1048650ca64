//! # AtomicWord
//!
//! A single machine word supporting the reserve/commit protocol that spinlocks
//! are built from. On RISC-V this is the `lr.w` / `sc.w` pair; here it is
//! expressed with [`AtomicU32`] so any target with a compare-and-swap can
//! realize it.
//!
//! A [`Reservation`] remembers the value observed by [`AtomicWord::reserve`].
//! [`AtomicWord::commit`] only succeeds if the word still holds that value, and
//! it is allowed to fail spuriously (it uses `compare_exchange_weak`), just like
//! a store-conditional whose reservation was lost. Commit failure is not an
//! error: callers go back to [`AtomicWord::reserve`] and try again.
//!
//! ## Example
//! ```rust
//! use core::sync::atomic::Ordering::{Acquire, AcqRel};
//! use word_spinlock::AtomicWord;
//!
//! let word = AtomicWord::new(0);
//! let r = word.reserve(Acquire);
//! assert_eq!(r.observed(), 0);
//!
//! while !word.commit(word.reserve(Acquire), 1, AcqRel) {}
//! assert_eq!(word.load(Acquire), 1);
//!
//! word.store_release(0);
//! ```

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

/// A word-sized memory location with reserve/commit semantics.
#[repr(transparent)]
pub struct AtomicWord {
    cell: AtomicU32,
}

/// The value seen by a [`AtomicWord::reserve`] call.
///
/// Passing it to [`AtomicWord::commit`] succeeds only if no other write to the
/// word intervened since it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a reservation does nothing unless it is committed"]
pub struct Reservation {
    observed: u32,
}

impl Reservation {
    /// The word's value at reservation time.
    #[inline(always)]
    pub const fn observed(&self) -> u32 {
        self.observed
    }
}

impl AtomicWord {
    /// Creates a word holding `value`.
    #[inline(always)]
    pub const fn new(value: u32) -> Self {
        Self {
            cell: AtomicU32::new(value),
        }
    }

    /// Reserves the word and returns the value it currently holds.
    ///
    /// Use [`Ordering::Acquire`] when the reservation is part of taking a
    /// lock, so nothing in the critical section can be observed before it.
    #[inline(always)]
    pub fn reserve(&self, order: Ordering) -> Reservation {
        Reservation {
            observed: self.cell.load(order),
        }
    }

    /// Attempts to replace the reserved value with `new`.
    ///
    /// Returns `true` if the commit landed. A `false` return means another
    /// write intervened or the reservation was lost; the word is unchanged.
    ///
    /// `success` is the ordering of the read-modify-write when it lands. The
    /// lock uses [`Ordering::AcqRel`], the `.aq` + `.rl` pairing of the
    /// hardware instructions.
    #[inline(always)]
    pub fn commit(&self, reservation: Reservation, new: u32, success: Ordering) -> bool {
        self.cell
            .compare_exchange_weak(reservation.observed, new, success, Ordering::Relaxed)
            .is_ok()
    }

    /// Unconditionally stores `value` with [`Ordering::Release`].
    ///
    /// Every store made before this call is visible to whoever later
    /// reserves the word with acquire ordering and sees `value`.
    #[inline(always)]
    pub fn store_release(&self, value: u32) {
        self.cell.store(value, Ordering::Release);
    }

    /// Reads the word without reserving it.
    #[inline(always)]
    pub fn load(&self, order: Ordering) -> u32 {
        self.cell.load(order)
    }

    /// Consumes the word and returns its value.
    #[inline]
    pub fn into_inner(self) -> u32 {
        self.cell.into_inner()
    }
}

impl Default for AtomicWord {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for AtomicWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicWord")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

    #[test]
    fn stale_reservation_never_commits() {
        let word = AtomicWord::new(0);
        let stale = word.reserve(Acquire);

        // Another writer gets in between the reserve and the commit.
        word.store_release(7);

        assert!(!word.commit(stale, 1, AcqRel));
        assert_eq!(word.load(Relaxed), 7, "failed commit must leave the word untouched");
    }

    #[test]
    fn fresh_reservation_commits_eventually() {
        let word = AtomicWord::new(3);
        // A weak commit may fail spuriously; retrying with a fresh
        // reservation is the documented protocol.
        loop {
            let r = word.reserve(Acquire);
            assert_eq!(r.observed(), 3);
            if word.commit(r, 4, AcqRel) {
                break;
            }
        }
        assert_eq!(word.into_inner(), 4);
    }

    #[test]
    fn only_one_of_two_reservations_wins() {
        let word = AtomicWord::new(0);
        let first = word.reserve(Acquire);
        let second = word.reserve(Acquire);

        while !word.commit(first, 1, AcqRel) {
            // Spurious failure leaves the value at 0, so `first` stays valid.
            assert_eq!(word.load(Relaxed), 0);
        }

        assert!(!word.commit(second, 1, AcqRel), "second reservation saw 0 but the word is now 1");
    }
}
