//! Error types for the checked lock and the execution harness.
//!
//! Contention is never an error: it is absorbed by spinning. What surfaces
//! here is misuse and starvation, and only from
//! [`CheckedSpinLock`](crate::CheckedSpinLock), plus the harness oracle.

use core::fmt;

use crate::context::ContextId;

/// Misuse or liveness failure reported by [`CheckedSpinLock`](crate::CheckedSpinLock).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The caller already holds the lock it tried to acquire.
    Reentrant { holder: ContextId },
    /// Release attempted by a context that is not the holder.
    NotOwner { holder: ContextId, caller: ContextId },
    /// Release attempted on a lock nobody holds.
    NotLocked { caller: ContextId },
    /// The retry budget ran out before the lock was obtained.
    ContentionExhausted { attempts: u32 },
    /// The deadline passed before the lock was obtained.
    Timeout { waited: u64 },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Reentrant { holder } => {
                write!(f, "context {} re-acquired a lock it already holds", holder)
            }
            LockError::NotOwner { holder, caller } => write!(
                f,
                "context {} released a lock held by context {}",
                caller, holder
            ),
            LockError::NotLocked { caller } => {
                write!(f, "context {} released an unlocked lock", caller)
            }
            LockError::ContentionExhausted { attempts } => {
                write!(f, "lock still contended after {} attempts", attempts)
            }
            LockError::Timeout { waited } => {
                write!(f, "lock not acquired within {} ticks", waited)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LockError {}

/// The mutual-exclusion oracle failed: increments were lost or doubled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessError {
    LostUpdates { expected: u64, observed: u64 },
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessError::LostUpdates { expected, observed } => write!(
                f,
                "shared counter is {} but {} increments were performed",
                observed, expected
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HarnessError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn messages_name_both_contexts() {
        let holder = ContextId::new(1).unwrap();
        let caller = ContextId::new(2).unwrap();
        let msg = LockError::NotOwner { holder, caller }.to_string();
        assert_eq!(msg, "context #2 released a lock held by context #1");
    }

    #[test]
    fn oracle_message() {
        let msg = HarnessError::LostUpdates { expected: 10, observed: 9 }.to_string();
        assert_eq!(msg, "shared counter is 9 but 10 increments were performed");
    }
}
