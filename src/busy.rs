//! Busy flags for user actions that must not overlap with themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Set while an action is in flight; cleared when its guard drops.
#[derive(Debug, Default)]
pub struct BusyFlag(AtomicBool);

impl BusyFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Claim the flag, or `None` if the action is already running.
    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.0))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[must_use = "the flag is released as soon as the guard is dropped"]
pub struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of a user action guarded by a `BusyFlag`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T> {
    Completed(T),
    /// The same action was already in flight; nothing was sent
    Suppressed,
}

impl<T> ActionOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            ActionOutcome::Completed(v) => Some(v),
            ActionOutcome::Suppressed => None,
        }
    }
}

/// Lock a state mutex. State guarded here is plain data that stays
/// consistent even if a holder panicked, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let flag = BusyFlag::new();
        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert!(flag.is_busy());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_busy());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_outcome_completed() {
        assert_eq!(ActionOutcome::Completed(3).completed(), Some(3));
        assert_eq!(ActionOutcome::<u8>::Suppressed.completed(), None);
    }
}
