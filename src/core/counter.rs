//! Nesting counter shared by fixture nodes with the same merge key.
//!
//! The count is guarded by a mutex so that each increment or
//! decrement-and-compare is a single critical section. The lock is released
//! before any setup or teardown action runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, StagehandError};

/// Reference count of active consumers of one shared fixture.
///
/// Cloning yields another handle to the same count.
#[derive(Debug, Clone, Default)]
pub struct NestingCounter {
    count: Arc<Mutex<usize>>,
}

impl NestingCounter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of active consumers.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.lock()
    }

    /// Whether the fixture is currently established.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.count() > 0
    }

    /// Whether `other` is a handle to the same count.
    #[must_use]
    pub fn shares_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.count, &other.count)
    }

    /// Increment, returning the value before the increment.
    pub(crate) fn increment(&self) -> usize {
        let mut count = self.lock();
        let previous = *count;
        *count += 1;
        previous
    }

    /// Decrement, returning the value after the decrement.
    ///
    /// Fails with a contract violation instead of going below zero.
    pub(crate) fn decrement(&self) -> Result<usize> {
        let mut count = self.lock();
        let Some(remaining) = count.checked_sub(1) else {
            return Err(StagehandError::contract(
                "exit() called more often than enter(); nesting counter would go negative",
            ));
        };
        *count = remaining;
        Ok(remaining)
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Tests
// =============================================================================
