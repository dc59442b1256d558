//! Error types for the synchronization primitives.

use thiserror::Error;

/// Returned by `BlockingStack::pop` and `pop_into` when the stack is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("empty stack")]
pub struct EmptyError;

/// A hierarchical mutex was acquired or released out of order.
///
/// This is a programming defect in the caller. The operation that reported
/// it had no effect on the mutex or on the thread's hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockOrderViolation {
    /// Acquiring a level that is not strictly below the thread's current level.
    #[error("mutex hierarchy violated: acquiring level {requested} while at level {held}")]
    Acquire { held: u64, requested: u64 },
    /// Releasing a mutex that is not the most recently acquired one.
    #[error("mutex hierarchy violated: releasing level {released} while at level {current}")]
    Release { current: u64, released: u64 },
}

/// Either error, for callers that propagate with `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Empty(#[from] EmptyError),
    #[error(transparent)]
    LockOrder(#[from] LockOrderViolation),
}
