//! Mutex with a fixed hierarchy level that enforces a global lock order.
//!
//! Every thread tracks the level of its most recently acquired, still-held
//! hierarchical mutex (`HIERARCHY_UNBOUNDED` when it holds none). A thread
//! may only acquire a mutex whose level is strictly below its current
//! level, and may only release the mutex it acquired last. If every thread
//! obeys this order, no cycle of waiting threads can form.
//!
//! | Operation | Check | On failure |
//! |-----------|-------|------------|
//! | `lock` / `try_lock` | current level > mutex level | `LockOrderViolation::Acquire`, mutex untouched |
//! | `unlock` | current level == mutex level | `UnlockError` carrying the guard back |
//! | guard drop | current level == mutex level | panic (unless already panicking) |
//!
//! The held levels are thread-local state. One thread's held locks never
//! affect another thread's checks. A guard dropped out of order still
//! removes its own level before panicking, so a thread that recovers from
//! the panic is left at the level of what it actually holds.
//!
//! ```
//! use vs_sync::HierarchicalMutex;
//!
//! static HIGH: HierarchicalMutex = HierarchicalMutex::new(10_000, ());
//! static LOW: HierarchicalMutex = HierarchicalMutex::new(5_000, ());
//!
//! let high = HIGH.lock().unwrap();
//! let low = LOW.lock().unwrap();
//! assert!(HIGH.lock().is_err());
//! low.unlock().unwrap();
//! high.unlock().unwrap();
//! ```

use std::cell::RefCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use thiserror::Error;

use crate::error::LockOrderViolation;

/// Level of a thread that holds no hierarchical mutex.
pub const HIERARCHY_UNBOUNDED: u64 = u64::MAX;

thread_local! {
    /// Levels held by this thread, oldest first. Strictly descending.
    static HELD_LEVELS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// The calling thread's current hierarchy level.
pub fn current_hierarchy_value() -> u64 {
    HELD_LEVELS.with(|held| held.borrow().last().copied().unwrap_or(HIERARCHY_UNBOUNDED))
}

/// A mutex that may only be acquired in strictly descending level order.
pub struct HierarchicalMutex<T = ()> {
    hierarchy_value: u64,
    inner: Mutex<T>,
}

impl<T> HierarchicalMutex<T> {
    /// Create a mutex at level `hierarchy_value` protecting `data`.
    ///
    /// Usable in `static` items.
    pub const fn new(hierarchy_value: u64, data: T) -> Self {
        Self {
            hierarchy_value,
            inner: Mutex::new(data),
        }
    }

    pub fn hierarchy_value(&self) -> u64 {
        self.hierarchy_value
    }

    fn check_for_hierarchy_violation(&self) -> Result<(), LockOrderViolation> {
        let held = current_hierarchy_value();
        if held <= self.hierarchy_value {
            let violation = LockOrderViolation::Acquire {
                held,
                requested: self.hierarchy_value,
            };
            #[cfg(feature = "trace-violations")]
            tracing::debug!(%violation, "rejected hierarchical lock");
            return Err(violation);
        }
        Ok(())
    }

    fn enter<'a>(&'a self, guard: MutexGuard<'a, T>) -> HierarchyGuard<'a, T> {
        let previous_hierarchy_value = HELD_LEVELS.with(|held| {
            let mut held = held.borrow_mut();
            let previous = held.last().copied().unwrap_or(HIERARCHY_UNBOUNDED);
            held.push(self.hierarchy_value);
            previous
        });
        HierarchyGuard {
            mutex: self,
            previous_hierarchy_value,
            guard,
        }
    }

    /// Acquire the mutex, blocking until it is free.
    ///
    /// The ordering check happens before the mutex is touched, so a
    /// violation never blocks.
    pub fn lock(&self) -> Result<HierarchyGuard<'_, T>, LockOrderViolation> {
        self.check_for_hierarchy_violation()?;
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.enter(guard))
    }

    /// Acquire the mutex if it is free.
    ///
    /// `Ok(None)` when another thread holds it; the calling thread's level
    /// is unchanged in that case.
    pub fn try_lock(&self) -> Result<Option<HierarchyGuard<'_, T>>, LockOrderViolation> {
        self.check_for_hierarchy_violation()?;
        match self.inner.try_lock() {
            Ok(guard) => Ok(Some(self.enter(guard))),
            Err(TryLockError::Poisoned(poisoned)) => Ok(Some(self.enter(poisoned.into_inner()))),
            Err(TryLockError::WouldBlock) => Ok(None),
        }
    }

    /// Run `f` with the mutex held, releasing it afterwards.
    pub fn with_lock<R, F>(&self, f: F) -> Result<R, LockOrderViolation>
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for HierarchicalMutex<T> {
    /// A mutex at the lowest level.
    fn default() -> Self {
        Self::new(0, T::default())
    }
}

impl<T> fmt::Debug for HierarchicalMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchicalMutex")
            .field("hierarchy_value", &self.hierarchy_value)
            .finish_non_exhaustive()
    }
}

/// Scoped access to a `HierarchicalMutex`.
///
/// Dropping the guard removes its level from the thread, then releases
/// the mutex.
#[must_use = "dropping the guard releases the mutex immediately"]
pub struct HierarchyGuard<'a, T> {
    mutex: &'a HierarchicalMutex<T>,
    previous_hierarchy_value: u64,
    guard: MutexGuard<'a, T>,
}

impl<'a, T> HierarchyGuard<'a, T> {
    /// Level of the guarded mutex.
    pub fn hierarchy_value(&self) -> u64 {
        self.mutex.hierarchy_value
    }

    /// Level the thread had when this guard was acquired.
    ///
    /// Also the level it returns to when guards are released in order.
    pub fn previous_hierarchy_value(&self) -> u64 {
        self.previous_hierarchy_value
    }

    fn check_release(&self) -> Result<(), LockOrderViolation> {
        let current = current_hierarchy_value();
        if current != self.mutex.hierarchy_value {
            return Err(LockOrderViolation::Release {
                current,
                released: self.mutex.hierarchy_value,
            });
        }
        Ok(())
    }

    /// Release the mutex.
    ///
    /// Fails if a lower-level mutex acquired later is still held. The guard
    /// is handed back so it can be released in the correct order.
    pub fn unlock(self) -> Result<(), UnlockError<'a, T>> {
        if let Err(violation) = self.check_release() {
            #[cfg(feature = "trace-violations")]
            tracing::debug!(%violation, "rejected hierarchical unlock");
            return Err(UnlockError {
                guard: self,
                violation,
            });
        }
        drop(self);
        Ok(())
    }
}

impl<T> Deref for HierarchyGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for HierarchyGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for HierarchyGuard<'_, T> {
    fn drop(&mut self) {
        let released = self.check_release();
        // The inner guard releases the mutex either way, so the level goes too.
        let level = self.mutex.hierarchy_value;
        HELD_LEVELS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&l| l == level) {
                held.remove(pos);
            }
        });
        match released {
            Ok(()) => {}
            Err(_) if std::thread::panicking() => {}
            Err(violation) => panic!("{}", violation),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for HierarchyGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchyGuard")
            .field("hierarchy_value", &self.mutex.hierarchy_value)
            .field("data", &*self.guard)
            .finish()
    }
}

/// Out-of-order `unlock`. Holds the still-locked guard.
#[derive(Error)]
#[error("{violation}")]
pub struct UnlockError<'a, T> {
    guard: HierarchyGuard<'a, T>,
    violation: LockOrderViolation,
}

impl<'a, T> UnlockError<'a, T> {
    pub fn violation(&self) -> LockOrderViolation {
        self.violation
    }

    /// Take back the guard, still holding the mutex.
    pub fn into_guard(self) -> HierarchyGuard<'a, T> {
        self.guard
    }
}

impl<T> fmt::Debug for UnlockError<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockError")
            .field("violation", &self.violation)
            .finish_non_exhaustive()
    }
}
