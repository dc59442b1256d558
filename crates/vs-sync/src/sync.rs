//! Synchronization primitives used by the containers.
//!
//! Under `--cfg loom` the containers run on loom's mutex and condition
//! variable so every interleaving of their critical sections can be explored.
//! The hierarchical mutex always uses `std` so it can be built in a `static`.

#[cfg(loom)]
pub(crate) use loom::sync::{Condvar, Mutex, MutexGuard};

#[cfg(not(loom))]
pub(crate) use std::sync::{Condvar, Mutex, MutexGuard};

use std::sync::PoisonError;

/// Lock a container mutex.
///
/// Every container operation leaves the sequence consistent before it can
/// panic, so a poisoned mutex is recovered instead of propagated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Block on `condvar` until notified, recovering from poisoning.
pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// Take a container mutex apart.
pub(crate) fn into_inner<T>(mutex: Mutex<T>) -> T {
    mutex.into_inner().unwrap_or_else(PoisonError::into_inner)
}
