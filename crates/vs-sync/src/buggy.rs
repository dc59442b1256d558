//! Buggy containers and lock sets for testing the checkers.
//!
//! Each implementation has one deliberate, deterministic bug. The DST
//! runners must report it; if they stay green, the invariants are too weak.
//!
//! # Bug Catalog
//!
//! | Implementation | Bug | Caught By |
//! |----------------|-----|-----------|
//! | DroppingStack | pop discards the element below the top | NoLostElements |
//! | PeekingQueue | pop of the last element leaves it queued | NoDuplicates |
//! | BackPoppingQueue | pops from the back | FIFO_Order |
//! | UncheckedHierarchy | never checks the ordering rule | StrictlyDescending |

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use vs_core::invariants::hierarchy::HierarchyOutcome;
use vs_dst::{ContainerOrder, DstTestableContainer, DstTestableHierarchy};

// =============================================================================
// Bug 1: Dropping Stack
// =============================================================================

/// Stack whose pop truncates one element too many.
///
/// BUG: `pop` computes the new length as `len - 2` when at least two
/// elements are present, silently discarding the second element.
///
/// CAUGHT BY: DST invariant check (NoLostElements)
pub struct DroppingStack {
    data: Mutex<Vec<u64>>,
}

impl DstTestableContainer for DroppingStack {
    const ORDER: ContainerOrder = ContainerOrder::Lifo;

    fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, value: u64) {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).push(value);
    }

    fn pop(&self) -> Option<u64> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let top = data.last().copied()?;
        // BUG: should be `len - 1`
        let new_len = data.len().saturating_sub(2);
        data.truncate(new_len);
        Some(top)
    }

    fn blocking_pop(&self) -> u64 {
        self.pop().unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn get_contents(&self) -> Vec<u64> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.iter().rev().copied().collect()
    }
}

// =============================================================================
// Bug 2: Peeking Queue
// =============================================================================

/// Queue that peeks instead of popping its last element.
///
/// BUG: when exactly one element is queued, `pop` returns a copy of it and
/// leaves it in place, so the next pop delivers it again.
///
/// CAUGHT BY: DST invariant check (NoDuplicates)
pub struct PeekingQueue {
    data: Mutex<VecDeque<u64>>,
}

impl DstTestableContainer for PeekingQueue {
    const ORDER: ContainerOrder = ContainerOrder::Fifo;

    fn new() -> Self {
        Self {
            data: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, value: u64) {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).push_back(value);
    }

    fn pop(&self) -> Option<u64> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        if data.len() == 1 {
            // BUG: should be pop_front
            return data.front().copied();
        }
        data.pop_front()
    }

    fn blocking_pop(&self) -> u64 {
        self.pop().unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn get_contents(&self) -> Vec<u64> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.iter().copied().collect()
    }
}

// =============================================================================
// Bug 3: Back-Popping Queue
// =============================================================================

/// Queue that behaves like a stack.
///
/// BUG: `pop` takes from the back.
///
/// CAUGHT BY: DST invariant check (FIFO_Order)
pub struct BackPoppingQueue {
    data: Mutex<VecDeque<u64>>,
}

impl DstTestableContainer for BackPoppingQueue {
    const ORDER: ContainerOrder = ContainerOrder::Fifo;

    fn new() -> Self {
        Self {
            data: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, value: u64) {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).push_back(value);
    }

    fn pop(&self) -> Option<u64> {
        // BUG: should be pop_front
        self.data.lock().unwrap_or_else(PoisonError::into_inner).pop_back()
    }

    fn blocking_pop(&self) -> u64 {
        self.pop().unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn get_contents(&self) -> Vec<u64> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.iter().copied().collect()
    }
}

// =============================================================================
// Bug 4: Unchecked Hierarchy
// =============================================================================

/// Lock set that grants any acquisition of a free mutex.
///
/// BUG: no level comparison on acquire or release. Two threads taking the
/// same pair in opposite order can deadlock.
///
/// CAUGHT BY: DST invariant check (StrictlyDescending, NestedRelease)
pub struct UncheckedHierarchy {
    levels: Vec<u64>,
    held: Vec<usize>,
}

impl UncheckedHierarchy {
    pub fn new(levels: Vec<u64>) -> Self {
        Self {
            levels,
            held: Vec::new(),
        }
    }

    fn acquire(&mut self, index: usize) -> HierarchyOutcome {
        // A held mutex would self-deadlock; report it as contended.
        if self.held.contains(&index) {
            return HierarchyOutcome::Contended;
        }
        self.held.push(index);
        HierarchyOutcome::Granted
    }
}

impl DstTestableHierarchy for UncheckedHierarchy {
    fn levels(&self) -> Vec<u64> {
        self.levels.clone()
    }

    fn lock(&mut self, index: usize) -> HierarchyOutcome {
        self.acquire(index)
    }

    fn try_lock(&mut self, index: usize) -> HierarchyOutcome {
        self.acquire(index)
    }

    fn unlock(&mut self, index: usize) -> Option<HierarchyOutcome> {
        let pos = self.held.iter().position(|&i| i == index)?;
        self.held.remove(pos);
        Some(HierarchyOutcome::Granted)
    }

    fn held(&self) -> Vec<usize> {
        self.held.clone()
    }

    fn release_all(&mut self) {
        self.held.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
