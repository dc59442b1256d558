//! DST adapters for the primitives.
//!
//! Connects `BlockingStack`, `BlockingQueue` and `HierarchicalMutex` to the
//! `vs-dst` runners. The primitives know nothing about DST; everything
//! lives in these trait impls.

use std::thread;

use vs_core::invariants::hierarchy::HierarchyOutcome;
use vs_dst::{
    run_hierarchy_scenario, ContainerOrder, DstTestableContainer, DstTestableHierarchy,
    HarnessConfig, HarnessResult,
};

use crate::blocking_queue::BlockingQueue;
use crate::blocking_stack::BlockingStack;
use crate::hierarchical_mutex::{HierarchicalMutex, HierarchyGuard};

impl DstTestableContainer for BlockingStack<u64> {
    const ORDER: ContainerOrder = ContainerOrder::Lifo;

    fn new() -> Self {
        BlockingStack::new()
    }

    fn push(&self, value: u64) {
        BlockingStack::push(self, value);
    }

    fn pop(&self) -> Option<u64> {
        BlockingStack::pop(self).ok()
    }

    /// The stack never blocks; waiting is the caller's busy poll.
    fn blocking_pop(&self) -> u64 {
        loop {
            if let Ok(value) = BlockingStack::pop(self) {
                return value;
            }
            thread::yield_now();
        }
    }

    fn is_empty(&self) -> bool {
        self.empty()
    }

    fn get_contents(&self) -> Vec<u64> {
        self.snapshot()
    }
}

impl DstTestableContainer for BlockingQueue<u64> {
    const ORDER: ContainerOrder = ContainerOrder::Fifo;

    fn new() -> Self {
        BlockingQueue::new()
    }

    fn push(&self, value: u64) {
        BlockingQueue::push(self, value);
    }

    fn pop(&self) -> Option<u64> {
        self.try_pop()
    }

    fn blocking_pop(&self) -> u64 {
        self.wait_and_pop()
    }

    fn is_empty(&self) -> bool {
        self.empty()
    }

    fn get_contents(&self) -> Vec<u64> {
        self.snapshot()
    }
}

/// Guards held by the calling thread over a fixed set of mutexes.
///
/// Remaining guards are released newest first when the session is dropped.
pub struct HierarchySession<'a> {
    mutexes: &'a [HierarchicalMutex],
    held: Vec<(usize, HierarchyGuard<'a, ()>)>,
}

impl<'a> HierarchySession<'a> {
    pub fn new(mutexes: &'a [HierarchicalMutex]) -> Self {
        Self {
            mutexes,
            held: Vec::new(),
        }
    }

    fn acquired(&mut self, index: usize, guard: HierarchyGuard<'a, ()>) -> HierarchyOutcome {
        self.held.push((index, guard));
        HierarchyOutcome::Granted
    }
}

impl DstTestableHierarchy for HierarchySession<'_> {
    fn levels(&self) -> Vec<u64> {
        self.mutexes.iter().map(HierarchicalMutex::hierarchy_value).collect()
    }

    fn lock(&mut self, index: usize) -> HierarchyOutcome {
        let mutexes = self.mutexes;
        match mutexes[index].lock() {
            Ok(guard) => self.acquired(index, guard),
            Err(_) => HierarchyOutcome::Rejected,
        }
    }

    fn try_lock(&mut self, index: usize) -> HierarchyOutcome {
        let mutexes = self.mutexes;
        match mutexes[index].try_lock() {
            Ok(Some(guard)) => self.acquired(index, guard),
            Ok(None) => HierarchyOutcome::Contended,
            Err(_) => HierarchyOutcome::Rejected,
        }
    }

    fn unlock(&mut self, index: usize) -> Option<HierarchyOutcome> {
        let pos = self.held.iter().rposition(|(i, _)| *i == index)?;
        let (_, guard) = self.held.remove(pos);
        match guard.unlock() {
            Ok(()) => Some(HierarchyOutcome::Granted),
            Err(e) => {
                self.held.insert(pos, (index, e.into_guard()));
                Some(HierarchyOutcome::Rejected)
            }
        }
    }

    fn held(&self) -> Vec<usize> {
        self.held.iter().map(|(i, _)| *i).collect()
    }

    fn release_all(&mut self) {
        while let Some((_, guard)) = self.held.pop() {
            drop(guard);
        }
    }
}

impl Drop for HierarchySession<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Run the hierarchy DST scenario over fresh mutexes at `levels`.
pub fn run_hierarchy_dst(seed: u64, levels: &[u64], config: HarnessConfig) -> HarnessResult {
    let mutexes: Vec<HierarchicalMutex> = levels
        .iter()
        .map(|&level| HierarchicalMutex::new(level, ()))
        .collect();
    run_hierarchy_scenario(seed, HierarchySession::new(&mutexes), config)
}
