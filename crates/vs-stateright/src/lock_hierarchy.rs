//! Lock hierarchy state machine.
//!
//! Threads run fixed acquisition programs over a set of mutexes with
//! levels, then release everything newest first. With the hierarchy rule
//! enforced, an out-of-order acquisition is rejected (the thread backs off
//! and releases what it holds) instead of blocking.
//!
//! # Invariants
//!
//! 1. `NoDeadlock`: some unfinished thread can always make progress
//! 2. `StrictlyDescending`: each thread's held levels strictly decrease
//!
//! Without enforcement, two threads taking the same pair in opposite order
//! reach the classic deadlock; the checker discovers it.

use std::hash::Hash;

use stateright::{Model, Property};

/// Mutex index within the model.
pub type MutexId = u8;

/// Per-thread progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadState {
    /// Next position in the thread's program.
    pub pc: u8,
    /// Held mutexes, oldest first.
    pub held: Vec<MutexId>,
    /// Acquisition phase over (program finished or rejected).
    pub releasing: bool,
    /// The hierarchy rule rejected an acquisition.
    pub rejected: bool,
}

impl ThreadState {
    fn is_done(&self) -> bool {
        self.releasing && self.held.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchyState {
    /// Owner thread of each mutex.
    pub owners: Vec<Option<u8>>,
    pub threads: Vec<ThreadState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyAction {
    /// Acquire the next mutex of the program.
    Lock(u8),
    /// The hierarchy rule refused the next acquisition.
    Reject(u8),
    /// Release the most recently acquired mutex.
    Unlock(u8),
    /// Program complete; start releasing.
    Finish(u8),
}

/// Model of threads acquiring hierarchical mutexes.
#[derive(Debug, Clone)]
pub struct LockHierarchyModel {
    pub levels: Vec<u64>,
    /// Acquisition order of each thread.
    pub programs: Vec<Vec<MutexId>>,
    /// Whether acquisitions are checked against the hierarchy.
    pub enforce_hierarchy: bool,
}

impl LockHierarchyModel {
    pub fn new(levels: Vec<u64>, programs: Vec<Vec<MutexId>>, enforce_hierarchy: bool) -> Self {
        debug_assert!(programs.len() <= u8::MAX as usize);
        debug_assert!(programs
            .iter()
            .flatten()
            .all(|&m| (m as usize) < levels.len()));
        Self {
            levels,
            programs,
            enforce_hierarchy,
        }
    }

    /// Two threads taking A(10000) and B(5000) in opposite orders.
    pub fn opposite_order(enforce_hierarchy: bool) -> Self {
        Self::new(vec![10_000, 5_000], vec![vec![0, 1], vec![1, 0]], enforce_hierarchy)
    }

    /// Three threads over three mutexes: high, low, other (10000/5000/6000).
    pub fn layered(enforce_hierarchy: bool) -> Self {
        Self::new(
            vec![10_000, 5_000, 6_000],
            vec![vec![0, 1], vec![2, 0, 1], vec![2, 1]],
            enforce_hierarchy,
        )
    }

    fn current_level(&self, thread: &ThreadState) -> u64 {
        thread
            .held
            .last()
            .map_or(u64::MAX, |&m| self.levels[m as usize])
    }

    fn next_mutex(&self, t: usize, thread: &ThreadState) -> Option<MutexId> {
        if thread.releasing {
            return None;
        }
        self.programs[t].get(thread.pc as usize).copied()
    }

    /// An unfinished thread exists and nobody can move.
    pub fn is_deadlocked(&self, state: &HierarchyState) -> bool {
        let mut actions = Vec::new();
        self.actions(state, &mut actions);
        actions.is_empty() && state.threads.iter().any(|t| !t.is_done())
    }

    fn held_strictly_descending(&self, state: &HierarchyState) -> bool {
        state.threads.iter().all(|t| {
            t.held
                .windows(2)
                .all(|w| self.levels[w[0] as usize] > self.levels[w[1] as usize])
        })
    }
}

impl Model for LockHierarchyModel {
    type State = HierarchyState;
    type Action = HierarchyAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![HierarchyState {
            owners: vec![None; self.levels.len()],
            threads: vec![
                ThreadState {
                    pc: 0,
                    held: Vec::new(),
                    releasing: false,
                    rejected: false,
                };
                self.programs.len()
            ],
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for (t, thread) in state.threads.iter().enumerate() {
            let id = t as u8;
            if thread.is_done() {
                continue;
            }
            match self.next_mutex(t, thread) {
                Some(m) => {
                    if self.enforce_hierarchy
                        && self.current_level(thread) <= self.levels[m as usize]
                    {
                        actions.push(HierarchyAction::Reject(id));
                    } else if state.owners[m as usize].is_none() {
                        actions.push(HierarchyAction::Lock(id));
                    }
                    // Otherwise blocked on another thread
                }
                None if !thread.releasing => actions.push(HierarchyAction::Finish(id)),
                None => actions.push(HierarchyAction::Unlock(id)),
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut state = last_state.clone();
        match action {
            HierarchyAction::Lock(t) => {
                let m = self.next_mutex(t as usize, &state.threads[t as usize])?;
                state.owners[m as usize] = Some(t);
                let thread = &mut state.threads[t as usize];
                thread.held.push(m);
                thread.pc += 1;
            }
            HierarchyAction::Reject(t) => {
                let thread = &mut state.threads[t as usize];
                thread.rejected = true;
                thread.releasing = true;
            }
            HierarchyAction::Finish(t) => {
                state.threads[t as usize].releasing = true;
            }
            HierarchyAction::Unlock(t) => {
                let m = state.threads[t as usize].held.pop()?;
                state.owners[m as usize] = None;
            }
        }
        Some(state)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("NoDeadlock", |model: &Self, state: &HierarchyState| {
                !model.is_deadlocked(state)
            }),
            Property::always("StrictlyDescending", |model: &Self, state: &HierarchyState| {
                !model.enforce_hierarchy || model.held_strictly_descending(state)
            }),
            Property::sometimes("AllFinish", |_: &Self, state: &HierarchyState| {
                state.threads.iter().all(ThreadState::is_done)
            }),
        ]
    }
}
