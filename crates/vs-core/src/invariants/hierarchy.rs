//! Lock hierarchy invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | StrictlyDescending | Every granted acquisition has a level strictly below the thread's current level |
//! | NestedRelease | Every granted release is of the thread's most recently acquired lock |
//! | ViolationsExact | An operation is rejected if and only if it breaks the ordering rule |
//!
//! The checker replays each thread's events against a per-thread model
//! stack of held levels. Threads are independent: one thread's held locks
//! never influence another thread's checks.

use std::collections::BTreeMap;

use crate::counterexample::{ConcurrencyIssue, Counterexample, ThreadAction};
use crate::property::{PropertyChecker, PropertyResult};

/// Level of a thread that holds no hierarchical lock.
pub const LEVEL_UNBOUNDED: u64 = u64::MAX;

/// Properties that a hierarchical lock implementation must satisfy.
pub trait HierarchyProperties {
    /// All recorded lock events in linearization order.
    fn history(&self) -> HierarchyHistory;
}

/// Kind of hierarchy operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyOp {
    Lock,
    TryLock,
    Unlock,
}

/// What the implementation answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyOutcome {
    /// Lock acquired or released.
    Granted,
    /// `try_lock` found the mutex held elsewhere; thread state unchanged.
    Contended,
    /// Lock-order violation reported.
    Rejected,
}

/// One recorded hierarchy event.
#[derive(Debug, Clone)]
pub struct HierarchyEvent {
    pub thread_id: u64,
    pub op: HierarchyOp,
    pub level: u64,
    pub outcome: HierarchyOutcome,
    pub step: u64,
}

/// Event history across all threads.
#[derive(Debug, Clone, Default)]
pub struct HierarchyHistory {
    pub events: Vec<HierarchyEvent>,
}

impl HierarchyHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event; the step is assigned from the history length.
    pub fn record(&mut self, thread_id: u64, op: HierarchyOp, level: u64, outcome: HierarchyOutcome) {
        let step = self.events.len() as u64 + 1;
        self.events.push(HierarchyEvent {
            thread_id,
            op,
            level,
            outcome,
            step,
        });
    }
}

/// Model prediction for a single operation.
fn model_allows(held: &[u64], op: HierarchyOp, level: u64) -> bool {
    let current = held.last().copied().unwrap_or(LEVEL_UNBOUNDED);
    match op {
        HierarchyOp::Lock | HierarchyOp::TryLock => current > level,
        HierarchyOp::Unlock => current == level && !held.is_empty(),
    }
}

fn describe(event: &HierarchyEvent) -> String {
    let name = match event.op {
        HierarchyOp::Lock => "lock",
        HierarchyOp::TryLock => "try_lock",
        HierarchyOp::Unlock => "unlock",
    };
    format!("{}({})", name, event.level)
}

/// Property checker for hierarchical lock implementations.
pub struct HierarchyPropertyChecker<'a, T: HierarchyProperties> {
    locks: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: HierarchyProperties> HierarchyPropertyChecker<'a, T> {
    #[must_use]
    pub fn new(locks: &'a T) -> Self {
        Self {
            locks,
            dst_seed: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    /// Counterexample listing the offending thread's events up to `failing`.
    fn counterexample(&self, history: &HierarchyHistory, failing: &HierarchyEvent) -> Counterexample {
        let mut ce = match self.dst_seed {
            Some(seed) => Counterexample::with_seed(seed),
            None => Counterexample::new(),
        };
        for event in history
            .events
            .iter()
            .filter(|e| e.thread_id == failing.thread_id && e.step <= failing.step)
        {
            ce.add_action(ThreadAction {
                thread_id: event.thread_id,
                step: event.step,
                action: describe(event),
                success: event.outcome == HierarchyOutcome::Granted,
            });
        }
        ce
    }

    /// Replays the history; calls `visit` with the model stack before each event.
    fn replay<F>(&self, mut visit: F) -> Option<PropertyResult>
    where
        F: FnMut(&HierarchyHistory, &[u64], &HierarchyEvent) -> Option<PropertyResult>,
    {
        let history = self.locks.history();
        let mut held: BTreeMap<u64, Vec<u64>> = BTreeMap::new();

        for event in &history.events {
            let stack = held.entry(event.thread_id).or_default();
            if let Some(failure) = visit(&history, stack.as_slice(), event) {
                return Some(failure);
            }

            if event.outcome == HierarchyOutcome::Granted {
                match event.op {
                    HierarchyOp::Lock | HierarchyOp::TryLock => stack.push(event.level),
                    HierarchyOp::Unlock => {
                        if let Some(pos) = stack.iter().rposition(|&l| l == event.level) {
                            stack.remove(pos);
                        }
                    }
                }
            }
        }

        None
    }

    /// StrictlyDescending
    fn check_strictly_descending(&self) -> PropertyResult {
        let failure = self.replay(|history, held, event| {
            let acquiring = matches!(event.op, HierarchyOp::Lock | HierarchyOp::TryLock);
            if !acquiring || event.outcome != HierarchyOutcome::Granted {
                return None;
            }
            if model_allows(held, event.op, event.level) {
                return None;
            }

            let held_level = held.last().copied().unwrap_or(LEVEL_UNBOUNDED);
            let mut ce = self.counterexample(history, event);
            ce.add_issue(ConcurrencyIssue::LockOrder {
                thread_id: event.thread_id,
                held_level,
                requested_level: event.level,
                step: event.step,
            });
            Some(PropertyResult::fail(
                "StrictlyDescending",
                format!(
                    "Thread {} acquired level {} while holding level {} (step {})",
                    event.thread_id, event.level, held_level, event.step
                ),
                Some(ce),
            ))
        });

        failure.unwrap_or_else(|| PropertyResult::pass("StrictlyDescending"))
    }

    /// NestedRelease
    fn check_nested_release(&self) -> PropertyResult {
        let failure = self.replay(|history, held, event| {
            if event.op != HierarchyOp::Unlock || event.outcome != HierarchyOutcome::Granted {
                return None;
            }
            if model_allows(held, event.op, event.level) {
                return None;
            }

            Some(PropertyResult::fail(
                "NestedRelease",
                format!(
                    "Thread {} released level {} but most recent held level is {:?} (step {})",
                    event.thread_id,
                    event.level,
                    held.last(),
                    event.step
                ),
                Some(self.counterexample(history, event)),
            ))
        });

        failure.unwrap_or_else(|| PropertyResult::pass("NestedRelease"))
    }

    /// ViolationsExact
    ///
    /// Rejections must coincide with the model: no silent acceptance of a
    /// bad ordering, and no false alarm on a good one.
    fn check_violations_exact(&self) -> PropertyResult {
        let failure = self.replay(|history, held, event| {
            let allowed = model_allows(held, event.op, event.level);
            let rejected = event.outcome == HierarchyOutcome::Rejected;
            if allowed != rejected {
                return None;
            }

            let message = if rejected {
                format!(
                    "Thread {} had {} rejected although ordering allowed it (step {})",
                    event.thread_id,
                    describe(event),
                    event.step
                )
            } else {
                format!(
                    "Thread {} had {} accepted although it breaks the hierarchy (step {})",
                    event.thread_id,
                    describe(event),
                    event.step
                )
            };
            Some(PropertyResult::fail(
                "ViolationsExact",
                message,
                Some(self.counterexample(history, event)),
            ))
        });

        failure.unwrap_or_else(|| PropertyResult::pass("ViolationsExact"))
    }
}

impl<T: HierarchyProperties> PropertyChecker for HierarchyPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_strictly_descending(),
            self.check_nested_release(),
            self.check_violations_exact(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorded(HierarchyHistory);

    impl HierarchyProperties for Recorded {
        fn history(&self) -> HierarchyHistory {
            self.0.clone()
        }
    }

    use HierarchyOp::{Lock, TryLock, Unlock};
    use HierarchyOutcome::{Contended, Granted, Rejected};

    #[test]
    fn test_correct_history_passes() {
        let mut h = HierarchyHistory::new();
        h.record(0, Lock, 10_000, Granted);
        h.record(0, Lock, 5_000, Granted);
        h.record(0, Unlock, 10_000, Rejected); // out of nesting order
        h.record(0, Unlock, 5_000, Granted);
        h.record(0, Unlock, 10_000, Granted);
        h.record(0, Lock, 5_000, Granted);
        h.record(0, Lock, 10_000, Rejected);
        h.record(0, TryLock, 4_000, Contended);
        h.record(0, Unlock, 5_000, Granted);

        let recorded = Recorded(h);
        let checker = HierarchyPropertyChecker::new(&recorded);
        assert!(checker.all_hold(), "{:?}", checker.violations());
    }

    #[test]
    fn test_threads_are_independent() {
        let mut h = HierarchyHistory::new();
        h.record(0, Lock, 5_000, Granted);
        // Thread 1 holds nothing, so 10_000 is fine for it.
        h.record(1, Lock, 10_000, Granted);
        h.record(1, Unlock, 10_000, Granted);
        h.record(0, Unlock, 5_000, Granted);

        let recorded = Recorded(h);
        let checker = HierarchyPropertyChecker::new(&recorded);
        assert!(checker.all_hold(), "{:?}", checker.violations());
    }

    #[test]
    fn test_ascending_acquire_detected() {
        let mut h = HierarchyHistory::new();
        h.record(0, Lock, 5_000, Granted);
        h.record(0, Lock, 10_000, Granted);

        let recorded = Recorded(h);
        let checker = HierarchyPropertyChecker::new(&recorded).with_seed(99);
        let violations = checker.violations();
        let names: Vec<&str> = violations.iter().map(|r| r.name).collect();
        assert!(names.contains(&"StrictlyDescending"));
        assert!(names.contains(&"ViolationsExact"));

        let descending = &violations[0];
        let diagram = descending.counterexample.as_ref().unwrap().render_diagram();
        assert!(diagram.contains("DST_SEED=99"));
        assert!(diagram.contains("lock(10000)"));
    }

    #[test]
    fn test_equal_level_is_a_violation() {
        let mut h = HierarchyHistory::new();
        h.record(0, Lock, 5_000, Granted);
        h.record(0, TryLock, 5_000, Granted);

        let recorded = Recorded(h);
        let checker = HierarchyPropertyChecker::new(&recorded);
        assert!(!checker.all_hold());
    }

    #[test]
    fn test_out_of_order_release_detected() {
        let mut h = HierarchyHistory::new();
        h.record(0, Lock, 10_000, Granted);
        h.record(0, Lock, 5_000, Granted);
        h.record(0, Unlock, 10_000, Granted);

        let recorded = Recorded(h);
        let checker = HierarchyPropertyChecker::new(&recorded);
        let names: Vec<&str> = checker.violations().iter().map(|r| r.name).collect();
        assert!(names.contains(&"NestedRelease"));
    }

    #[test]
    fn test_false_alarm_detected() {
        let mut h = HierarchyHistory::new();
        h.record(0, Lock, 10_000, Rejected);

        let recorded = Recorded(h);
        let checker = HierarchyPropertyChecker::new(&recorded);
        let names: Vec<&str> = checker.violations().iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["ViolationsExact"]);
    }
}
