//! DST harness for hierarchical locks.
//!
//! A lock hierarchy is thread-local state, so the simulation drives a single
//! OS thread through random `lock`/`try_lock`/`unlock` sequences over a set
//! of mutexes with fixed levels. Every answer is recorded and replayed
//! against the ordering model by `HierarchyPropertyChecker`.
//!
//! Simulating several logical threads on one OS thread is not meaningful
//! here: they would share the thread-local level and could block on each
//! other's mutex forever. Cross-thread independence is covered by real
//! threads in the integration tests.
//!
//! | Operation | Model says | Implementation must |
//! |-----------|------------|---------------------|
//! | lock(i) | level(i) < current | grant |
//! | lock(i) | level(i) >= current | reject, state unchanged |
//! | unlock(i) | level(i) == current | release, restore previous |
//! | unlock(i) | otherwise | reject, keep holding |

use std::cell::RefCell;

use vs_core::invariants::hierarchy::{
    HierarchyHistory, HierarchyOp, HierarchyOutcome, HierarchyProperties, HierarchyPropertyChecker,
};
use vs_core::PropertyChecker;

use crate::harness::{DstHarness, HarnessConfig, HarnessResult};

/// Trait for hierarchical lock sets testable with DST.
///
/// The implementation owns the mutexes and any guards it currently holds.
pub trait DstTestableHierarchy {
    /// Level of each mutex, by index.
    fn levels(&self) -> Vec<u64>;

    fn lock(&mut self, index: usize) -> HierarchyOutcome;
    fn try_lock(&mut self, index: usize) -> HierarchyOutcome;

    /// Release the guard held for `index`. `None` if no guard is held for it.
    fn unlock(&mut self, index: usize) -> Option<HierarchyOutcome>;

    /// Indices of held mutexes, oldest acquisition first.
    fn held(&self) -> Vec<usize>;

    /// Release everything still held, newest first.
    fn release_all(&mut self);
}

/// DST operation on a lock set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyDstOp {
    Lock(usize),
    TryLock(usize),
    Unlock(usize),
}

/// Runs hierarchy operations and records what the implementation answered.
pub struct HierarchyDstRunner<H> {
    locks: H,
    levels: Vec<u64>,
    history: HierarchyHistory,
    rejected_count: u64,
}

impl<H: DstTestableHierarchy> HierarchyDstRunner<H> {
    pub fn new(locks: H) -> Self {
        let levels = locks.levels();
        debug_assert!(!levels.is_empty(), "Need at least one mutex");
        Self {
            locks,
            levels,
            history: HierarchyHistory::new(),
            rejected_count: 0,
        }
    }

    /// Number of rejected operations so far.
    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Apply one operation and record its outcome.
    ///
    /// An unlock of a mutex that is not held is skipped and not recorded.
    pub fn apply(&mut self, op: HierarchyDstOp) -> Option<HierarchyOutcome> {
        let (kind, index, outcome) = match op {
            HierarchyDstOp::Lock(i) => (HierarchyOp::Lock, i, Some(self.locks.lock(i))),
            HierarchyDstOp::TryLock(i) => (HierarchyOp::TryLock, i, Some(self.locks.try_lock(i))),
            HierarchyDstOp::Unlock(i) => (HierarchyOp::Unlock, i, self.locks.unlock(i)),
        };
        let outcome = outcome?;

        if outcome == HierarchyOutcome::Rejected {
            self.rejected_count += 1;
        }
        self.history.record(0, kind, self.levels[index], outcome);
        tracing::trace!(?op, ?outcome, "hierarchy op");
        Some(outcome)
    }

    /// Pick a random operation. Unlocks target any held mutex, so
    /// out-of-order releases are exercised too.
    pub fn generate(&self, rng: &mut crate::DeterministicRng) -> HierarchyDstOp {
        let held = self.locks.held();
        let index = rng.gen_range(0..self.levels.len());
        match rng.gen_range(0..5_u8) {
            0 | 1 => HierarchyDstOp::Lock(index),
            2 => HierarchyDstOp::TryLock(index),
            _ => match rng.choose(&held) {
                Some(&i) => HierarchyDstOp::Unlock(i),
                None => HierarchyDstOp::Lock(index),
            },
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        HierarchyPropertyChecker::new(self).check()
    }

    /// Release remaining guards and hand back the lock set.
    pub fn finish(mut self) -> H {
        self.locks.release_all();
        self.locks
    }
}

impl<H> HierarchyProperties for HierarchyDstRunner<H> {
    fn history(&self) -> HierarchyHistory {
        self.history.clone()
    }
}

/// Run a random hierarchy scenario for `config.operations_per_thread` steps.
///
/// Invariants are checked after every operation, so the first divergence
/// from the model stops the run.
pub fn run_hierarchy_scenario<H: DstTestableHierarchy>(
    seed: u64,
    locks: H,
    config: HarnessConfig,
) -> HarnessResult {
    let runner = RefCell::new(HierarchyDstRunner::new(locks));
    let config = HarnessConfig {
        threads_count: 1,
        ..config
    };
    let mut harness = DstHarness::new(seed, config);

    let result = harness.run_single_threaded(
        |env, _step| Some(runner.borrow().generate(env.rng())),
        |_env, op| {
            let mut runner = runner.borrow_mut();
            runner.apply(op);
            runner.check_invariants()
        },
    );

    runner.into_inner().finish();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use vs_core::invariants::hierarchy::LEVEL_UNBOUNDED;

    /// Reference lock set that follows the model exactly.
    struct ModelLocks {
        levels: Vec<u64>,
        held: Vec<usize>,
        // Accept one ascending acquisition.
        faulty: bool,
    }

    impl ModelLocks {
        fn new(levels: Vec<u64>) -> Self {
            Self {
                levels,
                held: Vec::new(),
                faulty: false,
            }
        }

        fn current(&self) -> u64 {
            self.held
                .last()
                .map_or(LEVEL_UNBOUNDED, |&i| self.levels[i])
        }

        fn acquire(&mut self, index: usize) -> HierarchyOutcome {
            if self.levels[index] < self.current() {
                self.held.push(index);
                HierarchyOutcome::Granted
            } else if self.faulty && !self.held.contains(&index) {
                self.faulty = false;
                self.held.push(index);
                HierarchyOutcome::Granted
            } else {
                HierarchyOutcome::Rejected
            }
        }
    }

    impl DstTestableHierarchy for ModelLocks {
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
            if !self.held.contains(&index) {
                return None;
            }
            if self.held.last() == Some(&index) {
                self.held.pop();
                Some(HierarchyOutcome::Granted)
            } else {
                Some(HierarchyOutcome::Rejected)
            }
        }

        fn held(&self) -> Vec<usize> {
            self.held.clone()
        }

        fn release_all(&mut self) {
            self.held.clear();
        }
    }

    #[test]
    fn test_model_locks_pass() {
        let locks = ModelLocks::new(vec![10_000, 5_000, 6_000, 100]);
        let result = run_hierarchy_scenario(4242, locks, HarnessConfig::quick());
        assert!(result.all_invariants_held, "{}", result);
        assert_eq!(result.operations_count, 50);
    }

    #[test]
    fn test_faulty_locks_caught() {
        let mut locks = ModelLocks::new(vec![100, 200, 300]);
        locks.faulty = true;

        let mut runner = HierarchyDstRunner::new(locks);
        assert_eq!(
            runner.apply(HierarchyDstOp::Lock(1)),
            Some(HierarchyOutcome::Granted)
        );
        // 300 > 200: must be rejected, the faulty set grants it.
        assert_eq!(
            runner.apply(HierarchyDstOp::Lock(2)),
            Some(HierarchyOutcome::Granted)
        );

        let err = runner.check_invariants().unwrap_err();
        assert!(err.contains("StrictlyDescending"), "{}", err);
    }

    #[test]
    fn test_unlock_of_unheld_not_recorded() {
        let mut runner = HierarchyDstRunner::new(ModelLocks::new(vec![10, 20]));
        assert_eq!(runner.apply(HierarchyDstOp::Unlock(0)), None);
        assert!(runner.history().events.is_empty());
    }

    #[test]
    fn test_generation_is_deterministic() {
        let ops = |seed| {
            let runner = HierarchyDstRunner::new(ModelLocks::new(vec![10, 20, 30]));
            let mut rng = crate::DeterministicRng::new(seed);
            (0..20).map(|_| runner.generate(&mut rng)).collect::<Vec<_>>()
        };
        assert_eq!(ops(7), ops(7));
    }
}
