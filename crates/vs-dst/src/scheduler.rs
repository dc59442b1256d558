//! Logical thread scheduler for simulated concurrency.
//!
//! Simulated threads run on one OS thread; the scheduler picks which
//! logical thread executes the next operation.

use crate::random::DeterministicRng;

/// Decision taken at a yield point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Keep running the current thread.
    Continue,
    /// Switch to the given thread.
    SwitchTo(usize),
}

/// Random, seeded scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler {
    rng: DeterministicRng,
    threads_count: usize,
    switch_probability: f64,
    current: usize,
}

impl Scheduler {
    pub fn new(rng: DeterministicRng, threads_count: usize, switch_probability: f64) -> Self {
        debug_assert!(threads_count > 0, "Must have at least one thread");
        debug_assert!(
            (0.0..=1.0).contains(&switch_probability),
            "Switch probability out of range: {}",
            switch_probability
        );
        Self {
            rng,
            threads_count,
            switch_probability,
            current: 0,
        }
    }

    /// Thread that runs the next operation.
    #[must_use]
    pub fn current_thread(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn threads_count(&self) -> usize {
        self.threads_count
    }

    /// Maybe switch to a different thread.
    pub fn decide(&mut self) -> ScheduleDecision {
        if self.threads_count < 2 || !self.rng.gen_bool(self.switch_probability) {
            return ScheduleDecision::Continue;
        }
        self.switch()
    }

    /// Switch unconditionally (e.g. the current thread finished its work).
    pub fn force_switch(&mut self) -> ScheduleDecision {
        if self.threads_count < 2 {
            return ScheduleDecision::Continue;
        }
        self.switch()
    }

    fn switch(&mut self) -> ScheduleDecision {
        // Any thread but the current one.
        let offset = self.rng.gen_range(1..self.threads_count);
        self.current = (self.current + offset) % self.threads_count;
        ScheduleDecision::SwitchTo(self.current)
    }
}
