//! DST test harness for running reproducible concurrent tests.
//!
//! The harness provides a structured way to run DST tests with:
//! - Configurable number of logical threads
//! - Deterministic scheduling
//! - Fault injection
//! - Invariant checking at a fixed interval

use std::fmt;

use serde::Serialize;

use crate::{DstEnv, FaultConfig, ScheduleDecision};

/// Upper bound on simulated threads.
const THREADS_COUNT_MAX: usize = 16;

/// Configuration for DST test harness.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessConfig {
    /// Number of logical threads to simulate
    pub threads_count: usize,
    /// Number of operations per thread
    pub operations_per_thread: u64,
    /// Probability of context switch at yield points
    pub yield_probability: f64,
    /// Fault injection configuration
    pub fault_config: FaultConfig,
    /// Check invariants after every N operations (0 = only at the end)
    pub invariant_check_interval: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads_count: 4,
            operations_per_thread: 100,
            yield_probability: 0.2,
            fault_config: FaultConfig::default(),
            invariant_check_interval: 10,
        }
    }
}

impl HarnessConfig {
    /// Configuration for stress testing.
    #[must_use]
    pub fn stress() -> Self {
        Self {
            threads_count: 8,
            operations_per_thread: 1000,
            yield_probability: 0.3,
            fault_config: FaultConfig::aggressive(),
            invariant_check_interval: 100,
        }
    }

    /// Configuration for quick testing.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            threads_count: 2,
            operations_per_thread: 50,
            yield_probability: 0.1,
            fault_config: FaultConfig::none(),
            invariant_check_interval: 10,
        }
    }

    /// Default configuration with `DST_ITERATIONS` and `DST_THREADS` overrides.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ops) = env_u64("DST_ITERATIONS") {
            config.operations_per_thread = ops;
        }
        if let Some(threads) = env_u64("DST_THREADS") {
            config.threads_count = (threads as usize).clamp(1, THREADS_COUNT_MAX);
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, raw = %raw, "ignoring unparseable DST override");
            None
        }
    }
}

/// Result of running the harness.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessResult {
    /// Seed used for reproduction
    pub seed: u64,
    /// Total operations executed
    pub operations_count: u64,
    /// Context switches that occurred
    pub context_switches_count: u64,
    /// Faults injected
    pub faults_injected_count: u64,
    /// Invariant checks performed
    pub invariant_checks_count: u64,
    /// Whether all invariants held
    pub all_invariants_held: bool,
    /// First violation (if any)
    pub first_violation: Option<String>,
}

/// DST test harness for concurrent testing.
///
/// The harness simulates concurrent execution with deterministic scheduling.
/// Given the same seed, the same interleaving is produced.
pub struct DstHarness {
    env: DstEnv,
    config: HarnessConfig,
    operations_count: u64,
    context_switches_count: u64,
    invariant_checks_count: u64,
    violation: Option<String>,
}

impl DstHarness {
    /// Create a new harness with the given seed and config.
    pub fn new(seed: u64, config: HarnessConfig) -> Self {
        debug_assert!(seed != 0, "Seed should not be zero");
        debug_assert!(config.threads_count > 0, "Must have at least one thread");
        debug_assert!(
            config.threads_count <= THREADS_COUNT_MAX,
            "Too many threads for DST: {}",
            config.threads_count
        );

        let env = DstEnv::with_config(
            seed,
            config.threads_count,
            config.yield_probability,
            config.fault_config.clone(),
        );

        Self {
            env,
            config,
            operations_count: 0,
            context_switches_count: 0,
            invariant_checks_count: 0,
            violation: None,
        }
    }

    /// Get the seed for reproduction.
    pub fn seed(&self) -> u64 {
        self.env.seed()
    }

    /// Get the environment for custom operations.
    pub fn env(&mut self) -> &mut DstEnv {
        &mut self.env
    }

    /// Check if the harness has been stopped due to a violation.
    pub fn is_stopped(&self) -> bool {
        self.violation.is_some()
    }

    /// Stop the harness with a violation message. The first violation wins.
    pub fn stop_with_violation(&mut self, message: String) {
        tracing::warn!(seed = self.env.seed(), violation = %message, "DST invariant violated");
        if self.violation.is_none() {
            self.violation = Some(message);
        }
    }

    /// Yield point - potentially switch to another thread.
    pub fn yield_point(&mut self) -> ScheduleDecision {
        let Some(scheduler) = self.env.scheduler() else {
            return ScheduleDecision::Continue;
        };
        let decision = scheduler.decide();
        if decision != ScheduleDecision::Continue {
            self.context_switches_count += 1;
        }
        decision
    }

    /// Get the current logical thread.
    pub fn current_thread(&mut self) -> usize {
        self.env.scheduler().map_or(0, |s| s.current_thread())
    }

    /// Should we check invariants now?
    fn should_check_invariants(&self) -> bool {
        let interval = self.config.invariant_check_interval;
        interval != 0 && self.operations_count % interval == 0
    }

    /// Run a single-threaded test with the given operation generator.
    ///
    /// The generator receives the current step and returns an operation.
    pub fn run_single_threaded<F, T, R>(&mut self, mut generate_op: F, mut execute: R) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, T) -> Result<(), String>,
    {
        let total_ops = self.config.operations_per_thread;
        let mut step = 0u64;

        while step < total_ops && !self.is_stopped() {
            if let Some(op) = generate_op(&mut self.env, step) {
                if let Err(e) = execute(&mut self.env, op) {
                    self.stop_with_violation(e);
                    break;
                }
                self.operations_count += 1;
            }

            self.env.maybe_delay();
            step += 1;
        }

        self.build_result()
    }

    /// Run a simulated concurrent test.
    ///
    /// Operations are interleaved according to the scheduler.
    pub fn run_concurrent<F, T, R, I>(
        &mut self,
        mut generate_op: F,
        mut execute: R,
        mut check_invariants: I,
    ) -> HarnessResult
    where
        F: FnMut(&mut DstEnv, usize, u64) -> Option<T>,
        R: FnMut(&mut DstEnv, usize, T) -> Result<(), String>,
        I: FnMut() -> Result<(), String>,
    {
        let threads_count = self.config.threads_count;
        let ops_per_thread = self.config.operations_per_thread;
        let mut thread_steps: Vec<u64> = vec![0; threads_count];

        while !self.is_stopped() {
            let current = self.current_thread();

            if thread_steps[current] >= ops_per_thread {
                if thread_steps.iter().all(|&s| s >= ops_per_thread) {
                    break;
                }
                if let Some(scheduler) = self.env.scheduler() {
                    scheduler.force_switch();
                }
                continue;
            }

            if let Some(op) = generate_op(&mut self.env, current, thread_steps[current]) {
                if let Err(e) = execute(&mut self.env, current, op) {
                    self.stop_with_violation(format!("Thread {}: {}", current, e));
                    break;
                }
                self.operations_count += 1;

                if self.should_check_invariants() {
                    self.invariant_checks_count += 1;
                    if let Err(e) = check_invariants() {
                        self.stop_with_violation(e);
                        break;
                    }
                }
            }

            thread_steps[current] += 1;
            self.yield_point();
        }

        if !self.is_stopped() {
            self.invariant_checks_count += 1;
            if let Err(e) = check_invariants() {
                self.stop_with_violation(e);
            }
        }

        self.build_result()
    }

    fn build_result(&mut self) -> HarnessResult {
        let result = HarnessResult {
            seed: self.env.seed(),
            operations_count: self.operations_count,
            context_switches_count: self.context_switches_count,
            faults_injected_count: self.env.fault().stats().faults_count,
            invariant_checks_count: self.invariant_checks_count,
            all_invariants_held: self.violation.is_none(),
            first_violation: self.violation.clone(),
        };
        tracing::debug!(result = %result, "DST run finished");
        result
    }
}

impl fmt::Display for HarnessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.all_invariants_held {
            "PASS"
        } else {
            "FAIL"
        };

        write!(
            f,
            "[{}] DST_SEED={} ops={} switches={} faults={} checks={}",
            status,
            self.seed,
            self.operations_count,
            self.context_switches_count,
            self.faults_injected_count,
            self.invariant_checks_count
        )?;

        if let Some(ref violation) = self.first_violation {
            write!(f, "\n  Violation: {}", violation)?;
        }
        Ok(())
    }
}
