//! Deterministic fault injection.
//!
//! Faults are decided by a seeded RNG, never by wall-clock timing.

use serde::Serialize;

use crate::random::DeterministicRng;

/// Maximum fault probability accepted by the injector.
const FAULT_PROBABILITY_MAX: f64 = 0.5;

/// Fault injection configuration.
#[derive(Debug, Clone, Serialize)]
pub struct FaultConfig {
    /// Probability that an operation boundary fails.
    pub fault_probability: f64,
    /// Probability of a simulated delay at an operation boundary.
    pub delay_probability: f64,
    /// Upper bound of a simulated delay in microseconds.
    pub delay_us_max: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            fault_probability: 0.05,
            delay_probability: 0.1,
            delay_us_max: 1_000,
        }
    }
}

impl FaultConfig {
    /// No faults, no delays.
    #[must_use]
    pub fn none() -> Self {
        Self {
            fault_probability: 0.0,
            delay_probability: 0.0,
            delay_us_max: 0,
        }
    }

    /// High fault rate for stress runs.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            fault_probability: 0.2,
            delay_probability: 0.3,
            delay_us_max: 10_000,
        }
    }
}

/// Counters kept by the injector.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FaultStats {
    pub decisions_count: u64,
    pub faults_count: u64,
    pub delays_count: u64,
}

/// Decides, deterministically, when to inject faults and delays.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: DeterministicRng,
    config: FaultConfig,
    stats: FaultStats,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng, config: FaultConfig) -> Self {
        debug_assert!(
            (0.0..=FAULT_PROBABILITY_MAX).contains(&config.fault_probability),
            "Fault probability out of range: {}",
            config.fault_probability
        );
        Self {
            rng,
            config,
            stats: FaultStats::default(),
        }
    }

    /// Should the current operation boundary fail?
    pub fn should_fail(&mut self) -> bool {
        self.stats.decisions_count += 1;
        let fail = self.rng.gen_bool(self.config.fault_probability);
        if fail {
            self.stats.faults_count += 1;
        }
        fail
    }

    /// Simulated delay in microseconds, if one should happen now.
    pub fn maybe_delay_us(&mut self) -> Option<u64> {
        if self.config.delay_us_max == 0 || !self.rng.gen_bool(self.config.delay_probability) {
            return None;
        }
        self.stats.delays_count += 1;
        Some(self.rng.gen_range(1..=self.config.delay_us_max))
    }

    #[must_use]
    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> FaultStats {
        self.stats
    }
}
