//! The DST environment: seed, RNG, clock, faults and optional scheduler.

use std::fmt;

use crate::clock::SimClock;
use crate::fault::{FaultConfig, FaultInjector};
use crate::random::DeterministicRng;
use crate::scheduler::Scheduler;

/// Default probability of a context switch at a yield point.
const YIELD_PROBABILITY_DEFAULT: f64 = 0.2;

/// Everything a deterministic test needs, derived from one seed.
#[derive(Debug, Clone)]
pub struct DstEnv {
    seed: u64,
    rng: DeterministicRng,
    clock: SimClock,
    fault: FaultInjector,
    scheduler: Option<Scheduler>,
}

impl DstEnv {
    /// Environment with the default fault configuration and no scheduler.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_fault_config(seed, FaultConfig::default())
    }

    /// Environment with a custom fault configuration.
    #[must_use]
    pub fn with_fault_config(seed: u64, fault_config: FaultConfig) -> Self {
        let mut rng = DeterministicRng::new(seed);
        let fault = FaultInjector::new(rng.fork(), fault_config);
        Self {
            seed,
            rng,
            clock: SimClock::new(),
            fault,
            scheduler: None,
        }
    }

    /// Environment with a logical scheduler over `threads_count` threads.
    #[must_use]
    pub fn with_scheduler(seed: u64, threads_count: usize) -> Self {
        Self::with_config(seed, threads_count, YIELD_PROBABILITY_DEFAULT, FaultConfig::default())
    }

    /// Fully configured environment.
    #[must_use]
    pub fn with_config(
        seed: u64,
        threads_count: usize,
        yield_probability: f64,
        fault_config: FaultConfig,
    ) -> Self {
        let mut env = Self::with_fault_config(seed, fault_config);
        let scheduler_rng = env.rng.fork();
        env.scheduler = Some(Scheduler::new(scheduler_rng, threads_count, yield_probability));
        env
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self) -> &mut DeterministicRng {
        &mut self.rng
    }

    pub fn clock(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    pub fn fault(&mut self) -> &mut FaultInjector {
        &mut self.fault
    }

    pub fn scheduler(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    /// Advance the simulated clock if the injector decides on a delay.
    pub fn maybe_delay(&mut self) -> Option<u64> {
        let delay = self.fault.maybe_delay_us()?;
        self.clock.advance_us(delay);
        Some(delay)
    }

    /// `DST_SEED=<seed>` for failure messages.
    #[must_use]
    pub fn format_seed(&self) -> String {
        format!("DST_SEED={}", self.seed)
    }

    /// Summary of the run so far.
    #[must_use]
    pub fn stats(&self) -> EnvStats {
        let fault = self.fault.stats();
        EnvStats {
            seed: self.seed,
            elapsed_ns: self.clock.now_ns(),
            faults_count: fault.faults_count,
            delays_count: fault.delays_count,
        }
    }
}

/// Snapshot of environment counters.
#[derive(Debug, Clone, Copy)]
pub struct EnvStats {
    pub seed: u64,
    pub elapsed_ns: u64,
    pub faults_count: u64,
    pub delays_count: u64,
}

impl fmt::Display for EnvStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DST_SEED={} elapsed_ns={} faults={} delays={}",
            self.seed, self.elapsed_ns, self.faults_count, self.delays_count
        )
    }
}
