//! # vs-dst
//!
//! Deterministic Simulation Testing framework for blocking synchronization
//! primitives.
//!
//! Inspired by FoundationDB and TigerBeetle, this crate provides deterministic
//! simulation of time, randomness, scheduling, and faults. All behavior is
//! reproducible via a seed.
//!
//! ## Harnesses
//!
//! - `fault_injection`: Blocking containers (stack and queue)
//! - `hierarchy_harness`: Hierarchical locks
//!
//! ## Usage
//!
//! ```rust
//! use vs_dst::DstEnv;
//!
//! let seed = 12345;
//! let mut env = DstEnv::new(seed);
//!
//! // Deterministic time
//! let now = env.clock().now_ns();
//! env.clock().advance_ns(1_000_000); // 1ms
//!
//! // Deterministic randomness
//! let value: u64 = env.rng().gen();
//! let choice = env.rng().gen_range(0..10);
//!
//! // Deterministic fault injection
//! if env.fault().should_fail() {
//!     // Simulate failure
//! }
//! ```
//!
//! ## Reproducibility
//!
//! To reproduce a failing test:
//! ```bash
//! DST_SEED=12345 cargo test
//! ```

pub mod clock;
pub mod env;
pub mod fault;
pub mod fault_injection;
pub mod harness;
pub mod hierarchy_harness;
pub mod random;
pub mod scheduler;

pub use clock::SimClock;
pub use env::{DstEnv, EnvStats};
pub use fault::{FaultConfig, FaultInjector, FaultStats};
pub use fault_injection::{
    run_concurrent_scenario, run_dst_scenario, ContainerOrder, DstOp, DstResult, DstRunner,
    DstStats, DstTestableContainer, FaultPoint, FaultType,
};
pub use harness::{DstHarness, HarnessConfig, HarnessResult};
pub use hierarchy_harness::{
    run_hierarchy_scenario, DstTestableHierarchy, HierarchyDstOp, HierarchyDstRunner,
};
pub use random::DeterministicRng;
pub use scheduler::{ScheduleDecision, Scheduler};

use thiserror::Error;

/// Invalid `DST_SEED` value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    #[error("DST_SEED must be a valid u64, got {0:?}")]
    Invalid(String),
    #[error("DST_SEED must not be zero")]
    Zero,
}

/// Parse a seed as given in `DST_SEED`.
pub fn parse_seed(raw: &str) -> Result<u64, SeedError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(SeedError::Zero),
        Ok(seed) => Ok(seed),
        Err(_) => Err(SeedError::Invalid(raw.to_string())),
    }
}

/// Get DST seed from environment or generate random one.
///
/// Prints the seed for reproduction. Use `DST_SEED=<seed>` to reproduce.
/// An unusable `DST_SEED` is reported and replaced by a random seed.
#[must_use]
pub fn get_or_generate_seed() -> u64 {
    if let Ok(raw) = std::env::var("DST_SEED") {
        match parse_seed(&raw) {
            Ok(seed) => {
                println!("DST_SEED={} (from environment)", seed);
                return seed;
            }
            Err(e) => tracing::warn!(error = %e, "ignoring DST_SEED"),
        }
    }

    let seed = rand::random::<u64>().max(1);
    println!("DST_SEED={} (randomly generated)", seed);
    seed
}
