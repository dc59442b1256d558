//! vs-dst-sweep: run the DST scenarios over a range of seeds.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p vs-sync --features sweep --bin vs-dst-sweep -- --seeds 100
//! vs-dst-sweep --target all --seeds 100
//! RUST_LOG=vs_dst=debug vs-dst-sweep --target queue --seed-start 42 --seeds 1
//! ```
//!
//! Outputs JSON to stdout. Exits with status 1 if any seed violates an
//! invariant; the failing seeds are listed for reproduction.

use std::process;

use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use vs_dst::{run_concurrent_scenario, HarnessConfig, HarnessResult};
use vs_sync::dst::run_hierarchy_dst;
use vs_sync::{BlockingQueue, BlockingStack};

/// Maximum number of seeds per sweep.
const SEEDS_COUNT_MAX: u64 = 100_000;

/// Levels used by the hierarchy sweep: layered locks plus a duplicate level.
const HIERARCHY_LEVELS: [u64; 5] = [10_000, 6_000, 5_000, 100, 100];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    Stack,
    Queue,
    Hierarchy,
    All,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Scenario {
    Stack,
    Queue,
    Hierarchy,
}

impl Target {
    fn scenarios(self) -> Vec<Scenario> {
        match self {
            Target::Stack => vec![Scenario::Stack],
            Target::Queue => vec![Scenario::Queue],
            Target::Hierarchy => vec![Scenario::Hierarchy],
            Target::All => vec![Scenario::Stack, Scenario::Queue, Scenario::Hierarchy],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Preset {
    Quick,
    Default,
    Stress,
}

/// Run DST scenarios for the blocking primitives and output JSON results.
#[derive(Parser, Debug)]
#[command(name = "vs-dst-sweep")]
#[command(about = "Deterministic simulation sweep over seeds")]
struct Cli {
    /// Primitive to simulate.
    #[arg(long, value_enum, default_value = "all")]
    target: Target,

    /// First seed of the sweep.
    #[arg(long, default_value_t = 1)]
    seed_start: u64,

    /// Number of consecutive seeds.
    #[arg(long, default_value_t = 20)]
    seeds: u64,

    /// Harness configuration preset.
    #[arg(long, value_enum, default_value = "default")]
    preset: Preset,

    /// Override operations per logical thread.
    #[arg(long)]
    operations: Option<u64>,
}

impl Cli {
    fn harness_config(&self) -> HarnessConfig {
        let mut config = match self.preset {
            Preset::Quick => HarnessConfig::quick(),
            Preset::Default => HarnessConfig::default(),
            Preset::Stress => HarnessConfig::stress(),
        };
        if let Some(operations) = self.operations {
            config.operations_per_thread = operations;
        }
        config
    }
}

fn run_scenario(scenario: Scenario, seed: u64, config: &HarnessConfig) -> HarnessResult {
    match scenario {
        Scenario::Stack => run_concurrent_scenario::<BlockingStack<u64>>(seed, config.clone()),
        Scenario::Queue => run_concurrent_scenario::<BlockingQueue<u64>>(seed, config.clone()),
        Scenario::Hierarchy => run_hierarchy_dst(seed, &HIERARCHY_LEVELS, config.clone()),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.seed_start == 0 {
        eprintln!("Error: --seed-start must be positive");
        process::exit(2);
    }
    let seeds_count = cli.seeds.min(SEEDS_COUNT_MAX);
    let config = cli.harness_config();

    let mut reports = Vec::new();
    let mut any_failed = false;

    for scenario in cli.target.scenarios() {
        let mut failures = Vec::new();
        let mut operations_count = 0u64;

        for seed in cli.seed_start..cli.seed_start.saturating_add(seeds_count) {
            let result = run_scenario(scenario, seed, &config);
            operations_count += result.operations_count;
            if !result.all_invariants_held {
                tracing::warn!(?scenario, %result, "seed failed");
                failures.push(result);
            }
        }

        tracing::info!(?scenario, seeds = seeds_count, failed = failures.len(), "sweep done");
        any_failed |= !failures.is_empty();
        reports.push(json!({
            "target": format!("{:?}", scenario).to_lowercase(),
            "seeds": seeds_count,
            "operations": operations_count,
            "passed": failures.is_empty(),
            "failures": failures,
        }));
    }

    let output = json!({
        "config": config,
        "seed_start": cli.seed_start,
        "all_passed": !any_failed,
        "targets": reports,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error: failed to serialize results: {e}");
            process::exit(2);
        }
    }

    if any_failed {
        process::exit(1);
    }
}
