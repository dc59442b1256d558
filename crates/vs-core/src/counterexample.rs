//! Counterexample representation and rendering.
//!
//! When a property violation is detected, a counterexample shows
//! the exact sequence of operations that led to the failure.

use std::fmt;

/// A counterexample showing the failure path.
///
/// Contains the sequence of states and thread actions that led
/// to an invariant violation. Can be rendered as a human-readable
/// thread diagram.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Sequence of state snapshots
    pub states: Vec<StateSnapshot>,
    /// Thread interleaving that caused the failure
    pub interleaving: Vec<ThreadAction>,
    /// Concurrency defects detected along the path
    pub issues: Vec<ConcurrencyIssue>,
    /// DST seed for reproduction (if applicable)
    pub dst_seed: Option<u64>,
    /// Human-readable description of the failure
    pub description: Option<String>,
}

/// Snapshot of observed state at a point in time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Step number in the execution
    pub step: u64,
    /// Description of the state
    pub description: String,
    /// Variable values at this point
    pub variables: Vec<(String, String)>,
}

/// Action taken by a thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    /// Thread identifier
    pub thread_id: u64,
    /// Step number when this action occurred
    pub step: u64,
    /// Description of the action, e.g. `push(3)` or `lock(5000)`
    pub action: String,
    /// Whether this action succeeded
    pub success: bool,
}

/// A defect class observed in a shared-state execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyIssue {
    /// A pushed element is neither in the container nor was it popped.
    LostElement { element: u64, pushed_at_step: u64 },
    /// An element was observed by two pops, or twice in the container.
    DuplicateElement { element: u64, step: u64 },
    /// A lock was acquired while a lock of lower or equal level was held.
    LockOrder {
        thread_id: u64,
        held_level: u64,
        requested_level: u64,
        step: u64,
    },
    /// A waiter stayed asleep although an item was available.
    LostWakeup { waiter: u64, step: u64 },
}

impl Counterexample {
    /// Create a new empty counterexample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counterexample with DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Set the description for this counterexample.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a state snapshot. Steps must be strictly increasing.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    /// Add a thread action.
    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    /// Add a concurrency issue.
    pub fn add_issue(&mut self, issue: ConcurrencyIssue) {
        self.issues.push(issue);
    }

    /// Render the counterexample as a human-readable thread diagram.
    ///
    /// Format:
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Thread 0 | Thread 1 | State
    /// -----|----------|----------|------
    ///    1 | lock(5000) |          | level=5000
    ///    2 |          | lock(10000) |
    ///    3 | lock(10000) [FAIL] |  |
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.dst_seed {
            output.push_str(&format!("DST_SEED={}\n\n", seed));
        }

        if let Some(ref desc) = self.description {
            output.push_str("Failure: ");
            output.push_str(desc);
            output.push_str("\n\n");
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            output.push_str("(no thread actions recorded)\n");
        } else {
            output.push_str("Step |");
            for tid in &threads {
                output.push_str(&format!(" Thread {} |", tid));
            }
            output.push_str(" State\n");

            output.push_str("-----|");
            for _ in &threads {
                output.push_str("----------|");
            }
            output.push_str("------\n");

            let max_step = self.interleaving.iter().map(|a| a.step).max().unwrap_or(0);

            for step in 1..=max_step {
                output.push_str(&format!("{:4} |", step));

                for tid in &threads {
                    let action = self
                        .interleaving
                        .iter()
                        .find(|a| a.step == step && a.thread_id == *tid);

                    match action {
                        Some(a) => {
                            let status = if a.success { "" } else { " [FAIL]" };
                            output.push_str(&format!(" {}{} |", a.action, status));
                        }
                        None => output.push_str("          |"),
                    }
                }

                if let Some(state) = self.states.iter().find(|s| s.step == step) {
                    output.push_str(&format!(" {}", state.description));
                }

                output.push('\n');
            }
        }

        if !self.issues.is_empty() {
            output.push_str("\nIssues:\n");
            for issue in &self.issues {
                output.push_str(&format!("  - {}\n", issue));
            }
        }

        output
    }
}

impl fmt::Display for ConcurrencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyIssue::LostElement {
                element,
                pushed_at_step,
            } => write!(
                f,
                "Lost element: {} pushed at step {} was never popped and is not present",
                element, pushed_at_step
            ),
            ConcurrencyIssue::DuplicateElement { element, step } => write!(
                f,
                "Duplicate element: {} observed twice at step {}",
                element, step
            ),
            ConcurrencyIssue::LockOrder {
                thread_id,
                held_level,
                requested_level,
                step,
            } => write!(
                f,
                "Lock order: thread {} acquired level {} while holding level {} at step {}",
                thread_id, requested_level, held_level, step
            ),
            ConcurrencyIssue::LostWakeup { waiter, step } => write!(
                f,
                "Lost wakeup: waiter {} asleep with items available at step {}",
                waiter, step
            ),
        }
    }
}
