//! Blocking stack invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every pushed element is in the stack or was popped |
//! | NoDuplicates | No element is observed twice (popped twice, or popped and still present) |
//! | NoPhantomElements | Everything popped or present was pushed |
//! | LIFO_Order | Replaying the history against a model stack reproduces every pop |
//!
//! `LIFO_Order` also covers the empty signal: a pop that reported
//! "empty" must coincide with an empty model stack.

use std::collections::HashSet;

use crate::counterexample::{ConcurrencyIssue, Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

/// Properties that any stack implementation must satisfy.
///
/// Implementations provide access to their observed state for
/// property checking. The checker verifies invariants against
/// this state.
pub trait StackProperties {
    /// Set of all elements that have been pushed.
    fn pushed_elements(&self) -> HashSet<u64>;

    /// Every element returned by a pop, in pop order.
    fn popped_elements(&self) -> Vec<u64>;

    /// Current contents of the stack (top to bottom).
    fn current_contents(&self) -> Vec<u64>;

    /// Operation history for LIFO order checking.
    fn history(&self) -> StackHistory;
}

/// History of stack operations in linearization order.
#[derive(Debug, Clone, Default)]
pub struct StackHistory {
    /// Sequence of operations in linearization order
    pub operations: Vec<StackOperation>,
}

/// A single stack operation.
#[derive(Debug, Clone)]
pub struct StackOperation {
    /// Thread that performed the operation
    pub thread_id: u64,
    /// Type of operation
    pub op_type: StackOpType,
    /// Element involved (Some for push, result for pop)
    pub element: Option<u64>,
    /// Step number for ordering
    pub step: u64,
}

/// Type of stack operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOpType {
    Push,
    Pop,
    /// Pop that signalled an empty stack.
    PopEmpty,
}

impl StackHistory {
    /// Create a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a push operation.
    pub fn record_push(&mut self, thread_id: u64, element: u64, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(StackOperation {
            thread_id,
            op_type: StackOpType::Push,
            element: Some(element),
            step,
        });
    }

    /// Record a pop operation (`None` when the stack signalled empty).
    pub fn record_pop(&mut self, thread_id: u64, element: Option<u64>, step: u64) {
        debug_assert!(step > 0, "Step must be positive");
        self.operations.push(StackOperation {
            thread_id,
            op_type: if element.is_some() {
                StackOpType::Pop
            } else {
                StackOpType::PopEmpty
            },
            element,
            step,
        });
    }

    /// Step at which `element` was pushed, if recorded.
    #[must_use]
    pub fn push_step(&self, element: u64) -> Option<u64> {
        self.operations
            .iter()
            .find(|op| op.op_type == StackOpType::Push && op.element == Some(element))
            .map(|op| op.step)
    }
}

/// Property checker for stack implementations.
pub struct StackPropertyChecker<'a, T: StackProperties> {
    stack: &'a T,
    dst_seed: Option<u64>,
}

impl<'a, T: StackProperties> StackPropertyChecker<'a, T> {
    /// Create a new checker for the given stack.
    #[must_use]
    pub fn new(stack: &'a T) -> Self {
        Self {
            stack,
            dst_seed: None,
        }
    }

    /// Set DST seed for counterexample reproduction.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        self.dst_seed = Some(seed);
        self
    }

    fn counterexample(&self) -> Counterexample {
        match self.dst_seed {
            Some(seed) => Counterexample::with_seed(seed),
            None => Counterexample::new(),
        }
    }

    /// NoLostElements
    ///
    /// Every element that was pushed must either be in the stack
    /// or have been popped. No elements can be lost.
    fn check_no_lost_elements(&self) -> PropertyResult {
        let pushed = self.stack.pushed_elements();
        let popped: HashSet<u64> = self.stack.popped_elements().into_iter().collect();
        let contents: HashSet<u64> = self.stack.current_contents().into_iter().collect();

        let mut lost: Vec<u64> = pushed
            .iter()
            .copied()
            .filter(|e| !contents.contains(e) && !popped.contains(e))
            .collect();
        lost.sort_unstable();

        let Some(&element) = lost.first() else {
            return PropertyResult::pass("NoLostElements");
        };

        let mut ce = self.counterexample();
        ce.add_state(StateSnapshot {
            step: 1,
            description: format!("Element {} lost", element),
            variables: vec![
                ("pushed".to_string(), format!("{:?}", pushed)),
                ("popped".to_string(), format!("{:?}", popped)),
                ("contents".to_string(), format!("{:?}", contents)),
            ],
        });
        ce.add_issue(ConcurrencyIssue::LostElement {
            element,
            pushed_at_step: self.stack.history().push_step(element).unwrap_or(0),
        });

        PropertyResult::fail(
            "NoLostElements",
            format!(
                "Element {} was pushed but is neither in stack nor popped",
                element
            ),
            Some(ce),
        )
    }

    /// NoDuplicates
    ///
    /// Popped elements and current contents together contain no element twice.
    fn check_no_duplicates(&self) -> PropertyResult {
        let mut seen = HashSet::new();
        let observed = self
            .stack
            .popped_elements()
            .into_iter()
            .chain(self.stack.current_contents());

        for element in observed {
            if !seen.insert(element) {
                let mut ce = self.counterexample();
                ce.add_issue(ConcurrencyIssue::DuplicateElement {
                    element,
                    step: self.stack.history().operations.len() as u64,
                });
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("Element {} observed more than once", element),
                    Some(ce),
                );
            }
        }

        PropertyResult::pass("NoDuplicates")
    }

    /// NoPhantomElements
    fn check_no_phantom_elements(&self) -> PropertyResult {
        let pushed = self.stack.pushed_elements();
        let observed = self
            .stack
            .popped_elements()
            .into_iter()
            .chain(self.stack.current_contents());

        for element in observed {
            if !pushed.contains(&element) {
                return PropertyResult::fail(
                    "NoPhantomElements",
                    format!("Element {} observed but never pushed", element),
                    None,
                );
            }
        }

        PropertyResult::pass("NoPhantomElements")
    }

    /// LIFO_Order
    ///
    /// Replays the operation history against a model stack and checks
    /// that every pop result (and every empty signal) matches.
    fn check_lifo_order(&self) -> PropertyResult {
        let history = self.stack.history();
        let mut model_stack: Vec<u64> = Vec::new();

        for op in &history.operations {
            match op.op_type {
                StackOpType::Push => {
                    if let Some(e) = op.element {
                        model_stack.push(e);
                    }
                }
                StackOpType::Pop => {
                    let Some(actual) = op.element else { continue };
                    match model_stack.pop() {
                        Some(expected) if expected != actual => {
                            return PropertyResult::fail(
                                "LIFO_Order",
                                format!(
                                    "LIFO violated: pop returned {} but model expected {} (step {})",
                                    actual, expected, op.step
                                ),
                                None,
                            );
                        }
                        None => {
                            return PropertyResult::fail(
                                "LIFO_Order",
                                format!(
                                    "LIFO violated: pop returned {} but model stack was empty (step {})",
                                    actual, op.step
                                ),
                                None,
                            );
                        }
                        _ => {}
                    }
                }
                StackOpType::PopEmpty => {
                    if !model_stack.is_empty() {
                        return PropertyResult::fail(
                            "LIFO_Order",
                            format!(
                                "Pop signalled empty but model has {} elements (step {})",
                                model_stack.len(),
                                op.step
                            ),
                            None,
                        );
                    }
                }
            }
        }

        PropertyResult::pass("LIFO_Order")
    }
}

impl<T: StackProperties> PropertyChecker for StackPropertyChecker<'_, T> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_elements(),
            self.check_no_duplicates(),
            self.check_no_phantom_elements(),
            self.check_lifo_order(),
        ]
    }
}
