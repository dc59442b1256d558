//! Invariant traits for verified synchronization primitives.
//!
//! Each module defines the properties that implementations must satisfy.
//!
//! ## Containers
//! - `stack`: Blocking stack invariants (NoLostElements, NoDuplicates, LIFO_Order)
//! - `queue`: Blocking queue invariants (NoLostMessages, NoDuplicates, FIFO_Order)
//!
//! ## Lock ordering
//! - `hierarchy`: Hierarchical mutex invariants (StrictlyDescending, NestedRelease, ViolationsExact)

pub mod hierarchy;
pub mod queue;
pub mod stack;

pub use hierarchy::{
    HierarchyEvent, HierarchyHistory, HierarchyOp, HierarchyOutcome, HierarchyProperties,
    HierarchyPropertyChecker, LEVEL_UNBOUNDED,
};
pub use queue::{QueueProperties, QueuePropertyChecker};
pub use stack::{StackHistory, StackOpType, StackOperation, StackProperties, StackPropertyChecker};
