//! # vs-stateright
//!
//! Stateright models of the two protocols the blocking primitives rely on.
//!
//! Each model is small enough for exhaustive breadth-first checking and
//! comes in a correct and a broken variant: the correct one must satisfy
//! every property, the broken one must yield a counterexample.
//!
//! ## Usage
//!
//! ```ignore
//! use stateright::{Checker, Model};
//! use vs_stateright::LockHierarchyModel;
//!
//! let checker = LockHierarchyModel::opposite_order(true)
//!     .checker()
//!     .spawn_bfs()
//!     .join();
//! checker.assert_properties();
//! ```
//!
//! ## Modules
//!
//! - `lock_hierarchy`: threads acquiring leveled mutexes (deadlock freedom)
//! - `queue_wakeup`: producer/consumer condition variable protocol (no lost wakeup)

pub mod lock_hierarchy;
pub mod queue_wakeup;

pub use lock_hierarchy::{HierarchyAction, HierarchyState, LockHierarchyModel, MutexId, ThreadState};
pub use queue_wakeup::{
    ConsumerPc, Holder, ProducerPc, Protocol, QueueAction, QueueState, QueueWakeupModel,
};
