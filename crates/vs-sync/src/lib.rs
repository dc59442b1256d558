//! # vs-sync
//!
//! Lock-based primitives for sharing data between threads.
//!
//! Each primitive:
//! - Guards all shared state with a mutex it owns
//! - Has DST adapters in `dst` checked against the `vs-core` invariants
//! - Has loom tests for lock/condvar interleavings (under `#[cfg(loom)]`)
//!
//! # Modules
//!
//! - `blocking_stack`: LIFO stack; `pop` on empty returns `EmptyError`
//! - `blocking_queue`: FIFO queue; `wait_and_pop` blocks until a push
//! - `hierarchical_mutex`: mutex with a fixed level enforcing lock order
//! - `buggy`: Intentionally buggy implementations for testing the checkers
//!
//! # Testing
//!
//! ```bash
//! cargo test -p vs-sync
//! RUSTFLAGS="--cfg loom" cargo test -p vs-sync --release
//! DST_SEED=12345 cargo test -p vs-sync
//! ```

pub mod blocking_queue;
pub mod blocking_stack;
pub mod buggy;
pub mod dst;
pub mod error;
pub mod hierarchical_mutex;
mod sync;

pub use blocking_queue::BlockingQueue;
pub use blocking_stack::BlockingStack;
pub use error::{EmptyError, LockOrderViolation, SyncError};
pub use hierarchical_mutex::{
    current_hierarchy_value, HierarchicalMutex, HierarchyGuard, UnlockError, HIERARCHY_UNBOUNDED,
};
