//! # vs-core
//!
//! Core types and invariants for verified synchronization primitives.
//!
//! This crate provides:
//! - `PropertyResult` and `PropertyChecker` for verifying invariants
//! - `Counterexample` for rendering failure paths
//! - Invariant traits for each primitive (e.g., `StackProperties`)
//!
//! ## Property names
//!
//! Every property carries a stable CamelCase name (`NoLostElements`,
//! `FIFO_Order`, `StrictlyDescending`, ...) so a failing DST run, a loom
//! test and a stateright model all report the same identifier.

pub mod counterexample;
pub mod invariants;
pub mod property;

pub use counterexample::{ConcurrencyIssue, Counterexample, StateSnapshot, ThreadAction};
pub use property::{PropertyChecker, PropertyResult};
