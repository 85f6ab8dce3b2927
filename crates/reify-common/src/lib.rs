//! Common types for the reify workspace.
//!
//! - Name interning (`Atom`, `ShardedInterner`)
//! - Limits and capacity hints
//! - Options shared by the solver and the CLI

// Name interning for declarations, parameters, members and intrinsics
pub mod interner;
pub use interner::{Atom, ShardedInterner};

// Centralized limits and thresholds
pub mod limits;

// Behavior switches
pub mod options;
pub use options::ReifyOptions;
