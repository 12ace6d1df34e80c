//! Execution Engine Module
//!
//! Performs the reasoner's tool calls against the active storage backend:
//! collision-free moves, renames, listings, reads, folder creation and,
//! where the backend allows it, permission-preserving moves.

pub mod executor;
pub mod naming;

pub use executor::*;
