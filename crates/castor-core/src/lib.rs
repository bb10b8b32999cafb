//! # castor-core
//!
//! Core layer for Castor: the read path of the on-disk triple store and
//! the finite-domain constraint solver.
//!
//! ## Modules
//!
//! - [`store`] - Page-cached B+-tree store, value/string dictionaries,
//!   ordered triple ranges, and the bulk-load builder
//! - [`solver`] - Trail-based finite-domain solver with priority
//!   propagation queues and nested search subtrees

pub mod solver;
pub mod store;

pub use solver::{ConstraintId, Priority, Propagator, Solver, SubtreeId, VarId};
pub use store::{Store, StoreOptions, TripleRange};
