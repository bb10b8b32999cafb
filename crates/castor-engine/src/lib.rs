//! # castor-engine
//!
//! SPARQL 1.0 query engine over the Castor store: query evaluation is
//! reduced to a constraint satisfaction problem over integer-encoded RDF
//! term identifiers and solved by the finite-domain solver in
//! `castor-core`, exploiting the store's total order on values.
//!
//! ## Modules
//!
//! - [`sparql`] - Embedded SPARQL 1.0 lexer/parser
//! - [`expression`] - Expression evaluation and constraint posting
//! - [`constraints`] - RDF-aware constraint catalog
//! - [`pattern`] - Graph-pattern tree driving solver subtrees
//! - [`query`] - Query orchestrator and result streaming

pub mod binding;
pub mod constraints;
pub mod expression;
pub mod pattern;
pub mod query;
pub mod sparql;

pub use binding::Variable;
pub use castor_core::Store;
pub use query::Query;
