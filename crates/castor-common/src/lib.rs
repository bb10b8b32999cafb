//! # castor-common
//!
//! Foundation layer for Castor: the RDF term model, comparison laws, and
//! shared scalar types.
//!
//! This crate has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`term`] - RDF values, dictionary strings, categories, truth values
//! - [`triple`] - Triple tuples and component orderings
//! - [`numrange`] - Integer approximation ranges for numeric literals
//! - [`decimal`] - Arbitrary-precision `xsd:decimal` arithmetic
//! - [`datetime`] - `xsd:dateTime` parsing and comparison
//! - [`error`] - Shared error and result types

pub mod datetime;
pub mod decimal;
pub mod error;
pub mod hash;
pub mod numrange;
pub mod term;
pub mod triple;

pub use datetime::XsdDateTime;
pub use decimal::XsdDecimal;
pub use error::{Error, Result};
pub use numrange::NumRange;
pub use term::{
    valid_id, Category, Interpreted, NumCategory, Str, StringId, TriState, Value, ValueId,
    ValueRange, UNKNOWN_ID,
};
pub use triple::{Triple, TripleOrder};
