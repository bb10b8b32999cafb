//! Shared error and result types.

use thiserror::Error;

/// Result type used throughout Castor.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the store and query layers.
///
/// Domain wipeouts during propagation and exhausted search trees are not
/// errors; they are ordinary `bool` returns inside the solver.
#[derive(Debug, Error)]
pub enum Error {
    /// The store file does not start with the expected magic number.
    #[error("not a castor store: invalid magic number")]
    BadMagic,

    /// The store file was written with an incompatible format version.
    #[error("unsupported store format version {found} (expected {expected})")]
    BadVersion {
        /// Version found in the header.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// The store file is shorter than its header claims.
    #[error("truncated store file: {0}")]
    Truncated(String),

    /// Underlying I/O failure while opening or mapping a store.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The query text could not be parsed.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Human-readable description of the problem.
        message: String,
        /// Byte offset in the query string.
        position: usize,
    },

    /// The query uses a feature outside the supported SPARQL subset.
    #[error("unsupported query feature: {0}")]
    Unsupported(String),

    /// Invalid input handed to the store builder.
    #[error("store build error: {0}")]
    Build(String),
}

impl Error {
    /// Convenience constructor for parse errors.
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        Self::Parse {
            message: message.into(),
            position,
        }
    }
}
