//! SPARQL variables and their CP counterparts.

use castor_core::VarId;

/// Index of a SPARQL variable in its query's variable table.
pub type VarIdx = usize;

/// A SPARQL variable: a name (empty for anonymous variables) and the CP
/// variable carrying its candidate value ids. The binding of the current
/// solution lives in the query's binding row, keyed by the variable's
/// index.
#[derive(Debug)]
pub struct Variable {
    name: String,
    cp: VarId,
}

impl Variable {
    pub(crate) fn new(name: impl Into<String>, cp: VarId) -> Self {
        Self {
            name: name.into(),
            cp,
        }
    }

    /// Name of the variable; empty for anonymous (blank-node) variables.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The CP variable backing this SPARQL variable.
    pub fn cp(&self) -> VarId {
        self.cp
    }
}
