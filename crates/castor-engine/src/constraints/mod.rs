//! RDF-aware constraint catalog.
//!
//! All constraints operate on CP variables whose domains are value ids;
//! ternary truth values live in three-value CP variables. Reified
//! comparison constraints link two value variables and a truth variable;
//! the non-reified variants are posted on hard filter paths where the
//! truth value is known to be required true.

pub mod bnborder;
pub mod bool_;
pub mod compare;
pub mod distinct;
pub mod fallback;
pub mod triple;
pub mod unary;

use std::sync::Arc;

use castor_common::TriState;
use castor_core::{Solver, SubtreeId, VarId};

use crate::binding::Variable;

pub use bnborder::BnBOrderConstraint;
pub use bool_::{AndConstraint, NotConstraint, OrConstraint};
pub use compare::{
    SameClassConstraint, VarDiffConstraint, VarDiffTermConstraint, VarEqConstraint,
    VarLessConstraint, VarSameTermConstraint,
};
pub use distinct::DistinctConstraint;
pub use fallback::FilterConstraint;
pub use triple::TripleConstraint;
pub use unary::{
    BoundConstraint, ConstGEConstraint, ConstLEConstraint, ConstantConstraint, FalseConstraint,
    InRangeConstraint, InRangesConstraint, NotConstantConstraint, NotInRangeConstraint,
    RangeCompatConstraint,
};

/// Context handed to expression posting: the solver, the store, and the
/// query's variable table.
pub struct PostCtx<'a> {
    pub solver: &'a mut Solver,
    pub store: &'a Arc<castor_core::Store>,
    pub vars: &'a [Variable],
}

impl PostCtx<'_> {
    /// Allocate a fresh ternary truth variable, checkpointed by `sub`.
    pub fn new_truth_var(&mut self, sub: SubtreeId) -> VarId {
        let v = self
            .solver
            .new_var(TriState::True.as_u32(), TriState::Error.as_u32());
        self.solver.subtree_add_var(sub, v, false);
        v
    }

    /// The reification target, or a fresh truth variable constrained to
    /// true when the caller needs a hard filter.
    pub fn truth_or_true(&mut self, sub: SubtreeId, b: Option<VarId>) -> VarId {
        match b {
            Some(b) => b,
            None => {
                let v = self.new_truth_var(sub);
                self.solver
                    .add_scoped(sub, Box::new(ConstantConstraint::new(v, TriState::True)));
                v
            }
        }
    }

    /// A witness variable pinned to a single value id.
    pub fn fixed_value_var(&mut self, sub: SubtreeId, id: castor_common::ValueId) -> VarId {
        let v = self.solver.new_var(id, id);
        self.solver.subtree_add_var(sub, v, false);
        v
    }
}

/// Whether a truth variable still contains `t`.
pub(crate) fn ts_contains(solver: &Solver, b: VarId, t: TriState) -> bool {
    solver.contains(b, t.as_u32())
}

/// Bind a truth variable to `t`.
pub(crate) fn ts_bind(solver: &mut Solver, b: VarId, t: TriState) -> bool {
    solver.bind(b, t.as_u32())
}

/// Remove `t` from a truth variable.
pub(crate) fn ts_remove(solver: &mut Solver, b: VarId, t: TriState) -> bool {
    solver.remove(b, t.as_u32())
}

/// The bound truth value of `b`.
pub(crate) fn ts_value(solver: &Solver, b: VarId) -> TriState {
    TriState::from_u32(solver.value(b))
}
