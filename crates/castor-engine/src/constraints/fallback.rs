//! Generic filter constraint: the fallback when no specialized posting
//! applies.

use std::rc::Rc;
use std::sync::Arc;

use castor_common::{TriState, ValueId};
use castor_core::{ConstraintId, Priority, Propagator, Solver, Store, VarId};

use super::{ts_bind, ts_value};
use crate::binding::VarIdx;
use crate::expression::Expression;

/// Evaluates an expression by forward checking.
///
/// Once at most one of the expression's variables is unbound, either the
/// whole expression is checked (all bound) or the unbound variable's
/// domain is filtered value by value. Without a reification target the
/// expression must evaluate to true; with one, the truth variable is
/// bound to the outcome.
pub struct FilterConstraint {
    store: Arc<Store>,
    expr: Rc<Expression>,
    /// `(variable index, CP variable)` for every expression variable.
    vars: Vec<(VarIdx, VarId)>,
    b: Option<VarId>,
    /// Scratch binding row, reused across propagations.
    bindings: Vec<ValueId>,
}

impl FilterConstraint {
    pub fn new(
        store: Arc<Store>,
        expr: Rc<Expression>,
        vars: Vec<(VarIdx, VarId)>,
        b: Option<VarId>,
        n_query_vars: usize,
    ) -> Self {
        Self {
            store,
            expr,
            vars,
            b,
            bindings: vec![0; n_query_vars],
        }
    }
}

impl Propagator for FilterConstraint {
    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn stateless(&self) -> bool {
        true
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        for &(_, cp) in &self.vars {
            solver.register_bind(cp, me);
        }
        if let Some(b) = self.b {
            solver.register_bind(b, me);
        }
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        let mut unbound: Option<(VarIdx, VarId)> = None;
        for &(idx, cp) in &self.vars {
            if solver.contains(cp, 0) {
                self.bindings[idx] = 0;
            } else if solver.is_bound(cp) {
                self.bindings[idx] = solver.value(cp);
            } else if unbound.is_some() {
                return true; // too many unbound variables
            } else {
                unbound = Some((idx, cp));
            }
        }
        match unbound {
            None => {
                let ebv = self.expr.evaluate_ebv(&self.store, &self.bindings);
                solver.set_done(me, true);
                match self.b {
                    None => ebv == TriState::True,
                    Some(b) => ts_bind(solver, b, ebv),
                }
            }
            Some((idx, cp)) => {
                let target = match self.b {
                    None => TriState::True,
                    Some(b) if solver.is_bound(b) => ts_value(solver, b),
                    Some(_) => return true, // wait for the truth value
                };
                solver.clear_marks(cp);
                let n = solver.size(cp);
                for i in 0..n {
                    let candidate = solver.dom_at(cp, i);
                    self.bindings[idx] = candidate;
                    if self.expr.evaluate_ebv(&self.store, &self.bindings) == target {
                        solver.mark(cp, candidate);
                    }
                }
                solver.set_done(me, true);
                solver.restrict_to_marks(cp)
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
