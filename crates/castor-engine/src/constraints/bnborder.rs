//! Branch-and-bound constraint for `ORDER BY` + `LIMIT`.

use std::rc::Rc;
use std::sync::Arc;

use castor_common::{Value, ValueId};
use castor_core::{ConstraintId, Priority, Propagator, Solver, Store, VarId};

use crate::binding::VarIdx;
use crate::expression::Expression;

/// One ORDER BY key as seen by the branch-and-bound constraint.
pub struct OrderKey {
    /// The key expression.
    pub expr: Rc<Expression>,
    /// Descending order.
    pub descending: bool,
    /// Set when the expression is a plain variable reference.
    pub var: Option<(VarIdx, VarId)>,
    /// `(variable index, CP variable)` of the expression's variables.
    pub vars: Vec<(VarIdx, VarId)>,
}

struct BoundKey {
    /// Evaluation failed; this key cannot prune.
    error: bool,
    /// Value id for variable keys.
    id: ValueId,
    /// Evaluated value for expression keys.
    value: Value,
}

/// Prunes the search once enough solutions are buffered: a candidate
/// must order strictly before the worst kept solution.
///
/// For variable keys the CP bound is updated directly, exploiting the
/// id-order/value-order correspondence; the last key additionally
/// removes the bound value to enforce strict improvement. Expression
/// keys are evaluated once their inputs are bound and prune by failing
/// propagation on the inadmissible side.
pub struct BnBOrderConstraint {
    store: Arc<Store>,
    keys: Vec<OrderKey>,
    bound: Option<Vec<BoundKey>>,
    /// Scratch binding row for expression keys.
    bindings: Vec<ValueId>,
}

impl BnBOrderConstraint {
    pub fn new(store: Arc<Store>, keys: Vec<OrderKey>, n_query_vars: usize) -> Self {
        Self {
            store,
            keys,
            bound: None,
            bindings: vec![0; n_query_vars],
        }
    }

    /// Install the worst kept solution as the new bound. The caller must
    /// `refresh` this constraint afterwards.
    pub fn update_bound(&mut self, solution: &[ValueId]) {
        let keys = self
            .keys
            .iter()
            .map(|key| match key.var {
                Some((idx, _)) => {
                    let id = solution[idx];
                    BoundKey {
                        error: id == 0,
                        id,
                        value: Value::unknown(),
                    }
                }
                None => {
                    let mut value = Value::unknown();
                    let ok = key.expr.evaluate(&self.store, solution, &mut value);
                    if ok {
                        self.store.ensure_interpreted(&mut value);
                        self.store.ensure_direct_strings(&mut value);
                    }
                    BoundKey {
                        error: !ok,
                        id: 0,
                        value,
                    }
                }
            })
            .collect();
        self.bound = Some(keys);
    }

    /// Drop the installed bound.
    pub fn reset(&mut self) {
        self.bound = None;
    }
}

impl Propagator for BnBOrderConstraint {
    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        let mut seen = Vec::new();
        for key in &self.keys {
            for &(_, cp) in &key.vars {
                if !seen.contains(&cp) {
                    seen.push(cp);
                    solver.register_bind(cp, me);
                }
            }
        }
    }

    fn propagate(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        let Some(bound) = &self.bound else {
            return true;
        };
        let last = self.keys.len() - 1;
        for (i, (key, bval)) in self.keys.iter().zip(bound.iter()).enumerate() {
            if bval.error {
                return true; // cannot reason over a failed key
            }
            if let Some((_, cp)) = key.var {
                let admissible = if key.descending {
                    solver.update_min(cp, bval.id)
                } else {
                    solver.update_max(cp, bval.id)
                };
                if !admissible {
                    return false;
                }
                if i == last && !solver.remove(cp, bval.id) {
                    return false;
                }
                if !solver.is_bound(cp)
                    || (!key.descending && solver.value(cp) < bval.id)
                    || (key.descending && solver.value(cp) > bval.id)
                {
                    return true; // strictly better on this key
                }
                // tied: fall through to the next key
            } else {
                for &(idx, cp) in &key.vars {
                    if !solver.is_bound(cp) || solver.contains(cp, 0) {
                        return true; // not evaluable yet
                    }
                    self.bindings[idx] = solver.value(cp);
                }
                let mut value = Value::unknown();
                if !key.expr.evaluate(&self.store, &self.bindings, &mut value) {
                    return true;
                }
                self.store.ensure_interpreted(&mut value);
                self.store.ensure_direct_strings(&mut value);
                if key.descending {
                    if value.total_lt(&bval.value) {
                        return false;
                    }
                    if bval.value.total_lt(&value) {
                        return true;
                    }
                } else {
                    if value.total_lt(&bval.value) {
                        return true;
                    }
                    if bval.value.total_lt(&value) {
                        return false;
                    }
                }
            }
        }
        // tied on every key: not strictly better than the kept worst
        false
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
