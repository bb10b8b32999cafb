//! Single-variable constraints: constants, ranges, and bound markers.

use castor_common::{TriState, ValueId, ValueRange};
use castor_core::{ConstraintId, Priority, Propagator, Solver, VarId};

use super::{ts_bind, ts_contains, ts_value};

/// Posts and fails immediately.
pub struct FalseConstraint;

impl Propagator for FalseConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn post(&mut self, _solver: &mut Solver, _me: ConstraintId) -> bool {
        false
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Ensures a SPARQL variable is bound by removing the unbound marker
/// (id 0) from its CP domain.
pub struct BoundConstraint {
    x: VarId,
}

impl BoundConstraint {
    pub fn new(x: VarId) -> Self {
        Self { x }
    }
}

impl Propagator for BoundConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn post(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        solver.remove(self.x, 0)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Binds a truth variable to a constant truth value.
pub struct ConstantConstraint {
    b: VarId,
    value: TriState,
}

impl ConstantConstraint {
    pub fn new(b: VarId, value: TriState) -> Self {
        Self { b, value }
    }
}

impl Propagator for ConstantConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn post(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        ts_bind(solver, self.b, self.value)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Removes a constant truth value from a truth variable.
pub struct NotConstantConstraint {
    b: VarId,
    value: TriState,
}

impl NotConstantConstraint {
    pub fn new(b: VarId, value: TriState) -> Self {
        Self { b, value }
    }
}

impl Propagator for NotConstantConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn post(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        solver.remove(self.b, self.value.as_u32())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Restricts a domain to one id range.
pub struct InRangeConstraint {
    x: VarId,
    range: ValueRange,
}

impl InRangeConstraint {
    pub fn new(x: VarId, range: ValueRange) -> Self {
        Self { x, range }
    }
}

impl Propagator for InRangeConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn post(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        solver.clear_marks(self.x);
        for id in self.range.iter() {
            solver.mark(self.x, id);
        }
        solver.restrict_to_marks(self.x)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Restricts a domain to a union of id ranges.
pub struct InRangesConstraint {
    x: VarId,
    ranges: Vec<ValueRange>,
}

impl InRangesConstraint {
    pub fn new(x: VarId, ranges: Vec<ValueRange>) -> Self {
        Self { x, ranges }
    }
}

impl Propagator for InRangesConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn post(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        solver.clear_marks(self.x);
        for range in &self.ranges {
            for id in range.iter() {
                solver.mark(self.x, id);
            }
        }
        solver.restrict_to_marks(self.x)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Removes an id range from a domain.
pub struct NotInRangeConstraint {
    x: VarId,
    range: ValueRange,
}

impl NotInRangeConstraint {
    pub fn new(x: VarId, range: ValueRange) -> Self {
        Self { x, range }
    }
}

impl Propagator for NotInRangeConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn post(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        for id in self.range.iter() {
            if !solver.remove(self.x, id) {
                return false;
            }
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Reified `x >= v <=> b` on value ids; a type-error truth value leaves
/// the domain alone.
pub struct ConstGEConstraint {
    x: VarId,
    v: ValueId,
    b: VarId,
}

impl ConstGEConstraint {
    pub fn new(x: VarId, v: ValueId, b: VarId) -> Self {
        Self { x, v, b }
    }
}

impl Propagator for ConstGEConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.register_min(self.x, me);
        solver.register_max(self.x, me);
        solver.register_change(self.b, me);
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if solver.min(self.x) >= self.v {
            solver.set_done(me, true);
            if !super::ts_remove(solver, self.b, TriState::False) {
                return false;
            }
        } else if solver.max(self.x) < self.v {
            solver.set_done(me, true);
            if !super::ts_remove(solver, self.b, TriState::True) {
                return false;
            }
        } else if solver.is_bound(self.b) && ts_value(solver, self.b) == TriState::True {
            solver.set_done(me, true);
            return solver.update_min(self.x, self.v);
        } else if solver.is_bound(self.b) && ts_value(solver, self.b) == TriState::False {
            solver.set_done(me, true);
            return solver.update_max(self.x, self.v - 1);
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Reified `x <= v <=> b` on value ids.
pub struct ConstLEConstraint {
    x: VarId,
    v: ValueId,
    b: VarId,
}

impl ConstLEConstraint {
    pub fn new(x: VarId, v: ValueId, b: VarId) -> Self {
        Self { x, v, b }
    }
}

impl Propagator for ConstLEConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.register_min(self.x, me);
        solver.register_max(self.x, me);
        solver.register_change(self.b, me);
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if solver.max(self.x) <= self.v {
            solver.set_done(me, true);
            if !super::ts_remove(solver, self.b, TriState::False) {
                return false;
            }
        } else if solver.min(self.x) > self.v {
            solver.set_done(me, true);
            if !super::ts_remove(solver, self.b, TriState::True) {
                return false;
            }
        } else if solver.is_bound(self.b) && ts_value(solver, self.b) == TriState::True {
            solver.set_done(me, true);
            return solver.update_max(self.x, self.v);
        } else if solver.is_bound(self.b) && ts_value(solver, self.b) == TriState::False {
            solver.set_done(me, true);
            return solver.update_min(self.x, self.v + 1);
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Reified membership of `x` in a range: inside implies no type error,
/// fully outside implies a type error.
pub struct RangeCompatConstraint {
    x: VarId,
    range: ValueRange,
    b: VarId,
}

impl RangeCompatConstraint {
    pub fn new(x: VarId, range: ValueRange, b: VarId) -> Self {
        Self { x, range, b }
    }
}

impl Propagator for RangeCompatConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        if !self.range.is_empty() {
            solver.register_min(self.x, me);
            solver.register_max(self.x, me);
            solver.register_change(self.b, me);
        }
    }

    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if self.range.is_empty() {
            ts_bind(solver, self.b, TriState::Error)
        } else {
            self.propagate(solver, me)
        }
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if solver.min(self.x) >= self.range.from && solver.max(self.x) <= self.range.to {
            solver.set_done(me, true);
            super::ts_remove(solver, self.b, TriState::Error)
        } else if solver.max(self.x) < self.range.from || solver.min(self.x) > self.range.to {
            solver.set_done(me, true);
            ts_bind(solver, self.b, TriState::Error)
        } else if !ts_contains(solver, self.b, TriState::Error) {
            solver.set_done(me, true);
            solver.update_min(self.x, self.range.from) && solver.update_max(self.x, self.range.to)
        } else if solver.is_bound(self.b) && ts_value(solver, self.b) == TriState::Error {
            solver.set_done(me, true);
            for id in self.range.iter() {
                if !solver.remove(self.x, id) {
                    return false;
                }
            }
            true
        } else {
            true
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth_var(solver: &mut Solver) -> VarId {
        solver.new_var(0, 2)
    }

    fn run(solver: &mut Solver, st: castor_core::SubtreeId) -> bool {
        solver.activate(st);
        let ok = solver.search(st);
        ok
    }

    #[test]
    fn test_bound_removes_zero() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 5);
        solver.subtree_add_var(st, x, true);
        solver.add_scoped(st, Box::new(BoundConstraint::new(x)));
        assert!(run(&mut solver, st));
        assert!(solver.value(x) > 0);
        solver.discard(st);
    }

    #[test]
    fn test_false_makes_subtree_inconsistent() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 5);
        solver.subtree_add_var(st, x, true);
        solver.add_scoped(st, Box::new(FalseConstraint));
        solver.activate(st);
        assert!(!solver.search(st));
    }

    #[test]
    fn test_in_range_restricts() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 9);
        solver.subtree_add_var(st, x, true);
        solver.add_scoped(st, Box::new(InRangeConstraint::new(x, ValueRange::new(3, 5))));
        solver.activate(st);
        let mut seen = Vec::new();
        while solver.search(st) {
            seen.push(solver.value(x));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![3, 4, 5]);
    }

    #[test]
    fn test_not_in_range_removes() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 4);
        solver.subtree_add_var(st, x, true);
        solver.add_scoped(st, Box::new(NotInRangeConstraint::new(x, ValueRange::new(1, 3))));
        solver.activate(st);
        let mut seen = Vec::new();
        while solver.search(st) {
            seen.push(solver.value(x));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 4]);
    }

    #[test]
    fn test_const_ge_reified_true() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 9);
        let b = truth_var(&mut solver);
        solver.subtree_add_var(st, x, true);
        solver.subtree_add_var(st, b, false);
        solver.add_scoped(st, Box::new(ConstantConstraint::new(b, TriState::True)));
        solver.add_scoped(st, Box::new(ConstGEConstraint::new(x, 4, b)));
        solver.activate(st);
        let mut seen = Vec::new();
        while solver.search(st) {
            seen.push(solver.value(x));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_const_le_infers_truth_value() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 9);
        let b = truth_var(&mut solver);
        solver.subtree_add_var(st, x, false);
        solver.subtree_add_var(st, b, false);
        solver.add_scoped(st, Box::new(InRangeConstraint::new(x, ValueRange::new(0, 3))));
        solver.add_scoped(st, Box::new(ConstLEConstraint::new(x, 5, b)));
        solver.activate(st);
        // x <= 3 < 5, so b cannot be false
        assert!(!solver.contains(b, TriState::False.as_u32()));
        solver.discard(st);
    }
}
