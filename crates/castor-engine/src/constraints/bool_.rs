//! Boolean connectives over ternary truth variables.
//!
//! The connectives follow SPARQL's three-valued logic: `&&` is false as
//! soon as one side is false, `||` is true as soon as one side is true,
//! and errors propagate otherwise.

use castor_common::TriState;
use castor_core::{ConstraintId, Priority, Propagator, Solver, VarId};

use super::{ts_bind, ts_contains, ts_remove, ts_value};

/// `y = !x` (errors map to errors).
pub struct NotConstraint {
    x: VarId,
    y: VarId,
}

impl NotConstraint {
    pub fn new(x: VarId, y: VarId) -> Self {
        Self { x, y }
    }
}

impl Propagator for NotConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.register_change(self.x, me);
        solver.register_change(self.y, me);
    }

    fn propagate(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        let (x, y) = (self.x, self.y);
        (ts_contains(solver, x, TriState::True) || ts_remove(solver, y, TriState::False))
            && (ts_contains(solver, x, TriState::False) || ts_remove(solver, y, TriState::True))
            && (ts_contains(solver, x, TriState::Error) || ts_remove(solver, y, TriState::Error))
            && (ts_contains(solver, y, TriState::True) || ts_remove(solver, x, TriState::False))
            && (ts_contains(solver, y, TriState::False) || ts_remove(solver, x, TriState::True))
            && (ts_contains(solver, y, TriState::Error) || ts_remove(solver, x, TriState::Error))
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `b = x && y` in SPARQL three-valued logic.
pub struct AndConstraint {
    x: VarId,
    y: VarId,
    b: VarId,
}

impl AndConstraint {
    pub fn new(x: VarId, y: VarId, b: VarId) -> Self {
        Self { x, y, b }
    }
}

impl Propagator for AndConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        for v in [self.x, self.y, self.b] {
            solver.register_change(v, me);
        }
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        let (x, y, b) = (self.x, self.y, self.b);
        let bound_true = |s: &Solver, v| s.is_bound(v) && ts_value(s, v) == TriState::True;
        let bound_false = |s: &Solver, v| s.is_bound(v) && ts_value(s, v) == TriState::False;

        if (!ts_contains(solver, x, TriState::True) || !ts_contains(solver, y, TriState::True))
            && !ts_remove(solver, b, TriState::True)
        {
            return false;
        }
        if !ts_contains(solver, x, TriState::False)
            && !ts_contains(solver, y, TriState::False)
            && !ts_remove(solver, b, TriState::False)
        {
            return false;
        }
        if ((!ts_contains(solver, x, TriState::Error) && !ts_contains(solver, y, TriState::Error))
            || bound_false(solver, x)
            || bound_false(solver, y))
            && !ts_remove(solver, b, TriState::Error)
        {
            return false;
        }

        if !ts_contains(solver, b, TriState::True) {
            if bound_true(solver, x) && !ts_remove(solver, y, TriState::True) {
                return false;
            }
            if bound_true(solver, y) && !ts_remove(solver, x, TriState::True) {
                return false;
            }
        }
        if !ts_contains(solver, b, TriState::False)
            && (!ts_remove(solver, x, TriState::False) || !ts_remove(solver, y, TriState::False))
        {
            return false;
        }
        if !ts_contains(solver, b, TriState::Error)
            && !ts_contains(solver, x, TriState::False)
            && !ts_contains(solver, y, TriState::False)
            && (!ts_remove(solver, x, TriState::Error) || !ts_remove(solver, y, TriState::Error))
        {
            return false;
        }

        if solver.is_bound(b) && ts_value(solver, b) == TriState::False {
            if !ts_contains(solver, x, TriState::False) {
                if !ts_bind(solver, y, TriState::False) {
                    return false;
                }
            } else if !ts_contains(solver, y, TriState::False)
                && !ts_bind(solver, x, TriState::False)
            {
                return false;
            }
        }
        if solver.is_bound(b) && ts_value(solver, b) == TriState::Error {
            if !ts_contains(solver, x, TriState::Error) {
                if !ts_bind(solver, y, TriState::Error) {
                    return false;
                }
            } else if !ts_contains(solver, y, TriState::Error)
                && !ts_bind(solver, x, TriState::Error)
            {
                return false;
            }
        }

        let bound_count = usize::from(solver.is_bound(x))
            + usize::from(solver.is_bound(y))
            + usize::from(solver.is_bound(b));
        if bound_count >= 2 {
            solver.set_done(me, true);
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `b = x || y` in SPARQL three-valued logic.
pub struct OrConstraint {
    x: VarId,
    y: VarId,
    b: VarId,
}

impl OrConstraint {
    pub fn new(x: VarId, y: VarId, b: VarId) -> Self {
        Self { x, y, b }
    }
}

impl Propagator for OrConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        for v in [self.x, self.y, self.b] {
            solver.register_change(v, me);
        }
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        let (x, y, b) = (self.x, self.y, self.b);
        let bound_true = |s: &Solver, v| s.is_bound(v) && ts_value(s, v) == TriState::True;
        let bound_false = |s: &Solver, v| s.is_bound(v) && ts_value(s, v) == TriState::False;

        if (!ts_contains(solver, x, TriState::False) || !ts_contains(solver, y, TriState::False))
            && !ts_remove(solver, b, TriState::False)
        {
            return false;
        }
        if !ts_contains(solver, x, TriState::True)
            && !ts_contains(solver, y, TriState::True)
            && !ts_remove(solver, b, TriState::True)
        {
            return false;
        }
        if ((!ts_contains(solver, x, TriState::Error) && !ts_contains(solver, y, TriState::Error))
            || bound_true(solver, x)
            || bound_true(solver, y))
            && !ts_remove(solver, b, TriState::Error)
        {
            return false;
        }

        if !ts_contains(solver, b, TriState::False) {
            if bound_false(solver, x) && !ts_remove(solver, y, TriState::False) {
                return false;
            }
            if bound_false(solver, y) && !ts_remove(solver, x, TriState::False) {
                return false;
            }
        }
        if !ts_contains(solver, b, TriState::True)
            && (!ts_remove(solver, x, TriState::True) || !ts_remove(solver, y, TriState::True))
        {
            return false;
        }
        if !ts_contains(solver, b, TriState::Error)
            && !ts_contains(solver, x, TriState::True)
            && !ts_contains(solver, y, TriState::True)
            && (!ts_remove(solver, x, TriState::Error) || !ts_remove(solver, y, TriState::Error))
        {
            return false;
        }

        if solver.is_bound(b) && ts_value(solver, b) == TriState::True {
            if !ts_contains(solver, x, TriState::True) {
                if !ts_bind(solver, y, TriState::True) {
                    return false;
                }
            } else if !ts_contains(solver, y, TriState::True)
                && !ts_bind(solver, x, TriState::True)
            {
                return false;
            }
        }
        if solver.is_bound(b) && ts_value(solver, b) == TriState::Error {
            if !ts_contains(solver, x, TriState::Error) {
                if !ts_bind(solver, y, TriState::Error) {
                    return false;
                }
            } else if !ts_contains(solver, y, TriState::Error)
                && !ts_bind(solver, x, TriState::Error)
            {
                return false;
            }
        }

        let bound_count = usize::from(solver.is_bound(x))
            + usize::from(solver.is_bound(y))
            + usize::from(solver.is_bound(b));
        if bound_count >= 2 {
            solver.set_done(me, true);
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castor_core::SubtreeId;

    fn setup() -> (Solver, SubtreeId, VarId, VarId, VarId) {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 2);
        let y = solver.new_var(0, 2);
        let b = solver.new_var(0, 2);
        for v in [x, y, b] {
            solver.subtree_add_var(st, v, false);
        }
        (solver, st, x, y, b)
    }

    #[test]
    fn test_not_links_truth_values() {
        let (mut solver, st, x, y, _b) = setup();
        solver.add_scoped(st, Box::new(NotConstraint::new(x, y)));
        solver.add_scoped(
            st,
            Box::new(super::super::ConstantConstraint::new(x, TriState::False)),
        );
        solver.activate(st);
        assert!(solver.is_bound(y));
        assert_eq!(ts_value(&solver, y), TriState::True);
        solver.discard(st);
    }

    #[test]
    fn test_not_propagates_error() {
        let (mut solver, st, x, y, _b) = setup();
        solver.add_scoped(st, Box::new(NotConstraint::new(x, y)));
        solver.add_scoped(
            st,
            Box::new(super::super::ConstantConstraint::new(x, TriState::Error)),
        );
        solver.activate(st);
        assert_eq!(ts_value(&solver, y), TriState::Error);
        solver.discard(st);
    }

    #[test]
    fn test_and_false_dominates() {
        let (mut solver, st, x, y, b) = setup();
        solver.add_scoped(st, Box::new(AndConstraint::new(x, y, b)));
        solver.add_scoped(
            st,
            Box::new(super::super::ConstantConstraint::new(x, TriState::False)),
        );
        solver.activate(st);
        // false && anything is false, even error
        assert_eq!(ts_value(&solver, b), TriState::False);
        solver.discard(st);
    }

    #[test]
    fn test_or_true_dominates() {
        let (mut solver, st, x, y, b) = setup();
        solver.add_scoped(st, Box::new(OrConstraint::new(x, y, b)));
        solver.add_scoped(
            st,
            Box::new(super::super::ConstantConstraint::new(y, TriState::True)),
        );
        solver.activate(st);
        assert_eq!(ts_value(&solver, b), TriState::True);
        solver.discard(st);
    }

    #[test]
    fn test_or_required_true_forces_branch() {
        let (mut solver, st, x, y, b) = setup();
        solver.add_scoped(st, Box::new(OrConstraint::new(x, y, b)));
        solver.add_scoped(
            st,
            Box::new(super::super::ConstantConstraint::new(b, TriState::True)),
        );
        solver.add_scoped(
            st,
            Box::new(super::super::ConstantConstraint::new(x, TriState::False)),
        );
        solver.activate(st);
        assert_eq!(ts_value(&solver, y), TriState::True);
        solver.discard(st);
    }
}
