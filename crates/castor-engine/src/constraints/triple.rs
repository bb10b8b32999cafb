//! The triple-pattern constraint.

use std::sync::Arc;

use castor_common::{Triple, ValueId};
use castor_core::{ConstraintId, Priority, Propagator, Solver, Store, VarId};

/// One slot of a triple pattern: a fixed value id or a CP variable.
#[derive(Debug, Clone, Copy)]
pub enum PatternSlot {
    /// Constant value id (> 0).
    Value(ValueId),
    /// CP variable holding the candidate ids.
    Var(VarId),
}

/// Prunes the variables of one triple pattern against the store.
///
/// With `k` unbound slots: `k = 0` probes for existence; otherwise the
/// ordering placing the unbound slots last is scanned over the current
/// bounds and every unbound slot is restricted to the ids observed in
/// matching triples. The constraint is entailed once at most one slot
/// remains unbound.
pub struct TripleConstraint {
    store: Arc<Store>,
    slots: [PatternSlot; 3],
    posted: bool,
}

impl TripleConstraint {
    pub fn new(store: Arc<Store>, slots: [PatternSlot; 3]) -> Self {
        Self {
            store,
            slots,
            posted: false,
        }
    }

    fn slot_bounds(&self, solver: &Solver, i: usize) -> (ValueId, ValueId) {
        match self.slots[i] {
            PatternSlot::Value(v) => (v, v),
            PatternSlot::Var(x) => (solver.min(x), solver.max(x)),
        }
    }

    fn bound_count(&self, solver: &Solver) -> usize {
        self.slots
            .iter()
            .filter(|slot| match slot {
                PatternSlot::Value(_) => true,
                PatternSlot::Var(x) => solver.is_bound(*x),
            })
            .count()
    }
}

impl Propagator for TripleConstraint {
    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn stateless(&self) -> bool {
        true
    }

    fn init(&mut self, _solver: &mut Solver, _me: ConstraintId) {
        self.posted = false;
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        for slot in self.slots {
            if let PatternSlot::Var(x) = slot {
                solver.register_bind(x, me);
            }
        }
    }

    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if self.posted {
            return true;
        }
        self.propagate(solver, me)
    }

    fn restore(&mut self, solver: &mut Solver, me: ConstraintId) {
        let done = self.bound_count(solver) >= 2;
        solver.set_done(me, done);
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        self.posted = true;

        let mut min = Triple::default();
        let mut max = Triple::default();
        for i in 0..3 {
            let (lo, hi) = self.slot_bounds(solver, i);
            min[i] = lo;
            max[i] = hi;
        }
        let bound = self.bound_count(solver);

        if bound == 0 {
            // nothing bound yet; scanning every triple buys nothing
            return true;
        }
        if bound >= 2 {
            solver.set_done(me, true);
        }

        let store = self.store.clone();
        let mut range = store.triple_range(min, max, None);

        if bound == 3 {
            return range.next().is_some();
        }

        let open: Vec<usize> = (0..3).filter(|&i| min[i] != max[i]).collect();
        for &i in &open {
            if let PatternSlot::Var(x) = self.slots[i] {
                solver.clear_marks(x);
            }
        }
        'triples: while let Some(t) = range.next() {
            for &i in &open {
                if let PatternSlot::Var(x) = self.slots[i] {
                    if !solver.contains(x, t[i]) {
                        continue 'triples;
                    }
                }
            }
            for &i in &open {
                if let PatternSlot::Var(x) = self.slots[i] {
                    solver.mark(x, t[i]);
                }
            }
        }
        for &i in &open {
            if let PatternSlot::Var(x) = self.slots[i] {
                if !solver.restrict_to_marks(x) {
                    return false;
                }
            }
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
