//! Equality and order constraints over value-id variables.
//!
//! These constraints lean on two store facts: equivalence classes are
//! contiguous id intervals, and within each comparable category the id
//! order agrees with the XPath value order. Bound reasoning then reduces
//! SPARQL comparisons to integer interval arithmetic on ids.

use std::sync::Arc;

use castor_common::{Category, TriState, ValueId};
use castor_core::{ConstraintId, Priority, Propagator, Solver, Store, VarId};

use super::{ts_bind, ts_contains, ts_value};

/// Reified SPARQL equality `x1 = x2 <=> b`.
pub struct VarEqConstraint {
    store: Arc<Store>,
    x1: VarId,
    x2: VarId,
    b: VarId,
    s1: usize,
    s2: usize,
}

impl VarEqConstraint {
    pub fn new(store: Arc<Store>, x1: VarId, x2: VarId, b: VarId) -> Self {
        Self {
            store,
            x1,
            x2,
            b,
            s1: 0,
            s2: 0,
        }
    }

    /// Prune from `to` every equivalence class that lost its last
    /// representative in `from`.
    fn prune_dropped(
        &self,
        solver: &mut Solver,
        from: VarId,
        to: VarId,
        new_size: usize,
        old_size: usize,
    ) -> bool {
        for i in new_size..old_size {
            let class = self.store.eq_class(solver.dom_at(from, i));
            let alive = class.iter().any(|id| solver.contains(from, id));
            if !alive {
                for id in class.iter() {
                    if !solver.remove(to, id) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl Propagator for VarEqConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.register_change(self.x1, me);
        solver.register_change(self.x2, me);
        solver.register_change(self.b, me);
    }

    fn restore(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.set_done(me, false);
        self.s1 = solver.size(self.x1);
        self.s2 = solver.size(self.x2);
    }

    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        self.s1 = solver.size(self.x1);
        self.s2 = solver.size(self.x2);
        self.propagate(solver, me)
    }

    fn propagate(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        let (x1, x2) = (self.x1, self.x2);
        if solver.is_bound(x1) && solver.is_bound(x2) {
            let v1 = solver.value(x1);
            let v2 = solver.value(x2);
            let cat1 = self.store.category(v1);
            let cat2 = self.store.category(v2);
            let truth = if self.store.eq_class(v1).contains(v2) {
                TriState::True
            } else if cat1 <= Category::Uri
                || cat2 <= Category::Uri
                || (cat1 == cat2 && cat1 <= Category::DateTime)
            {
                TriState::False
            } else {
                TriState::Error
            };
            return ts_bind(solver, self.b, truth);
        }

        if solver.is_bound(self.b) && ts_value(solver, self.b) == TriState::True {
            let n1 = solver.size(x1);
            let n2 = solver.size(x2);
            let removed = (self.s1 - n1) + (self.s2 - n2);
            if removed > 0 && removed < n1 && removed < n2 {
                // incremental: only classes that lost values can prune
                if !self.prune_dropped(solver, x1, x2, n1, self.s1) {
                    return false;
                }
                if !self.prune_dropped(solver, x2, x1, n2, self.s2) {
                    return false;
                }
            } else {
                // full pass: restrict both domains to shared classes
                let (small, large) = if n2 < n1 { (x2, x1) } else { (x1, x2) };
                solver.clear_marks(large);
                let mut n = solver.size(small);
                let mut i = 0;
                while i < n {
                    let v = solver.dom_at(small, i);
                    let class = self.store.eq_class(v);
                    let mut shared = false;
                    for id in class.iter() {
                        if solver.contains(large, id) {
                            shared = true;
                        }
                        solver.mark(large, id);
                    }
                    if shared {
                        i += 1;
                    } else {
                        for id in class.iter() {
                            if solver.contains(small, id) {
                                if !solver.remove(small, id) {
                                    return false;
                                }
                                n -= 1;
                            }
                        }
                        // the swap-removal may have moved an unseen value
                        // into this slot; revisit it
                    }
                }
                if !solver.restrict_to_marks(large) {
                    return false;
                }
            }
            self.s1 = solver.size(x1);
            self.s2 = solver.size(x2);
        } else if !ts_contains(solver, self.b, TriState::True) {
            if !ts_contains(solver, self.b, TriState::Error) {
                // required false: incomparable literals always raise a
                // type error instead, so cap both at the dateTime window
                let upper = self.store.range(Category::DateTime).to;
                if !solver.update_max(x1, upper) || !solver.update_max(x2, upper) {
                    return false;
                }
            } else if !ts_contains(solver, self.b, TriState::False) {
                // required error: only literal pairs can be incomparable
                let lower = self.store.range(Category::SimpleLiteral).from;
                if !solver.update_min(x1, lower) || !solver.update_min(x2, lower) {
                    return false;
                }
            }
            // the remaining propagation needs one side in a single
            // category
            let (mut a, mut o) = (x1, x2);
            let mut cat_min = self.store.category(solver.min(a).max(1));
            let mut cat_max = self.store.category(solver.max(a).max(1));
            if cat_min != cat_max {
                (a, o) = (x2, x1);
                cat_min = self.store.category(solver.min(a).max(1));
                cat_max = self.store.category(solver.max(a).max(1));
                if cat_min != cat_max {
                    return true;
                }
            }
            let _ = a;
            if !ts_contains(solver, self.b, TriState::Error) {
                // false: a literal forces the peer into the same
                // category or out of the literal space
                if cat_min >= Category::SimpleLiteral {
                    let rng = self.store.range(cat_min);
                    if !solver.update_max(o, rng.to) {
                        return false;
                    }
                    let lits = self.store.range(Category::SimpleLiteral);
                    for id in lits.from..rng.from {
                        if !solver.remove(o, id) {
                            return false;
                        }
                    }
                }
            } else if !ts_contains(solver, self.b, TriState::False)
                && cat_min <= Category::DateTime
            {
                // error: the peer must leave the comparable category
                for id in self.store.range(cat_min).iter() {
                    if !solver.remove(o, id) {
                        return false;
                    }
                }
                return true;
            }
            // forward checking once one side is bound
            if !solver.is_bound(x1) && !solver.is_bound(x2) {
                return true;
            }
            let (bound, free) = if solver.is_bound(x1) { (x1, x2) } else { (x2, x1) };
            for id in self.store.eq_class(solver.value(bound)).iter() {
                if !solver.remove(free, id) {
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

/// Reified SPARQL order `x1 < x2 <=> b` (or `<=` with `equality`).
pub struct VarLessConstraint {
    store: Arc<Store>,
    x1: VarId,
    x2: VarId,
    b: VarId,
    equality: bool,
}

impl VarLessConstraint {
    pub fn new(store: Arc<Store>, x1: VarId, x2: VarId, b: VarId, equality: bool) -> Self {
        Self {
            store,
            x1,
            x2,
            b,
            equality,
        }
    }
}

impl Propagator for VarLessConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        for x in [self.x1, self.x2] {
            solver.register_min(x, me);
            solver.register_max(x, me);
        }
        solver.register_change(self.b, me);
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        let (x1, x2) = (self.x1, self.x2);
        if !ts_contains(solver, self.b, TriState::Error) {
            // both sides must land in one shared comparable category
            let comparable = self
                .store
                .range_between(Category::SimpleLiteral, Category::DateTime);
            if !solver.update_min(x1, comparable.from) || !solver.update_max(x2, comparable.to) {
                return false;
            }
            let cat_min = self
                .store
                .category(solver.min(x1).max(1))
                .max(self.store.category(solver.min(x2).max(1)));
            let cat_max = self
                .store
                .category(solver.max(x1).max(1))
                .min(self.store.category(solver.max(x2).max(1)));
            if cat_min > cat_max {
                return false;
            }
            let allowed = self.store.range_between(cat_min, cat_max);
            if !solver.update_min(x1, allowed.from)
                || !solver.update_max(x1, allowed.to)
                || !solver.update_min(x2, allowed.from)
                || !solver.update_max(x2, allowed.to)
            {
                return false;
            }
        } else {
            let cat_min1 = self.store.category(solver.min(x1).max(1));
            let cat_max1 = self.store.category(solver.max(x1).max(1));
            let cat_min2 = self.store.category(solver.min(x2).max(1));
            let cat_max2 = self.store.category(solver.max(x2).max(1));
            let cat_min = cat_min1.max(cat_min2);
            let cat_max = cat_max1.min(cat_max2);
            if cat_max < Category::SimpleLiteral
                || cat_min > Category::DateTime
                || cat_min > cat_max
            {
                solver.set_done(me, true);
                return ts_bind(solver, self.b, TriState::Error);
            }
            if cat_min1 == cat_max1
                && cat_min2 == cat_max2
                && cat_min1 == cat_min2
                && cat_min1 >= Category::SimpleLiteral
                && cat_min1 <= Category::DateTime
                && !super::ts_remove(solver, self.b, TriState::Error)
            {
                return false;
            }
        }

        if !solver.is_bound(self.b) {
            return true;
        }
        match ts_value(solver, self.b) {
            TriState::Error => {
                // one side in a single category forces the other out of it
                let (mut a, mut o) = (x1, x2);
                let mut cmin = self.store.category(solver.min(a).max(1));
                let mut cmax = self.store.category(solver.max(a).max(1));
                if cmin != cmax {
                    (a, o) = (x2, x1);
                    cmin = self.store.category(solver.min(a).max(1));
                    cmax = self.store.category(solver.max(a).max(1));
                    if cmin != cmax {
                        return true;
                    }
                }
                let _ = a;
                if cmin >= Category::SimpleLiteral && cmin <= Category::DateTime {
                    for id in self.store.range(cmin).iter() {
                        if !solver.remove(o, id) {
                            return false;
                        }
                    }
                }
                solver.set_done(me, true);
                true
            }
            truth => {
                let (a, o, equality) = if truth == TriState::True {
                    (x1, x2, self.equality)
                } else {
                    (x2, x1, !self.equality)
                };
                let class_max_o = self.store.eq_class(solver.max(o));
                let cap = if equality {
                    class_max_o.to
                } else {
                    class_max_o.from - 1
                };
                if !solver.update_max(a, cap) {
                    return false;
                }
                let class_min_a = self.store.eq_class(solver.min(a));
                let floor = if equality {
                    class_min_a.from
                } else {
                    class_min_a.to + 1
                };
                if !solver.update_min(o, floor) {
                    return false;
                }
                // entailment check
                let class_max_a = self.store.eq_class(solver.max(a));
                let class_min_o = self.store.eq_class(solver.min(o));
                if (equality && class_max_a.to <= class_min_o.to)
                    || (!equality && class_max_a.to < class_min_o.from)
                {
                    solver.set_done(me, true);
                }
                true
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Reified `sameTerm(x1, x2) <=> b`; `b` never takes the error value.
pub struct VarSameTermConstraint {
    x1: VarId,
    x2: VarId,
    b: VarId,
    s1: usize,
    s2: usize,
}

impl VarSameTermConstraint {
    pub fn new(x1: VarId, x2: VarId, b: VarId) -> Self {
        Self {
            x1,
            x2,
            b,
            s1: 0,
            s2: 0,
        }
    }
}

impl Propagator for VarSameTermConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.register_change(self.x1, me);
        solver.register_change(self.x2, me);
        solver.register_change(self.b, me);
    }

    fn restore(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.set_done(me, false);
        self.s1 = solver.size(self.x1);
        self.s2 = solver.size(self.x2);
    }

    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if !super::ts_remove(solver, self.b, TriState::Error) {
            return false;
        }
        self.s1 = solver.size(self.x1);
        self.s2 = solver.size(self.x2);
        self.propagate(solver, me)
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        let (x1, x2) = (self.x1, self.x2);
        if solver.is_bound(x1) && solver.is_bound(x2) {
            let same = solver.value(x1) == solver.value(x2);
            return ts_bind(
                solver,
                self.b,
                if same { TriState::True } else { TriState::False },
            );
        }
        if !ts_contains(solver, self.b, TriState::False) {
            // required same term: intersect the domains
            let n1 = solver.size(x1);
            let n2 = solver.size(x2);
            let removed = (self.s1 - n1) + (self.s2 - n2);
            if removed > 0 && removed < n1 && removed < n2 {
                for i in n1..self.s1 {
                    let v = solver.dom_at(x1, i);
                    if !solver.remove(x2, v) {
                        return false;
                    }
                }
                for i in n2..self.s2 {
                    let v = solver.dom_at(x2, i);
                    if !solver.remove(x1, v) {
                        return false;
                    }
                }
            } else {
                let (small, large) = if n2 < n1 { (x2, x1) } else { (x1, x2) };
                solver.clear_marks(large);
                let mut n = solver.size(small);
                let mut i = 0;
                while i < n {
                    let v = solver.dom_at(small, i);
                    if solver.contains(large, v) {
                        solver.mark(large, v);
                        i += 1;
                    } else {
                        if !solver.remove(small, v) {
                            return false;
                        }
                        n -= 1;
                    }
                }
                if !solver.restrict_to_marks(large) {
                    return false;
                }
            }
            self.s1 = solver.size(x1);
            self.s2 = solver.size(x2);
        } else if !ts_contains(solver, self.b, TriState::True) {
            // required different terms: forward checking
            if solver.is_bound(x1) {
                solver.set_done(me, true);
                return solver.remove(x2, solver.value(x1));
            } else if solver.is_bound(x2) {
                solver.set_done(me, true);
                return solver.remove(x1, solver.value(x2));
            }
        }
        true
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Hard inequality `x1 != x2` under SPARQL `=`: forward checking that
/// removes the bound side's equivalence class and keeps literals in a
/// commonly comparable category.
pub struct VarDiffConstraint {
    store: Arc<Store>,
    x1: VarId,
    x2: VarId,
    posted: bool,
}

impl VarDiffConstraint {
    pub fn new(store: Arc<Store>, x1: VarId, x2: VarId) -> Self {
        Self {
            store,
            x1,
            x2,
            posted: false,
        }
    }
}

impl Propagator for VarDiffConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn stateless(&self) -> bool {
        true
    }

    fn init(&mut self, _solver: &mut Solver, _me: ConstraintId) {
        self.posted = false;
    }

    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if self.posted {
            return true;
        }
        self.propagate(solver, me)
    }

    fn restore(&mut self, solver: &mut Solver, me: ConstraintId) {
        let done = solver.is_bound(self.x1) || solver.is_bound(self.x2);
        solver.set_done(me, done);
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        self.posted = true;
        if !solver.is_bound(self.x1) && !solver.is_bound(self.x2) {
            return true;
        }
        let (bound, free) = if solver.is_bound(self.x1) {
            (self.x1, self.x2)
        } else {
            (self.x2, self.x1)
        };
        solver.set_done(me, true);
        let v = solver.value(bound);
        for id in self.store.eq_class(v).iter() {
            if !solver.remove(free, id) {
                return false;
            }
        }
        let cat = self.store.category(v);
        if cat > Category::Uri {
            // two literals of different comparable categories would
            // raise a type error, not inequality
            if cat <= Category::DateTime {
                let non_literal = self.store.range_between(Category::Blank, Category::Uri);
                let same_cat = self.store.range(cat);
                // keep only non-literals and same-category values
                for id in non_literal.to + 1..same_cat.from {
                    if !solver.remove(free, id) {
                        return false;
                    }
                }
                if !solver.update_max(free, same_cat.to) {
                    return false;
                }
            } else {
                // plain-lang and unrecognized literals never compare
                // unequal; the peer must be a non-literal
                let non_literal = self.store.range_between(Category::Blank, Category::Uri);
                if !solver.update_max(free, non_literal.to) {
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

/// Hard `!sameTerm(x1, x2)`: forward checking on bind.
pub struct VarDiffTermConstraint {
    x1: VarId,
    x2: VarId,
    posted: bool,
}

impl VarDiffTermConstraint {
    pub fn new(x1: VarId, x2: VarId) -> Self {
        Self {
            x1,
            x2,
            posted: false,
        }
    }
}

impl Propagator for VarDiffTermConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn stateless(&self) -> bool {
        true
    }

    fn init(&mut self, _solver: &mut Solver, _me: ConstraintId) {
        self.posted = false;
    }

    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if self.posted {
            return true;
        }
        self.propagate(solver, me)
    }

    fn restore(&mut self, solver: &mut Solver, me: ConstraintId) {
        let done = solver.is_bound(self.x1) || solver.is_bound(self.x2);
        solver.set_done(me, done);
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        self.posted = true;
        if solver.is_bound(self.x1) {
            solver.set_done(me, true);
            solver.remove(self.x2, solver.value(self.x1))
        } else if solver.is_bound(self.x2) {
            solver.set_done(me, true);
            solver.remove(self.x1, solver.value(self.x2))
        } else {
            true
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Both variables must take values of one shared category.
pub struct SameClassConstraint {
    store: Arc<Store>,
    x1: VarId,
    x2: VarId,
    posted: bool,
}

impl SameClassConstraint {
    pub fn new(store: Arc<Store>, x1: VarId, x2: VarId) -> Self {
        Self {
            store,
            x1,
            x2,
            posted: false,
        }
    }

    fn bounds(&self, solver: &Solver) -> (Category, Category) {
        let cat_min = self
            .store
            .category(solver.min(self.x1).max(1))
            .max(self.store.category(solver.min(self.x2).max(1)));
        let cat_max = self
            .store
            .category(solver.max(self.x1).max(1))
            .min(self.store.category(solver.max(self.x2).max(1)));
        (cat_min, cat_max)
    }
}

impl Propagator for SameClassConstraint {
    fn priority(&self) -> Priority {
        Priority::High
    }

    fn stateless(&self) -> bool {
        true
    }

    fn init(&mut self, _solver: &mut Solver, _me: ConstraintId) {
        self.posted = false;
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        for x in [self.x1, self.x2] {
            solver.register_min(x, me);
            solver.register_max(x, me);
        }
    }

    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        if self.posted {
            return true;
        }
        self.propagate(solver, me)
    }

    fn restore(&mut self, solver: &mut Solver, me: ConstraintId) {
        let (cat_min, cat_max) = self.bounds(solver);
        solver.set_done(me, cat_min == cat_max);
    }

    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        self.posted = true;
        let (cat_min, cat_max) = self.bounds(solver);
        if cat_min > cat_max {
            return false;
        }
        if cat_min == cat_max {
            solver.set_done(me, true);
        }
        let allowed = self.store.range_between(cat_min, cat_max);
        if allowed.is_empty() {
            return false;
        }
        solver.update_min(self.x1, allowed.from)
            && solver.update_max(self.x1, allowed.to)
            && solver.update_min(self.x2, allowed.from)
            && solver.update_max(self.x2, allowed.to)
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
