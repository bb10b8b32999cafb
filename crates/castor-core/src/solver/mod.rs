//! Finite-domain constraint solver.
//!
//! The solver holds arenas of variables, constraints, and search
//! subtrees, addressed by plain indices; back-references between them are
//! ids, never pointers. Propagation drains three priority queues
//! strictly in order, restarting from the highest non-empty queue after
//! every step. Search is depth-first with a typed checkpoint trail per
//! subtree; subtrees nest by saving the previously active one.
//!
//! Static constraints are stamped with a timestamp; when a subtree
//! (re)activates after the static pool changed, only the newly stamped
//! constraints are replayed.

pub mod constraint;
pub mod var;

use std::collections::VecDeque;

use tracing::trace;

pub use constraint::{ConstraintId, Priority, Propagator, SubtreeId, VarId};
pub use var::{event, FdVar, VarFrame};

struct Slot {
    prop: Option<Box<dyn Propagator>>,
    priority: Priority,
    parent: Option<SubtreeId>,
    timestamp: u64,
    queued: bool,
    done: bool,
    stateless: bool,
}

struct Checkpoint {
    frames: Vec<VarFrame>,
    timestamp: u64,
    decision: Option<VarId>,
}

/// A search subtree: decision variables, scoped constraints, and the
/// trail to undo their propagation.
struct Subtree {
    /// Variables checkpointed by this subtree; decision variables first.
    vars: Vec<VarId>,
    n_decision: usize,
    constraints: [Vec<ConstraintId>; Priority::COUNT],
    trail: Vec<Checkpoint>,
    active: bool,
    started: bool,
    inconsistent: bool,
    previous: Option<SubtreeId>,
}

/// Counters kept by the solver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SolverStats {
    /// Number of backtracks.
    pub backtracks: u64,
    /// Number of subtree activations.
    pub subtrees: u64,
    /// Number of constraint post calls.
    pub posts: u64,
    /// Number of constraint propagate calls.
    pub propagates: u64,
}

/// The constraint solver.
pub struct Solver {
    vars: Vec<FdVar>,
    slots: Vec<Slot>,
    subtrees: Vec<Subtree>,
    queues: [VecDeque<ConstraintId>; Priority::COUNT],
    current: Option<SubtreeId>,
    statics: Vec<ConstraintId>,
    ts_current: u64,
    ts_last: u64,
    stats: SolverStats,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    /// A fresh solver.
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            slots: Vec::new(),
            subtrees: Vec::new(),
            queues: std::array::from_fn(|_| VecDeque::new()),
            current: None,
            statics: Vec::new(),
            ts_current: 0,
            ts_last: 0,
            stats: SolverStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    ////////////////////////////////////////////////////////////////////
    // Variables

    /// Allocate a variable with domain `min_val..=max_val`.
    pub fn new_var(&mut self, min_val: u32, max_val: u32) -> VarId {
        self.vars.push(FdVar::new(min_val, max_val));
        self.vars.len() - 1
    }

    /// Domain size of `x`.
    pub fn size(&self, x: VarId) -> usize {
        self.vars[x].size()
    }

    /// Whether `x` is bound.
    pub fn is_bound(&self, x: VarId) -> bool {
        self.vars[x].is_bound()
    }

    /// The value bound to `x`.
    pub fn value(&self, x: VarId) -> u32 {
        self.vars[x].value()
    }

    /// Loose lower bound of `x`.
    pub fn min(&self, x: VarId) -> u32 {
        self.vars[x].min()
    }

    /// Loose upper bound of `x`.
    pub fn max(&self, x: VarId) -> u32 {
        self.vars[x].max()
    }

    /// Whether `v` is in the domain of `x`.
    pub fn contains(&self, x: VarId, v: u32) -> bool {
        self.vars[x].contains(v)
    }

    /// Live domain prefix of `x`.
    pub fn domain(&self, x: VarId) -> &[u32] {
        self.vars[x].domain()
    }

    /// Value at slot `i` of the domain array of `x`.
    pub fn dom_at(&self, x: VarId, i: usize) -> u32 {
        self.vars[x].dom_at(i)
    }

    /// Number of marked values of `x`.
    pub fn marked(&self, x: VarId) -> usize {
        self.vars[x].marked()
    }

    /// Bind `x` to `v`, firing events. Only callable while propagating.
    pub fn bind(&mut self, x: VarId, v: u32) -> bool {
        let (ok, ev) = self.vars[x].bind(v);
        self.dispatch(x, ev);
        ok
    }

    /// Remove `v` from `x`, firing events.
    pub fn remove(&mut self, x: VarId, v: u32) -> bool {
        let (ok, ev) = self.vars[x].remove(v);
        self.dispatch(x, ev);
        ok
    }

    /// Raise the lower bound of `x` to `v`, firing events.
    pub fn update_min(&mut self, x: VarId, v: u32) -> bool {
        let (ok, ev) = self.vars[x].update_min(v);
        self.dispatch(x, ev);
        ok
    }

    /// Lower the upper bound of `x` to `v`, firing events.
    pub fn update_max(&mut self, x: VarId, v: u32) -> bool {
        let (ok, ev) = self.vars[x].update_max(v);
        self.dispatch(x, ev);
        ok
    }

    /// Mark `v` in `x` for a later restriction.
    pub fn mark(&mut self, x: VarId, v: u32) {
        self.vars[x].mark(v);
    }

    /// Clear the marks of `x`.
    pub fn clear_marks(&mut self, x: VarId) {
        self.vars[x].clear_marks();
    }

    /// Restrict `x` to its marked values, firing events.
    pub fn restrict_to_marks(&mut self, x: VarId) -> bool {
        let (ok, ev) = self.vars[x].restrict_to_marks();
        self.dispatch(x, ev);
        ok
    }

    /// Register `c` on the bind event of `x`.
    pub fn register_bind(&mut self, x: VarId, c: ConstraintId) {
        self.vars[x].on_bind.push(c);
    }

    /// Register `c` on the change event of `x`.
    pub fn register_change(&mut self, x: VarId, c: ConstraintId) {
        self.vars[x].on_change.push(c);
    }

    /// Register `c` on the lower-bound event of `x`.
    pub fn register_min(&mut self, x: VarId, c: ConstraintId) {
        self.vars[x].on_min.push(c);
    }

    /// Register `c` on the upper-bound event of `x`.
    pub fn register_max(&mut self, x: VarId, c: ConstraintId) {
        self.vars[x].on_max.push(c);
    }

    fn dispatch(&mut self, x: VarId, events: u8) {
        if events == 0 {
            return;
        }
        if events & event::MIN != 0 {
            let list = self.vars[x].on_min.clone();
            self.enqueue(&list);
        }
        if events & event::MAX != 0 {
            let list = self.vars[x].on_max.clone();
            self.enqueue(&list);
        }
        if events & event::CHANGE != 0 {
            let list = self.vars[x].on_change.clone();
            self.enqueue(&list);
        }
        if events & event::BIND != 0 {
            let list = self.vars[x].on_bind.clone();
            self.enqueue(&list);
        }
    }

    ////////////////////////////////////////////////////////////////////
    // Constraints

    /// Add a static (query-wide) constraint.
    pub fn add_static(&mut self, prop: Box<dyn Propagator>) -> ConstraintId {
        self.ts_last += 1;
        let id = self.insert_slot(prop, None, self.ts_last);
        self.statics.push(id);
        id
    }

    /// Stamp a static constraint as updated so it gets reposted on the
    /// next activation.
    pub fn refresh(&mut self, c: ConstraintId) {
        self.ts_last += 1;
        self.slots[c].timestamp = self.ts_last;
    }

    /// Add a constraint scoped to a subtree.
    pub fn add_scoped(&mut self, st: SubtreeId, prop: Box<dyn Propagator>) -> ConstraintId {
        let id = self.insert_slot(prop, Some(st), 0);
        let p = self.slots[id].priority.index();
        self.subtrees[st].constraints[p].push(id);
        id
    }

    fn insert_slot(
        &mut self,
        prop: Box<dyn Propagator>,
        parent: Option<SubtreeId>,
        timestamp: u64,
    ) -> ConstraintId {
        let id = self.slots.len();
        self.slots.push(Slot {
            priority: prop.priority(),
            stateless: prop.stateless(),
            prop: Some(prop),
            parent,
            timestamp,
            queued: false,
            done: false,
        });
        let mut prop = self.slots[id].prop.take().expect("fresh slot");
        prop.register(self, id);
        self.slots[id].prop = Some(prop);
        id
    }

    /// Set the done flag of a constraint; a done constraint ignores
    /// events until restored.
    pub fn set_done(&mut self, c: ConstraintId, done: bool) {
        self.slots[c].done = done;
    }

    /// Whether a constraint is done.
    pub fn is_done(&self, c: ConstraintId) -> bool {
        self.slots[c].done
    }

    /// Mutable access to a constraint's concrete type, for state updates
    /// coming from outside propagation (solution recording).
    pub fn with_constraint<T: Propagator, R>(
        &mut self,
        c: ConstraintId,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        let prop = self.slots[c].prop.as_mut().expect("constraint in use");
        let any = prop.as_any_mut();
        f(any.downcast_mut::<T>().expect("constraint type mismatch"))
    }

    /// Enqueue every eligible constraint in `list` for propagation.
    pub fn enqueue(&mut self, list: &[ConstraintId]) {
        for &c in list {
            let slot = &self.slots[c];
            if slot.done || slot.queued {
                continue;
            }
            let eligible = match slot.parent {
                None => slot.timestamp <= self.ts_current,
                Some(parent) => self.current == Some(parent),
            };
            if eligible {
                self.slots[c].queued = true;
                let p = self.slots[c].priority.index();
                self.queues[p].push_back(c);
            }
        }
    }

    fn run_init(&mut self, c: ConstraintId) {
        self.slots[c].done = false;
        let mut prop = self.slots[c].prop.take().expect("constraint re-entry");
        prop.init(self, c);
        self.slots[c].prop = Some(prop);
    }

    fn run_post(&mut self, c: ConstraintId) -> bool {
        self.stats.posts += 1;
        let mut prop = self.slots[c].prop.take().expect("constraint re-entry");
        let ok = prop.post(self, c);
        self.slots[c].prop = Some(prop);
        ok
    }

    fn run_propagate(&mut self, c: ConstraintId) -> bool {
        self.stats.propagates += 1;
        let mut prop = self.slots[c].prop.take().expect("constraint re-entry");
        let ok = prop.propagate(self, c);
        self.slots[c].prop = Some(prop);
        ok
    }

    fn run_restore(&mut self, c: ConstraintId) {
        let mut prop = self.slots[c].prop.take().expect("constraint re-entry");
        prop.restore(self, c);
        self.slots[c].prop = Some(prop);
    }

    ////////////////////////////////////////////////////////////////////
    // Propagation

    /// Run propagation to fixpoint or failure. On failure the queue is
    /// left for the backtrack to flush.
    pub fn propagate(&mut self) -> bool {
        'fixpoint: loop {
            for p in 0..Priority::COUNT {
                if let Some(c) = self.queues[p].pop_front() {
                    // the queued flag stays up during the call so the
                    // constraint does not react to its own domain events
                    let ok = self.run_propagate(c);
                    self.slots[c].queued = false;
                    if !ok {
                        return false;
                    }
                    continue 'fixpoint;
                }
            }
            return true;
        }
    }

    /// Flush the propagation queues after a failure.
    fn clear_queue(&mut self) {
        for p in 0..Priority::COUNT {
            while let Some(c) = self.queues[p].pop_front() {
                self.slots[c].queued = false;
            }
        }
    }

    /// Post every static constraint stamped after the current timestamp.
    fn post_static(&mut self) -> bool {
        let ts = self.ts_current;
        self.ts_current = self.ts_last;
        let pending: Vec<ConstraintId> = self
            .statics
            .iter()
            .copied()
            .filter(|&c| self.slots[c].timestamp > ts)
            .collect();
        for &c in &pending {
            // block event enqueueing until posted, except for stateless
            // constraints which may propagate early
            self.slots[c].queued = !self.slots[c].stateless;
            self.run_init(c);
        }
        for &c in &pending {
            if !self.run_post(c) {
                return false;
            }
            self.slots[c].queued = false;
        }
        self.propagate()
    }

    /// Post the scoped constraints of a subtree: initial propagation
    /// runs within each priority before moving to the next.
    fn post_scoped(&mut self, st: SubtreeId) -> bool {
        let lists = self.subtrees[st].constraints.clone();
        for list in &lists {
            for &c in list {
                self.slots[c].queued = !self.slots[c].stateless;
                self.run_init(c);
            }
        }
        for list in &lists {
            for &c in list {
                self.slots[c].queued = true;
            }
            for &c in list {
                if !self.run_post(c) {
                    return false;
                }
                self.slots[c].queued = false;
            }
            if !self.propagate() {
                return false;
            }
        }
        true
    }

    ////////////////////////////////////////////////////////////////////
    // Subtrees

    /// Allocate an empty subtree.
    pub fn new_subtree(&mut self) -> SubtreeId {
        self.subtrees.push(Subtree {
            vars: Vec::new(),
            n_decision: 0,
            constraints: Default::default(),
            trail: Vec::new(),
            active: false,
            started: false,
            inconsistent: false,
            previous: None,
        });
        self.subtrees.len() - 1
    }

    /// Attach a variable to a subtree. Decision variables are labeled by
    /// the search; other variables are only checkpointed.
    pub fn subtree_add_var(&mut self, st: SubtreeId, x: VarId, decision: bool) {
        let sub = &mut self.subtrees[st];
        if decision {
            let at = sub.n_decision;
            sub.vars.insert(at, x);
            sub.n_decision += 1;
        } else {
            sub.vars.push(x);
        }
    }

    /// Whether the subtree is active.
    pub fn is_active(&self, st: SubtreeId) -> bool {
        self.subtrees[st].active
    }

    /// Whether the subtree is the currently searched one.
    pub fn is_current(&self, st: SubtreeId) -> bool {
        self.current == Some(st)
    }

    /// Activate a subtree: replay pending static constraints, then post
    /// the scoped ones.
    pub fn activate(&mut self, st: SubtreeId) {
        debug_assert!(!self.subtrees[st].active, "subtree already active");
        self.stats.subtrees += 1;
        let previous = self.current;
        {
            let sub = &mut self.subtrees[st];
            sub.active = true;
            sub.previous = previous;
            sub.trail.clear();
            sub.trail.reserve(sub.vars.len() + 1);
        }
        self.checkpoint(st, None);
        self.current = None;
        let mut inconsistent = false;
        if self.ts_current < self.ts_last {
            inconsistent = !self.post_static();
        }
        self.current = Some(st);
        if !inconsistent {
            inconsistent = !self.post_scoped(st);
        }
        let sub = &mut self.subtrees[st];
        sub.inconsistent = inconsistent;
        sub.started = false;
        trace!(subtree = st, inconsistent, "activated subtree");
    }

    /// Discard a subtree, undoing all of its domain changes.
    pub fn discard(&mut self, st: SubtreeId) {
        debug_assert!(self.is_current(st), "only the current subtree can be discarded");
        if !self.subtrees[st].trail.is_empty() {
            self.subtrees[st].trail.truncate(1);
            self.backtrack(st);
        }
        self.current = self.subtrees[st].previous;
        self.subtrees[st].active = false;
    }

    /// Search for the next solution of the current subtree. When the
    /// subtree is exhausted it is discarded automatically.
    pub fn search(&mut self, st: SubtreeId) -> bool {
        debug_assert!(self.is_current(st), "only the current subtree can be searched");
        if self.subtrees[st].inconsistent {
            self.discard(st);
            return false;
        }

        let mut x: Option<VarId> = if self.subtrees[st].started {
            match self.backtrack(st) {
                Some(x) => Some(x),
                None => {
                    self.discard(st);
                    return false;
                }
            }
        } else {
            self.subtrees[st].started = true;
            None
        };

        loop {
            let need_pick = match x {
                None => true,
                Some(v) => self.vars[v].is_bound(),
            };
            if need_pick {
                // pick the unbound decision variable with the smallest
                // domain
                let sub = &self.subtrees[st];
                let mut best: Option<(VarId, usize)> = None;
                for &y in &sub.vars[..sub.n_decision] {
                    let sy = self.vars[y].size();
                    if sy > 1 && best.map_or(true, |(_, sb)| sy < sb) {
                        best = Some((y, sy));
                    }
                }
                match best {
                    Some((y, _)) => x = Some(y),
                    None => return true, // a solution
                }
            }
            let xv = x.expect("decision variable selected");
            self.checkpoint(st, Some(xv));
            let head = self.vars[xv].value();
            let bound = self.bind(xv, head);
            debug_assert!(bound);
            if !self.propagate() {
                match self.backtrack(st) {
                    Some(y) => x = Some(y),
                    None => {
                        self.discard(st);
                        return false;
                    }
                }
            }
        }
    }

    fn checkpoint(&mut self, st: SubtreeId, decision: Option<VarId>) {
        let frames = self.subtrees[st]
            .vars
            .iter()
            .map(|&x| self.vars[x].frame())
            .collect();
        self.subtrees[st].trail.push(Checkpoint {
            frames,
            timestamp: self.ts_current,
            decision,
        });
    }

    /// Pop checkpoints until one survives removal of its failed choice,
    /// returning its decision variable, or `None` when the subtree is
    /// fully explored.
    fn backtrack(&mut self, st: SubtreeId) -> Option<VarId> {
        loop {
            self.stats.backtracks += 1;
            let chkp = self.subtrees[st].trail.pop()?;
            let vars_list = self.subtrees[st].vars.clone();
            for (frame, &x) in chkp.frames.iter().zip(vars_list.iter()) {
                self.vars[x].restore(frame);
            }
            self.ts_current = chkp.timestamp;
            self.clear_queue();
            let Some(x) = chkp.decision else {
                return None;
            };
            for p in 0..Priority::COUNT {
                let list = self.subtrees[st].constraints[p].clone();
                for c in list {
                    self.run_restore(c);
                }
            }
            // remove the failed choice and resume propagation
            let head = self.vars[x].value();
            if !self.remove(x, head) {
                continue;
            }
            if self.ts_current < self.ts_last && !self.post_static() {
                continue;
            }
            if !self.propagate() {
                continue;
            }
            return Some(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x != y + offset, forward checking on bind.
    struct NotEqualOffset {
        x: VarId,
        y: VarId,
        offset: i64,
    }

    impl Propagator for NotEqualOffset {
        fn priority(&self) -> Priority {
            Priority::High
        }

        fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
            solver.register_bind(self.x, me);
            solver.register_bind(self.y, me);
        }

        fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
            if solver.is_bound(self.x) {
                solver.set_done(me, true);
                let forbidden = i64::from(solver.value(self.x)) - self.offset;
                u32::try_from(forbidden).map_or(true, |v| solver.remove(self.y, v))
            } else if solver.is_bound(self.y) {
                solver.set_done(me, true);
                let forbidden = i64::from(solver.value(self.y)) + self.offset;
                u32::try_from(forbidden).map_or(true, |v| solver.remove(self.x, v))
            } else {
                true
            }
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn queens(n: u32) -> usize {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let vars: Vec<VarId> = (0..n).map(|_| solver.new_var(0, n - 1)).collect();
        for &x in &vars {
            solver.subtree_add_var(st, x, true);
        }
        for i in 0..n as usize {
            for j in i + 1..n as usize {
                let d = (j - i) as i64;
                for offset in [0, d, -d] {
                    solver.add_scoped(
                        st,
                        Box::new(NotEqualOffset {
                            x: vars[i],
                            y: vars[j],
                            offset,
                        }),
                    );
                }
            }
        }
        solver.activate(st);
        let mut solutions = 0;
        while solver.search(st) {
            solutions += 1;
        }
        solutions
    }

    #[test]
    fn test_queens_solution_counts() {
        assert_eq!(queens(4), 2);
        assert_eq!(queens(6), 4);
        assert_eq!(queens(8), 92);
    }

    #[test]
    fn test_backtrack_round_trip_restores_domains() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 4);
        let y = solver.new_var(0, 4);
        solver.subtree_add_var(st, x, true);
        solver.subtree_add_var(st, y, true);
        solver.activate(st);
        assert!(solver.search(st)); // first solution binds both
        assert!(solver.is_bound(x) && solver.is_bound(y));
        solver.discard(st);
        assert_eq!(solver.size(x), 5);
        assert_eq!(solver.size(y), 5);
        assert_eq!(solver.min(x), 0);
        assert_eq!(solver.max(x), 4);
    }

    #[test]
    fn test_search_enumerates_cartesian_product() {
        let mut solver = Solver::new();
        let st = solver.new_subtree();
        let x = solver.new_var(0, 2);
        let y = solver.new_var(0, 1);
        solver.subtree_add_var(st, x, true);
        solver.subtree_add_var(st, y, true);
        solver.activate(st);
        let mut seen = Vec::new();
        while solver.search(st) {
            seen.push((solver.value(x), solver.value(y)));
        }
        seen.sort_unstable();
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], (0, 0));
        assert_eq!(seen[5], (2, 1));
        assert!(!solver.is_active(st));
    }

    #[test]
    fn test_nested_subtrees_restore_previous() {
        let mut solver = Solver::new();
        let outer = solver.new_subtree();
        let inner = solver.new_subtree();
        let x = solver.new_var(0, 1);
        let y = solver.new_var(0, 1);
        solver.subtree_add_var(outer, x, true);
        solver.subtree_add_var(inner, y, true);
        solver.activate(outer);
        assert!(solver.search(outer));
        solver.activate(inner);
        assert!(solver.is_current(inner));
        while solver.search(inner) {}
        assert!(solver.is_current(outer));
        solver.discard(outer);
    }
}
