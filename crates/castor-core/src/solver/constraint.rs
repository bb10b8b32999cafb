//! Constraint trait and identifiers.

use std::any::Any;

use super::Solver;

/// Index of a variable in the solver arena.
pub type VarId = usize;
/// Index of a constraint in the solver arena.
pub type ConstraintId = usize;
/// Index of a subtree in the solver arena.
pub type SubtreeId = usize;

/// Propagation priority. Queues drain strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Value- or bound-based constraints; very cheap propagation.
    High,
    /// Default for most constraints.
    Medium,
    /// Heavy scan constraints, run after the cheap ones pruned.
    Low,
}

impl Priority {
    /// Number of priority levels.
    pub const COUNT: usize = 3;

    /// Queue index of this priority.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A propagator attached to the solver.
///
/// The solver owns the boxed propagator in an arena slot; during a call
/// the box is temporarily taken out so the propagator can freely mutate
/// domains through the solver handle. The `done` flag lives in the slot
/// (see [`Solver::set_done`]) and silences further events until restored.
pub trait Propagator: Any {
    /// Propagation priority; constant per constraint.
    fn priority(&self) -> Priority {
        Priority::Medium
    }

    /// Stateless constraints only propagate in their post method, so the
    /// solver may let them react to events before being posted.
    fn stateless(&self) -> bool {
        false
    }

    /// Event registration; called once when the constraint is added.
    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        let _ = (solver, me);
    }

    /// (Re)initialization on subtree activation; must not propagate.
    fn init(&mut self, solver: &mut Solver, me: ConstraintId) {
        let _ = (solver, me);
    }

    /// Initial propagation. Returns `false` on a domain wipeout.
    fn post(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        self.propagate(solver, me)
    }

    /// Event propagation. Returns `false` on a domain wipeout.
    fn propagate(&mut self, solver: &mut Solver, me: ConstraintId) -> bool {
        let _ = (solver, me);
        true
    }

    /// Called after a backtrack to refresh cached state.
    fn restore(&mut self, solver: &mut Solver, me: ConstraintId) {
        solver.set_done(me, false);
    }

    /// Downcast hook for constraints mutated from outside the solver.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
