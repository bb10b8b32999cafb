//! The DISTINCT constraint.

use castor_common::ValueId;
use castor_core::{ConstraintId, Priority, Propagator, Solver, VarId};
use smallvec::SmallVec;

/// Prunes solutions already emitted by a DISTINCT query.
///
/// Beside the set of emitted tuples, one auxiliary map per requested
/// variable indexes the tuples by their projection with that variable
/// omitted; forward checking then removes every value that would only
/// reproduce an emitted solution.
pub struct DistinctConstraint {
    /// CP variables of the requested SPARQL variables.
    cps: Vec<VarId>,
    solutions: hashbrown::HashSet<Vec<ValueId>>,
    indexes: Vec<hashbrown::HashMap<Vec<ValueId>, SmallVec<[ValueId; 4]>>>,
}

impl DistinctConstraint {
    pub fn new(cps: Vec<VarId>) -> Self {
        let n = cps.len();
        Self {
            cps,
            solutions: hashbrown::HashSet::new(),
            indexes: (0..n).map(|_| hashbrown::HashMap::new()).collect(),
        }
    }

    /// Record an emitted solution tuple. The caller must `refresh` this
    /// constraint afterwards so active subtrees repost it.
    pub fn add_solution(&mut self, tuple: &[ValueId]) {
        debug_assert_eq!(tuple.len(), self.cps.len());
        if !self.solutions.insert(tuple.to_vec()) {
            return;
        }
        for (i, index) in self.indexes.iter_mut().enumerate() {
            let mut key = tuple.to_vec();
            key.remove(i);
            index.entry(key).or_default().push(tuple[i]);
        }
    }

    /// Forget every recorded solution.
    pub fn reset(&mut self) {
        self.solutions.clear();
        for index in &mut self.indexes {
            index.clear();
        }
    }
}

impl Propagator for DistinctConstraint {
    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn register(&mut self, solver: &mut Solver, me: ConstraintId) {
        for &cp in &self.cps {
            solver.register_bind(cp, me);
        }
    }

    fn propagate(&mut self, solver: &mut Solver, _me: ConstraintId) -> bool {
        let mut tuple = Vec::with_capacity(self.cps.len());
        let mut unbound: Option<usize> = None;
        for (i, &cp) in self.cps.iter().enumerate() {
            if solver.is_bound(cp) && !solver.contains(cp, 0) {
                tuple.push(solver.value(cp));
            } else if solver.contains(cp, 0) && solver.size(cp) == 1 {
                tuple.push(0);
            } else if unbound.is_some() {
                return true; // too many unbound variables
            } else {
                unbound = Some(i);
                tuple.push(0);
            }
        }
        match unbound {
            None => !self.solutions.contains(&tuple),
            Some(i) => {
                let mut key = tuple;
                key.remove(i);
                if let Some(forbidden) = self.indexes[i].get(&key) {
                    let cp = self.cps[i];
                    for &v in forbidden {
                        if !solver.remove(cp, v) {
                            return false;
                        }
                    }
                }
                true
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
