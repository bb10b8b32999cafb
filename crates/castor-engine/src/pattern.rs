//! Graph-pattern tree.
//!
//! Patterns compose Basic/Filter/Join/LeftJoin/Diff/Union nodes over
//! solver subtrees. A Basic pattern owns one subtree seeded with a
//! `Bound` constraint per variable and a `Triple` constraint per triple
//! pattern; compound patterns drive their children's `next`/`discard`
//! protocol to enumerate solutions.

use castor_common::{TriState, ValueId};
use castor_core::SubtreeId;

use crate::binding::VarIdx;
use crate::constraints::{BoundConstraint, PostCtx, TripleConstraint};
use crate::constraints::triple::PatternSlot;
use crate::expression::{self, Expression};
use crate::query::RunCtx;
use std::rc::Rc;

/// One component of a resolved triple pattern.
#[derive(Debug, Clone, Copy)]
pub enum PatComp {
    /// A query variable.
    Var(VarIdx),
    /// A constant resolved to a store id (> 0).
    Value(ValueId),
}

/// A resolved triple pattern.
pub type TriplePat = [PatComp; 3];

/// A node of the pattern tree.
pub enum PatternNode {
    /// No solutions.
    False,
    /// Basic graph pattern: a set of triple patterns over one subtree.
    Basic(BasicPattern),
    /// Filtered subpattern.
    Filter(FilterPattern),
    /// Concatenation: the right pattern re-runs per left solution.
    Join(Box<PatternNode>, Box<PatternNode>),
    /// OPTIONAL: left solutions with or without right extensions.
    LeftJoin {
        left: Box<PatternNode>,
        right: Box<PatternNode>,
        consistent: bool,
    },
    /// Left solutions with no right match.
    Diff(Box<PatternNode>, Box<PatternNode>),
    /// Disjunction; exhausts left, then right.
    Union {
        left: Box<PatternNode>,
        right: Box<PatternNode>,
        on_right: bool,
    },
}

/// A basic graph pattern and its solver subtree.
pub struct BasicPattern {
    triples: Vec<TriplePat>,
    sub: Option<SubtreeId>,
}

impl BasicPattern {
    /// An empty basic pattern (matches the empty solution once).
    pub fn new(triples: Vec<TriplePat>) -> Self {
        Self { triples, sub: None }
    }

    /// The subtree, available after `init`.
    pub fn subtree(&self) -> Option<SubtreeId> {
        self.sub
    }
}

/// A pattern wrapped with a filter condition.
pub struct FilterPattern {
    pub child: Box<PatternNode>,
    pub condition: Rc<Expression>,
}

impl PatternNode {
    /// The variables occurring in this pattern.
    pub fn variables(&self) -> Vec<VarIdx> {
        let mut out = Vec::new();
        self.collect_vars(&mut out, false);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The certain variables: always bound when the pattern matches.
    pub fn certain_variables(&self) -> Vec<VarIdx> {
        let mut out = Vec::new();
        self.collect_vars(&mut out, true);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_vars(&self, out: &mut Vec<VarIdx>, certain: bool) {
        match self {
            PatternNode::False => {}
            PatternNode::Basic(basic) => {
                for t in &basic.triples {
                    for c in t {
                        if let PatComp::Var(i) = c {
                            out.push(*i);
                        }
                    }
                }
            }
            PatternNode::Filter(f) => f.child.collect_vars(out, certain),
            PatternNode::Join(l, r) => {
                l.collect_vars(out, certain);
                r.collect_vars(out, certain);
            }
            PatternNode::LeftJoin { left, right, .. } => {
                left.collect_vars(out, certain);
                if !certain {
                    right.collect_vars(out, certain);
                }
            }
            PatternNode::Diff(l, _) => l.collect_vars(out, certain),
            PatternNode::Union { left, right, .. } => {
                if certain {
                    let lv = left.certain_variables();
                    let rv = right.certain_variables();
                    out.extend(lv.into_iter().filter(|v| rv.contains(v)));
                } else {
                    left.collect_vars(out, certain);
                    right.collect_vars(out, certain);
                }
            }
        }
    }

    /// Rewrite `Filter(LeftJoin(l, r), !BOUND(?x))` with `?x` certain in
    /// `r` and absent from `l` into `Diff(l, r)`.
    pub fn optimize(self) -> PatternNode {
        match self {
            PatternNode::Filter(f) => {
                let child = f.child.optimize();
                if let PatternNode::LeftJoin { left, right, .. } = &child {
                    if let Expression::Not(arg) = &*f.condition {
                        if let Expression::Bound(x) = &**arg {
                            if right.certain_variables().contains(x)
                                && !left.variables().contains(x)
                            {
                                if let PatternNode::LeftJoin { left, right, .. } = child {
                                    return PatternNode::Diff(left, right);
                                }
                                unreachable!("matched above");
                            }
                        }
                    }
                }
                PatternNode::Filter(FilterPattern {
                    child: Box::new(child),
                    condition: f.condition,
                })
            }
            PatternNode::Join(l, r) => {
                PatternNode::Join(Box::new(l.optimize()), Box::new(r.optimize()))
            }
            PatternNode::LeftJoin {
                left,
                right,
                consistent,
            } => PatternNode::LeftJoin {
                left: Box::new(left.optimize()),
                right: Box::new(right.optimize()),
                consistent,
            },
            PatternNode::Diff(l, r) => {
                PatternNode::Diff(Box::new(l.optimize()), Box::new(r.optimize()))
            }
            PatternNode::Union {
                left,
                right,
                on_right,
            } => PatternNode::Union {
                left: Box::new(left.optimize()),
                right: Box::new(right.optimize()),
                on_right,
            },
            other => other,
        }
    }

    /// Build subtrees and constraints, recursively.
    pub fn init(&mut self, ctx: &mut RunCtx) {
        match self {
            PatternNode::False => {}
            PatternNode::Basic(basic) => {
                let sub = ctx.solver.new_subtree();
                basic.sub = Some(sub);
                let mut seen: Vec<VarIdx> = Vec::new();
                for t in &basic.triples {
                    for c in t {
                        if let PatComp::Var(i) = c {
                            if !seen.contains(i) {
                                seen.push(*i);
                            }
                        }
                    }
                }
                for &i in &seen {
                    let cp = ctx.vars[i].cp();
                    ctx.solver.subtree_add_var(sub, cp, true);
                    ctx.solver
                        .add_scoped(sub, Box::new(BoundConstraint::new(cp)));
                }
                for t in &basic.triples {
                    let slots = t.map(|c| match c {
                        PatComp::Var(i) => PatternSlot::Var(ctx.vars[i].cp()),
                        PatComp::Value(id) => PatternSlot::Value(id),
                    });
                    ctx.solver.add_scoped(
                        sub,
                        Box::new(TripleConstraint::new(ctx.store.clone(), slots)),
                    );
                }
            }
            PatternNode::Filter(f) => {
                f.child.init(ctx);
                if let PatternNode::Basic(basic) = &*f.child {
                    let sub = basic.sub.expect("initialized basic pattern");
                    let mut post_ctx = PostCtx {
                        solver: &mut ctx.solver,
                        store: &ctx.store,
                        vars: &ctx.vars,
                    };
                    expression::post(&f.condition, &mut post_ctx, sub, None);
                }
            }
            PatternNode::Join(l, r) => {
                l.init(ctx);
                r.init(ctx);
            }
            PatternNode::LeftJoin { left, right, .. } | PatternNode::Diff(left, right) => {
                left.init(ctx);
                right.init(ctx);
            }
            PatternNode::Union { left, right, .. } => {
                left.init(ctx);
                right.init(ctx);
            }
        }
    }

    /// Advance to the next solution of this pattern.
    pub fn next(&mut self, ctx: &mut RunCtx) -> bool {
        match self {
            PatternNode::False => false,
            PatternNode::Basic(basic) => {
                let sub = basic.sub.expect("initialized basic pattern");
                if !ctx.solver.is_active(sub) {
                    ctx.solver.activate(sub);
                } else if !ctx.solver.is_current(sub) {
                    // a deeper pattern drives the search for now
                    return true;
                }
                ctx.solver.search(sub)
            }
            PatternNode::Filter(f) => {
                if matches!(&*f.child, PatternNode::Basic(_)) {
                    // the condition is posted inside the child's subtree
                    f.child.next(ctx)
                } else {
                    while f.child.next(ctx) {
                        for i in f.condition.variables() {
                            let v = ctx.value_from_cp(i);
                            ctx.bindings[i] = v;
                        }
                        if f.condition.evaluate_ebv(&ctx.store, &ctx.bindings) == TriState::True {
                            return true;
                        }
                    }
                    false
                }
            }
            PatternNode::Join(l, r) => {
                while l.next(ctx) {
                    if r.next(ctx) {
                        return true;
                    }
                }
                false
            }
            PatternNode::LeftJoin {
                left,
                right,
                consistent,
            } => {
                while left.next(ctx) {
                    if right.next(ctx) {
                        *consistent = true;
                        return true;
                    } else if !*consistent {
                        // no extension at all: emit left with right unbound
                        return true;
                    }
                    *consistent = false;
                }
                false
            }
            PatternNode::Diff(l, r) => {
                while l.next(ctx) {
                    if r.next(ctx) {
                        r.discard(ctx);
                    } else {
                        return true;
                    }
                }
                false
            }
            PatternNode::Union {
                left,
                right,
                on_right,
            } => {
                if !*on_right && left.next(ctx) {
                    return true;
                }
                *on_right = true;
                if right.next(ctx) {
                    return true;
                }
                *on_right = false;
                false
            }
        }
    }

    /// Abandon the remaining solutions of this pattern.
    pub fn discard(&mut self, ctx: &mut RunCtx) {
        match self {
            PatternNode::False => {}
            PatternNode::Basic(basic) => {
                let sub = basic.sub.expect("initialized basic pattern");
                if ctx.solver.is_active(sub) {
                    ctx.solver.discard(sub);
                }
            }
            PatternNode::Filter(f) => f.child.discard(ctx),
            PatternNode::Join(l, r) | PatternNode::Diff(l, r) => {
                r.discard(ctx);
                l.discard(ctx);
            }
            PatternNode::LeftJoin {
                left,
                right,
                consistent,
            } => {
                right.discard(ctx);
                left.discard(ctx);
                *consistent = false;
            }
            PatternNode::Union {
                left,
                right,
                on_right,
            } => {
                if *on_right {
                    right.discard(ctx);
                } else {
                    left.discard(ctx);
                }
                *on_right = false;
            }
        }
    }
}
