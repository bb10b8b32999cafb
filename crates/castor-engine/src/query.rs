//! Query orchestrator: AST translation, solution streaming, and the
//! DISTINCT / ORDER BY / LIMIT / OFFSET machinery.

use std::rc::Rc;
use std::sync::Arc;

use castor_common::{Error, Result, Value, ValueId};
use castor_core::{ConstraintId, Solver, Store};
use indexmap::IndexMap;
use tracing::debug;

use crate::binding::{VarIdx, Variable};
use crate::constraints::bnborder::OrderKey;
use crate::constraints::{BnBOrderConstraint, DistinctConstraint};
use crate::expression::Expression;
use crate::pattern::{BasicPattern, FilterPattern, PatComp, PatternNode, TriplePat};
use crate::sparql::ast::{
    Builtin, ExprAst, GroupElement, GroupPattern, Projection, QueryAst, QueryForm, TermAst,
};

/// Execution state shared by the pattern tree: solver, store, variable
/// table, and the binding row of the current solution.
pub(crate) struct RunCtx {
    pub(crate) solver: Solver,
    pub(crate) store: Arc<Store>,
    pub(crate) vars: Vec<Variable>,
    pub(crate) bindings: Vec<ValueId>,
}

impl RunCtx {
    /// The value of a variable as seen by the CP solver: `0` while the
    /// unbound marker is still in the domain.
    pub(crate) fn value_from_cp(&self, i: VarIdx) -> ValueId {
        let cp = self.vars[i].cp();
        if self.solver.contains(cp, 0) {
            0
        } else if self.solver.is_bound(cp) {
            self.solver.value(cp)
        } else {
            0
        }
    }
}

/// One ORDER BY condition.
pub struct Order {
    expr: Rc<Expression>,
    descending: bool,
}

impl Order {
    /// The key expression.
    pub fn expression(&self) -> &Rc<Expression> {
        &self.expr
    }

    /// Whether the key sorts descending.
    pub fn is_descending(&self) -> bool {
        self.descending
    }
}

/// A prepared SPARQL query over a store.
pub struct Query {
    ctx: RunCtx,
    pattern: PatternNode,
    orders: Vec<Order>,
    requested: usize,
    distinct: bool,
    limit: Option<usize>,
    offset: usize,
    distinct_cstr: Option<ConstraintId>,
    bnb_cstr: Option<ConstraintId>,
    /// Sorted solution buffer, present iff the query has ORDER BY.
    solutions: Option<Vec<Rc<Vec<ValueId>>>>,
    cursor: usize,
    nsols: usize,
}

impl Query {
    /// Prepare a query against a store.
    pub fn new(store: &Arc<Store>, text: &str) -> Result<Query> {
        let ast = crate::sparql::parse(text)?;
        Self::from_ast(store.clone(), &ast)
    }

    fn from_ast(store: Arc<Store>, ast: &QueryAst) -> Result<Query> {
        let mut builder = Builder {
            store: store.clone(),
            solver: Solver::new(),
            names: IndexMap::new(),
            blanks: hashbrown::HashMap::new(),
            vars: Vec::new(),
        };

        // requested variables first, then the remaining named ones;
        // anonymous (blank-node) variables are appended by translation
        let requested_names: Vec<String> = match &ast.form {
            QueryForm::Select(Projection::Vars(v)) => v.clone(),
            QueryForm::Select(Projection::Star) => {
                let mut names = Vec::new();
                collect_group_names(&ast.pattern, &mut names);
                dedup_preserving_order(names)
            }
            QueryForm::Ask => Vec::new(),
        };
        for name in &requested_names {
            builder.named_var(name);
        }
        let requested = builder.vars.len();

        let mut rest = Vec::new();
        collect_group_names(&ast.pattern, &mut rest);
        for order in &ast.orders {
            collect_expr_names(&order.expr, &mut rest);
        }
        for name in dedup_preserving_order(rest) {
            builder.named_var(&name);
        }

        let orders: Vec<Order> = ast
            .orders
            .iter()
            .map(|o| {
                Ok(Order {
                    expr: builder.convert_expr(&o.expr)?,
                    descending: o.descending,
                })
            })
            .collect::<Result<_>>()?;

        let mut pattern = builder.translate_group(&ast.pattern)?.optimize();

        let n_vars = builder.vars.len();
        let mut ctx = RunCtx {
            solver: builder.solver,
            store,
            vars: builder.vars,
            bindings: vec![0; n_vars],
        };
        pattern.init(&mut ctx);

        let (limit, offset) = match &ast.form {
            QueryForm::Ask => (Some(1), 0),
            QueryForm::Select(_) => (ast.limit.map(|l| l as usize), ast.offset as usize),
        };
        let distinct = ast.distinct && requested > 0;

        let distinct_cstr = if distinct {
            let cps = (0..requested).map(|i| ctx.vars[i].cp()).collect();
            Some(ctx.solver.add_static(Box::new(DistinctConstraint::new(cps))))
        } else {
            None
        };

        let solutions = if orders.is_empty() { None } else { Some(Vec::new()) };
        let bnb_cstr = if !orders.is_empty() && limit.is_some() {
            let keys = orders
                .iter()
                .map(|o| OrderKey {
                    expr: o.expr.clone(),
                    descending: o.descending,
                    var: o.expr.as_variable().map(|i| (i, ctx.vars[i].cp())),
                    vars: o
                        .expr
                        .variables()
                        .into_iter()
                        .map(|i| (i, ctx.vars[i].cp()))
                        .collect(),
                })
                .collect();
            Some(ctx.solver.add_static(Box::new(BnBOrderConstraint::new(
                ctx.store.clone(),
                keys,
                n_vars,
            ))))
        } else {
            None
        };

        debug!(
            variables = n_vars,
            requested, distinct, "prepared query"
        );

        Ok(Query {
            ctx,
            pattern,
            orders,
            requested,
            distinct,
            limit,
            offset,
            distinct_cstr,
            bnb_cstr,
            solutions,
            cursor: 0,
            nsols: 0,
        })
    }

    /// Advance to the next solution. After `true`, the bindings are
    /// readable through [`Query::value_id`] / [`Query::value`].
    pub fn next(&mut self) -> bool {
        if self.solutions.is_none() {
            // streaming
            if let Some(limit) = self.limit {
                if self.nsols >= limit {
                    return false;
                }
            }
            if self.nsols == 0 {
                for _ in 0..self.offset {
                    if !self.next_pattern_solution() {
                        return false;
                    }
                }
            }
            if !self.next_pattern_solution() {
                return false;
            }
            self.nsols += 1;
            return true;
        }

        // buffered: exhaust the pattern on the first call
        if self.nsols == 0 && self.cursor == 0 {
            while self.next_pattern_solution() {
                let sol = Rc::new(self.ctx.bindings.clone());
                let sols = self.solutions.as_mut().expect("buffered mode");
                let pos = sols.partition_point(|s| {
                    solution_less(&self.ctx.store, &self.orders, s, &sol)
                });
                sols.insert(pos, sol);
                if let Some(limit) = self.limit {
                    let keep = limit + self.offset;
                    if sols.len() > keep {
                        sols.pop();
                    }
                    if keep > 0 && sols.len() == keep {
                        let worst = self.solutions.as_ref().expect("buffered mode")
                            [keep - 1]
                            .clone();
                        if let Some(c) = self.bnb_cstr {
                            self.ctx
                                .solver
                                .with_constraint::<BnBOrderConstraint, _>(c, |b| {
                                    b.update_bound(&worst);
                                });
                            self.ctx.solver.refresh(c);
                        }
                    }
                }
            }
            self.cursor = self.offset;
        }
        let sols = self.solutions.as_ref().expect("buffered mode");
        if self.cursor >= sols.len() {
            return false;
        }
        let sol = sols[self.cursor].clone();
        self.cursor += 1;
        self.nsols += 1;
        self.ctx.bindings.copy_from_slice(&sol);
        true
    }

    fn next_pattern_solution(&mut self) -> bool {
        if !self.pattern.next(&mut self.ctx) {
            return false;
        }
        for i in 0..self.ctx.vars.len() {
            let v = self.ctx.value_from_cp(i);
            self.ctx.bindings[i] = v;
        }
        if let Some(c) = self.distinct_cstr {
            let tuple: Vec<ValueId> = self.ctx.bindings[..self.requested].to_vec();
            self.ctx
                .solver
                .with_constraint::<DistinctConstraint, _>(c, |d| d.add_solution(&tuple));
            self.ctx.solver.refresh(c);
        }
        true
    }

    /// Restart the query from scratch.
    pub fn reset(&mut self) {
        self.pattern.discard(&mut self.ctx);
        self.nsols = 0;
        self.cursor = 0;
        if let Some(c) = self.distinct_cstr {
            self.ctx
                .solver
                .with_constraint::<DistinctConstraint, _>(c, DistinctConstraint::reset);
            self.ctx.solver.refresh(c);
        }
        if let Some(c) = self.bnb_cstr {
            self.ctx
                .solver
                .with_constraint::<BnBOrderConstraint, _>(c, BnBOrderConstraint::reset);
            self.ctx.solver.refresh(c);
        }
        if let Some(sols) = &mut self.solutions {
            sols.clear();
        }
    }

    /// Total number of solutions. Resets the query before and after.
    pub fn count(&mut self) -> usize {
        self.reset();
        let mut n = 0;
        while self.next() {
            n += 1;
        }
        self.reset();
        n
    }

    /// Number of variables, requested variables first.
    pub fn variables_count(&self) -> usize {
        self.ctx.vars.len()
    }

    /// Number of requested (projected) variables.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// A variable by index.
    pub fn variable(&self, i: VarIdx) -> &Variable {
        &self.ctx.vars[i]
    }

    /// Index of a variable by name.
    pub fn variable_named(&self, name: &str) -> Option<VarIdx> {
        self.ctx.vars.iter().position(|v| v.name() == name)
    }

    /// Value id bound to variable `i` in the current solution, `0` when
    /// unbound.
    pub fn value_id(&self, i: VarIdx) -> ValueId {
        self.ctx.bindings[i]
    }

    /// The value bound to variable `i`, with direct strings, or `None`
    /// when unbound.
    pub fn value(&self, i: VarIdx) -> Option<Value> {
        let id = self.ctx.bindings[i];
        if id == 0 {
            return None;
        }
        let mut v = self.ctx.store.lookup_value(id);
        self.ctx.store.ensure_direct_strings(&mut v);
        if v.is_typed() && v.tag.is_null() && castor_common::valid_id(v.datatype_id) {
            let dt = self.ctx.store.lookup_value(v.datatype_id);
            v.tag = dt.lexical;
            self.ctx.store.ensure_direct(&mut v.tag);
        }
        Some(v)
    }

    /// Whether the query is DISTINCT.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// The LIMIT, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// The OFFSET.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The ORDER BY conditions.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Solver statistics for this query.
    pub fn solver_stats(&self) -> castor_core::solver::SolverStats {
        self.ctx.solver.stats()
    }
}

/// Strict order between buffered solutions under the query's ORDER BY
/// conditions.
fn solution_less(store: &Arc<Store>, orders: &[Order], a: &[ValueId], b: &[ValueId]) -> bool {
    for order in orders {
        if let Some(i) = order.expr.as_variable() {
            if a[i] != b[i] {
                return if order.descending {
                    a[i] > b[i]
                } else {
                    a[i] < b[i]
                };
            }
        } else {
            let mut v1 = Value::unknown();
            let mut v2 = Value::unknown();
            if !order.expr.evaluate(store, a, &mut v1) {
                return false;
            }
            if !order.expr.evaluate(store, b, &mut v2) {
                return false;
            }
            for v in [&mut v1, &mut v2] {
                store.ensure_interpreted(v);
                store.ensure_direct_strings(v);
                v.ensure_lexical();
            }
            if !v1.same_term(&v2) {
                return if order.descending {
                    v2.total_lt(&v1)
                } else {
                    v1.total_lt(&v2)
                };
            }
        }
    }
    false
}

////////////////////////////////////////////////////////////////////////
// AST translation

struct Builder {
    store: Arc<Store>,
    solver: Solver,
    names: IndexMap<String, VarIdx>,
    blanks: hashbrown::HashMap<String, VarIdx>,
    vars: Vec<Variable>,
}

impl Builder {
    fn new_var(&mut self, name: &str) -> VarIdx {
        let cp = self.solver.new_var(0, self.store.values_count());
        self.vars.push(Variable::new(name, cp));
        self.vars.len() - 1
    }

    fn named_var(&mut self, name: &str) -> VarIdx {
        if let Some(&i) = self.names.get(name) {
            return i;
        }
        let i = self.new_var(name);
        self.names.insert(name.to_string(), i);
        i
    }

    fn blank_var(&mut self, label: &str) -> VarIdx {
        if let Some(&i) = self.blanks.get(label) {
            return i;
        }
        let i = self.new_var("");
        self.blanks.insert(label.to_string(), i);
        i
    }

    fn translate_group(&mut self, group: &GroupPattern) -> Result<PatternNode> {
        let mut pat: Option<PatternNode> = None;
        let mut condition: Option<Rc<Expression>> = None;
        for element in &group.elements {
            match element {
                GroupElement::Triples(triples) => {
                    let node = self.build_basic(triples);
                    pat = Some(join(pat, node));
                }
                GroupElement::Filter(expr) => {
                    let converted = self.convert_expr(expr)?;
                    condition = Some(match condition {
                        None => converted,
                        Some(c) => Rc::new(Expression::And(c, converted)),
                    });
                }
                GroupElement::Optional(sub) => {
                    let right = self.translate_group(sub)?;
                    let left = pat.take().unwrap_or_else(empty_basic);
                    if matches!(right, PatternNode::False) {
                        pat = Some(left);
                    } else {
                        pat = Some(PatternNode::LeftJoin {
                            left: Box::new(left),
                            right: Box::new(right),
                            consistent: false,
                        });
                    }
                }
                GroupElement::Union(branches) => {
                    let mut union: Option<PatternNode> = None;
                    for branch in branches {
                        let node = self.translate_group(branch)?;
                        if matches!(node, PatternNode::False) {
                            continue;
                        }
                        union = Some(match union {
                            None => node,
                            Some(prev) => PatternNode::Union {
                                left: Box::new(prev),
                                right: Box::new(node),
                                on_right: false,
                            },
                        });
                    }
                    pat = Some(join(pat, union.unwrap_or(PatternNode::False)));
                }
                GroupElement::Group(sub) => {
                    let node = self.translate_group(sub)?;
                    pat = Some(join(pat, node));
                }
            }
        }
        let body = pat.unwrap_or_else(empty_basic);
        Ok(match condition {
            None => body,
            Some(_) if matches!(body, PatternNode::False) => PatternNode::False,
            Some(c) => PatternNode::Filter(FilterPattern {
                child: Box::new(body),
                condition: c,
            }),
        })
    }

    fn build_basic(&mut self, triples: &[crate::sparql::ast::TriplePatternAst]) -> PatternNode {
        let mut resolved: Vec<TriplePat> = Vec::with_capacity(triples.len());
        for t in triples {
            let mut slots = [PatComp::Value(0); 3];
            for (slot, term) in slots
                .iter_mut()
                .zip([&t.subject, &t.predicate, &t.object])
            {
                match self.pattern_term(term) {
                    Some(comp) => *slot = comp,
                    // a constant absent from the store: no triple can
                    // ever match this pattern
                    None => return PatternNode::False,
                }
            }
            resolved.push(slots);
        }
        PatternNode::Basic(BasicPattern::new(resolved))
    }

    fn pattern_term(&mut self, term: &TermAst) -> Option<PatComp> {
        match term {
            TermAst::Var(name) => Some(PatComp::Var(self.named_var(name))),
            TermAst::Blank(label) => Some(PatComp::Var(self.blank_var(label))),
            _ => {
                let mut value = self.term_value(term);
                self.store.resolve(&mut value);
                if value.id == 0 {
                    None
                } else {
                    Some(PatComp::Value(value.id))
                }
            }
        }
    }

    fn term_value(&self, term: &TermAst) -> Value {
        match term {
            TermAst::Iri(iri) => Value::uri(iri.clone()),
            TermAst::Literal {
                lexical,
                lang: Some(lang),
                ..
            } => Value::plain_lang(lexical.clone(), lang.clone()),
            TermAst::Literal {
                lexical,
                datatype: Some(dt),
                ..
            } => Value::typed(lexical.clone(), dt.clone()),
            TermAst::Literal { lexical, .. } => Value::simple_literal(lexical.clone()),
            TermAst::Var(_) | TermAst::Blank(_) => Value::unknown(),
        }
    }

    fn convert_expr(&mut self, expr: &ExprAst) -> Result<Rc<Expression>> {
        let node = match expr {
            ExprAst::Term(TermAst::Var(name)) => Expression::Variable(self.named_var(name)),
            ExprAst::Term(TermAst::Blank(_)) => {
                return Err(Error::Unsupported(
                    "blank nodes in expressions".to_string(),
                ));
            }
            ExprAst::Term(term) => {
                let mut value = self.term_value(term);
                self.store.resolve(&mut value);
                self.store.ensure_interpreted(&mut value);
                self.store.ensure_direct_strings(&mut value);
                Expression::Value(value)
            }
            ExprAst::Or(a, b) => Expression::Or(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::And(a, b) => Expression::And(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Eq(a, b) => Expression::Eq(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Neq(a, b) => Expression::Neq(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Lt(a, b) => Expression::Lt(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Gt(a, b) => Expression::Gt(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Le(a, b) => Expression::Le(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Ge(a, b) => Expression::Ge(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Add(a, b) => Expression::Add(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Sub(a, b) => Expression::Sub(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Mul(a, b) => Expression::Mul(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Div(a, b) => Expression::Div(self.convert_expr(a)?, self.convert_expr(b)?),
            ExprAst::Not(a) => Expression::Not(self.convert_expr(a)?),
            ExprAst::UnaryPlus(a) => Expression::UnaryPlus(self.convert_expr(a)?),
            ExprAst::UnaryMinus(a) => Expression::UnaryMinus(self.convert_expr(a)?),
            ExprAst::Call(builtin, args) => return self.convert_call(*builtin, args),
        };
        Ok(Rc::new(node))
    }

    fn convert_call(&mut self, builtin: Builtin, args: &[ExprAst]) -> Result<Rc<Expression>> {
        let node = match builtin {
            Builtin::Bound => {
                let ExprAst::Term(TermAst::Var(name)) = &args[0] else {
                    return Err(Error::Unsupported("BOUND over a non-variable".into()));
                };
                Expression::Bound(self.named_var(name))
            }
            Builtin::IsIri => Expression::IsIri(self.convert_expr(&args[0])?),
            Builtin::IsBlank => Expression::IsBlank(self.convert_expr(&args[0])?),
            Builtin::IsLiteral => Expression::IsLiteral(self.convert_expr(&args[0])?),
            Builtin::Str => Expression::Str(self.convert_expr(&args[0])?),
            Builtin::Lang => Expression::Lang(self.convert_expr(&args[0])?),
            Builtin::Datatype => Expression::Datatype(self.convert_expr(&args[0])?),
            Builtin::SameTerm => {
                Expression::SameTerm(self.convert_expr(&args[0])?, self.convert_expr(&args[1])?)
            }
            Builtin::LangMatches => Expression::LangMatches(
                self.convert_expr(&args[0])?,
                self.convert_expr(&args[1])?,
            ),
            Builtin::Regex => Expression::Regex {
                text: self.convert_expr(&args[0])?,
                pattern: self.convert_expr(&args[1])?,
                flags: match args.get(2) {
                    Some(f) => Some(self.convert_expr(f)?),
                    None => None,
                },
            },
        };
        Ok(Rc::new(node))
    }
}

fn empty_basic() -> PatternNode {
    PatternNode::Basic(BasicPattern::new(Vec::new()))
}

fn join(pat: Option<PatternNode>, node: PatternNode) -> PatternNode {
    if matches!(node, PatternNode::False) {
        return PatternNode::False;
    }
    match pat {
        None => node,
        Some(PatternNode::False) => PatternNode::False,
        Some(prev) => PatternNode::Join(Box::new(prev), Box::new(node)),
    }
}

fn collect_group_names(group: &GroupPattern, out: &mut Vec<String>) {
    for element in &group.elements {
        match element {
            GroupElement::Triples(triples) => {
                for t in triples {
                    for term in [&t.subject, &t.predicate, &t.object] {
                        if let TermAst::Var(name) = term {
                            out.push(name.clone());
                        }
                    }
                }
            }
            GroupElement::Filter(expr) => collect_expr_names(expr, out),
            GroupElement::Optional(sub) | GroupElement::Group(sub) => {
                collect_group_names(sub, out);
            }
            GroupElement::Union(branches) => {
                for branch in branches {
                    collect_group_names(branch, out);
                }
            }
        }
    }
}

fn collect_expr_names(expr: &ExprAst, out: &mut Vec<String>) {
    match expr {
        ExprAst::Term(TermAst::Var(name)) => out.push(name.clone()),
        ExprAst::Term(_) => {}
        ExprAst::Or(a, b)
        | ExprAst::And(a, b)
        | ExprAst::Eq(a, b)
        | ExprAst::Neq(a, b)
        | ExprAst::Lt(a, b)
        | ExprAst::Gt(a, b)
        | ExprAst::Le(a, b)
        | ExprAst::Ge(a, b)
        | ExprAst::Add(a, b)
        | ExprAst::Sub(a, b)
        | ExprAst::Mul(a, b)
        | ExprAst::Div(a, b) => {
            collect_expr_names(a, out);
            collect_expr_names(b, out);
        }
        ExprAst::Not(a) | ExprAst::UnaryPlus(a) | ExprAst::UnaryMinus(a) => {
            collect_expr_names(a, out);
        }
        ExprAst::Call(_, args) => {
            for a in args {
                collect_expr_names(a, out);
            }
        }
    }
}

fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = hashbrown::HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}
