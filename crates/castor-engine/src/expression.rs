//! SPARQL expression evaluation and constraint posting.
//!
//! `evaluate` follows SPARQL 1.0 §11.4 on the current variable
//! assignment; `post` compiles an expression into catalog constraints,
//! reifying subexpressions into ternary truth variables. Equality and
//! order comparisons against constants are translated into id-interval
//! constraints through the store's equivalence classes, so propagation
//! stays tight without enumerating the value domain.

use std::cmp::Ordering;
use std::rc::Rc;

use castor_common::term::XSD_STRING;
use castor_common::{Category, Str, TriState, Value, ValueId, XsdDecimal};
use castor_core::{Store, SubtreeId, VarId};

use crate::binding::VarIdx;
use crate::constraints::{
    AndConstraint, ConstGEConstraint, ConstLEConstraint, ConstantConstraint, FalseConstraint,
    FilterConstraint, InRangeConstraint, InRangesConstraint, NotConstraint, NotConstantConstraint,
    NotInRangeConstraint, OrConstraint, PostCtx, RangeCompatConstraint, SameClassConstraint,
    VarDiffConstraint, VarDiffTermConstraint, VarEqConstraint, VarLessConstraint,
    VarSameTermConstraint,
};

/// A SPARQL expression over query variables.
#[derive(Debug)]
pub enum Expression {
    /// A constant, resolved against the store and interpreted.
    Value(Value),
    /// A variable reference.
    Variable(VarIdx),
    /// `BOUND(?x)`.
    Bound(VarIdx),
    Not(Rc<Expression>),
    UnaryPlus(Rc<Expression>),
    UnaryMinus(Rc<Expression>),
    IsIri(Rc<Expression>),
    IsBlank(Rc<Expression>),
    IsLiteral(Rc<Expression>),
    Str(Rc<Expression>),
    Lang(Rc<Expression>),
    Datatype(Rc<Expression>),
    Or(Rc<Expression>, Rc<Expression>),
    And(Rc<Expression>, Rc<Expression>),
    Eq(Rc<Expression>, Rc<Expression>),
    Neq(Rc<Expression>, Rc<Expression>),
    Lt(Rc<Expression>, Rc<Expression>),
    Gt(Rc<Expression>, Rc<Expression>),
    Le(Rc<Expression>, Rc<Expression>),
    Ge(Rc<Expression>, Rc<Expression>),
    Add(Rc<Expression>, Rc<Expression>),
    Sub(Rc<Expression>, Rc<Expression>),
    Mul(Rc<Expression>, Rc<Expression>),
    Div(Rc<Expression>, Rc<Expression>),
    SameTerm(Rc<Expression>, Rc<Expression>),
    LangMatches(Rc<Expression>, Rc<Expression>),
    Regex {
        text: Rc<Expression>,
        pattern: Rc<Expression>,
        flags: Option<Rc<Expression>>,
    },
}

impl Expression {
    /// The variables occurring in this expression, sorted and deduped.
    pub fn variables(&self) -> Vec<VarIdx> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_variables(&self, out: &mut Vec<VarIdx>) {
        match self {
            Expression::Value(_) => {}
            Expression::Variable(i) | Expression::Bound(i) => out.push(*i),
            Expression::Not(a)
            | Expression::UnaryPlus(a)
            | Expression::UnaryMinus(a)
            | Expression::IsIri(a)
            | Expression::IsBlank(a)
            | Expression::IsLiteral(a)
            | Expression::Str(a)
            | Expression::Lang(a)
            | Expression::Datatype(a) => a.collect_variables(out),
            Expression::Or(a, b)
            | Expression::And(a, b)
            | Expression::Eq(a, b)
            | Expression::Neq(a, b)
            | Expression::Lt(a, b)
            | Expression::Gt(a, b)
            | Expression::Le(a, b)
            | Expression::Ge(a, b)
            | Expression::Add(a, b)
            | Expression::Sub(a, b)
            | Expression::Mul(a, b)
            | Expression::Div(a, b)
            | Expression::SameTerm(a, b)
            | Expression::LangMatches(a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Expression::Regex {
                text,
                pattern,
                flags,
            } => {
                text.collect_variables(out);
                pattern.collect_variables(out);
                if let Some(f) = flags {
                    f.collect_variables(out);
                }
            }
        }
    }

    /// Whether the expression references no variable.
    pub fn is_constant(&self) -> bool {
        self.variables().is_empty()
    }

    /// The variable index if this is a plain variable reference.
    pub fn as_variable(&self) -> Option<VarIdx> {
        match self {
            Expression::Variable(i) => Some(*i),
            _ => None,
        }
    }

    /// Evaluate on the given binding row. Returns `false` on type error.
    pub fn evaluate(&self, store: &Store, bindings: &[ValueId], result: &mut Value) -> bool {
        match self {
            Expression::Value(v) => {
                *result = v.clone();
                true
            }
            Expression::Variable(i) => {
                let id = bindings[*i];
                if id == 0 {
                    return false;
                }
                *result = store.lookup_value(id);
                true
            }
            Expression::Bound(i) => {
                result.fill_boolean(bindings[*i] != 0);
                true
            }
            Expression::Not(a) => match a.evaluate_ebv(store, bindings) {
                TriState::Error => false,
                ebv => {
                    result.fill_boolean(ebv == TriState::False);
                    true
                }
            },
            Expression::UnaryPlus(a) => a.evaluate(store, bindings, result) && result.is_numeric(),
            Expression::UnaryMinus(a) => {
                if !a.evaluate(store, bindings, result) {
                    return false;
                }
                store.ensure_interpreted(result);
                if result.is_integer() {
                    let v = result.integer();
                    result.fill_integer(-v);
                } else if result.is_decimal() {
                    let v = result.decimal().negate();
                    result.fill_decimal(v);
                } else if result.is_floating() {
                    let v = result.floating();
                    result.fill_floating(-v);
                } else {
                    return false;
                }
                true
            }
            Expression::IsIri(a) => {
                if !a.evaluate(store, bindings, result) {
                    return false;
                }
                let v = result.is_uri();
                result.fill_boolean(v);
                true
            }
            Expression::IsBlank(a) => {
                if !a.evaluate(store, bindings, result) {
                    return false;
                }
                let v = result.is_blank();
                result.fill_boolean(v);
                true
            }
            Expression::IsLiteral(a) => {
                if !a.evaluate(store, bindings, result) {
                    return false;
                }
                let v = result.is_literal();
                result.fill_boolean(v);
                true
            }
            Expression::Str(a) => {
                if !a.evaluate(store, bindings, result) || result.is_blank() {
                    return false;
                }
                store.ensure_direct(&mut result.lexical);
                result.ensure_lexical();
                let lex = std::mem::take(&mut result.lexical);
                result.fill_simple_literal(lex);
                true
            }
            Expression::Lang(a) => {
                if !a.evaluate(store, bindings, result) || !result.is_plain() {
                    return false;
                }
                if result.is_simple() {
                    result.fill_simple_literal(Str::direct(""));
                } else {
                    store.ensure_direct(&mut result.tag);
                    let tag = std::mem::take(&mut result.tag);
                    result.fill_simple_literal(tag);
                }
                true
            }
            Expression::Datatype(a) => {
                if !a.evaluate(store, bindings, result)
                    || !result.is_literal()
                    || result.is_plain_lang()
                {
                    return false;
                }
                if result.is_simple() {
                    result.fill_uri(Str::direct(XSD_STRING));
                } else {
                    if result.tag.is_null() && castor_common::valid_id(result.datatype_id) {
                        let dt = store.lookup_value(result.datatype_id);
                        result.tag = dt.lexical;
                    }
                    store.ensure_direct(&mut result.tag);
                    let tag = std::mem::take(&mut result.tag);
                    result.fill_uri(tag);
                }
                true
            }
            Expression::Or(a, b) => {
                let left = a.evaluate_ebv(store, bindings);
                let right = b.evaluate_ebv(store, bindings);
                if left == TriState::True || right == TriState::True {
                    result.fill_boolean(true);
                } else if left == TriState::False && right == TriState::False {
                    result.fill_boolean(false);
                } else {
                    return false;
                }
                true
            }
            Expression::And(a, b) => {
                let left = a.evaluate_ebv(store, bindings);
                let right = b.evaluate_ebv(store, bindings);
                if left == TriState::False || right == TriState::False {
                    result.fill_boolean(false);
                } else if left == TriState::True && right == TriState::True {
                    result.fill_boolean(true);
                } else {
                    return false;
                }
                true
            }
            Expression::Eq(a, b) => self.evaluate_equality(store, bindings, a, b, false, result),
            Expression::Neq(a, b) => self.evaluate_equality(store, bindings, a, b, true, result),
            Expression::Lt(a, b) => {
                self.evaluate_order(store, bindings, a, b, result, |o| o == Ordering::Less)
            }
            Expression::Gt(a, b) => {
                self.evaluate_order(store, bindings, a, b, result, |o| o == Ordering::Greater)
            }
            Expression::Le(a, b) => {
                self.evaluate_order(store, bindings, a, b, result, |o| o != Ordering::Greater)
            }
            Expression::Ge(a, b) => {
                self.evaluate_order(store, bindings, a, b, result, |o| o != Ordering::Less)
            }
            Expression::Add(a, b) => self.evaluate_arith(store, bindings, a, b, result, ArithOp::Add),
            Expression::Sub(a, b) => self.evaluate_arith(store, bindings, a, b, result, ArithOp::Sub),
            Expression::Mul(a, b) => self.evaluate_arith(store, bindings, a, b, result, ArithOp::Mul),
            Expression::Div(a, b) => self.evaluate_arith(store, bindings, a, b, result, ArithOp::Div),
            Expression::SameTerm(a, b) => {
                let mut right = Value::unknown();
                if !a.evaluate(store, bindings, result) || !b.evaluate(store, bindings, &mut right)
                {
                    return false;
                }
                store.ensure_direct_strings(result);
                store.ensure_direct_strings(&mut right);
                result.ensure_lexical();
                right.ensure_lexical();
                let same = result.same_term(&right);
                result.fill_boolean(same);
                true
            }
            Expression::LangMatches(a, b) => {
                let mut range = Value::unknown();
                if !a.evaluate(store, bindings, result)
                    || !result.is_simple()
                    || !b.evaluate(store, bindings, &mut range)
                    || !range.is_simple()
                {
                    return false;
                }
                store.ensure_direct(&mut result.lexical);
                store.ensure_direct(&mut range.lexical);
                let tag = result.lexical.text();
                let pattern = range.lexical.text();
                let matched = if pattern == "*" {
                    !tag.is_empty()
                } else {
                    // RFC 4647 basic filtering
                    tag.len() >= pattern.len()
                        && tag[..pattern.len()].eq_ignore_ascii_case(pattern)
                        && (tag.len() == pattern.len()
                            || tag.as_bytes()[pattern.len()] == b'-')
                };
                result.fill_boolean(matched);
                true
            }
            Expression::Regex {
                text,
                pattern,
                flags,
            } => {
                let mut pat = Value::unknown();
                let mut builder_flags = String::new();
                if let Some(f) = flags {
                    let mut fval = Value::unknown();
                    if !f.evaluate(store, bindings, &mut fval) || !fval.is_simple() {
                        return false;
                    }
                    store.ensure_direct(&mut fval.lexical);
                    for c in fval.lexical.text().chars() {
                        match c {
                            'i' | 's' | 'm' | 'x' => builder_flags.push(c),
                            _ => return false,
                        }
                    }
                }
                if !text.evaluate(store, bindings, result)
                    || !result.is_simple()
                    || !pattern.evaluate(store, bindings, &mut pat)
                    || !pat.is_simple()
                {
                    return false;
                }
                store.ensure_direct(&mut result.lexical);
                store.ensure_direct(&mut pat.lexical);
                let source = if builder_flags.is_empty() {
                    pat.lexical.text().to_string()
                } else {
                    format!("(?{}){}", builder_flags, pat.lexical.text())
                };
                match regex::Regex::new(&source) {
                    Ok(re) => {
                        let matched = re.is_match(result.lexical.text());
                        result.fill_boolean(matched);
                        true
                    }
                    Err(_) => false,
                }
            }
        }
    }

    fn evaluate_equality(
        &self,
        store: &Store,
        bindings: &[ValueId],
        a: &Rc<Expression>,
        b: &Rc<Expression>,
        negate: bool,
        result: &mut Value,
    ) -> bool {
        let mut right = Value::unknown();
        if !a.evaluate(store, bindings, result) || !b.evaluate(store, bindings, &mut right) {
            return false;
        }
        store.ensure_interpreted(result);
        store.ensure_interpreted(&mut right);
        store.ensure_direct_strings(result);
        store.ensure_direct_strings(&mut right);
        match result.equals(&right) {
            TriState::Error => false,
            truth => {
                result.fill_boolean((truth == TriState::True) != negate);
                true
            }
        }
    }

    fn evaluate_order(
        &self,
        store: &Store,
        bindings: &[ValueId],
        a: &Rc<Expression>,
        b: &Rc<Expression>,
        result: &mut Value,
        accept: impl Fn(Ordering) -> bool,
    ) -> bool {
        let mut right = Value::unknown();
        if !a.evaluate(store, bindings, result) || !b.evaluate(store, bindings, &mut right) {
            return false;
        }
        store.ensure_interpreted(result);
        store.ensure_interpreted(&mut right);
        store.ensure_direct_strings(result);
        store.ensure_direct_strings(&mut right);
        match result.xpath_compare(&right) {
            None => false,
            Some(ord) => {
                result.fill_boolean(accept(ord));
                true
            }
        }
    }

    fn evaluate_arith(
        &self,
        store: &Store,
        bindings: &[ValueId],
        a: &Rc<Expression>,
        b: &Rc<Expression>,
        result: &mut Value,
        op: ArithOp,
    ) -> bool {
        let mut right = Value::unknown();
        if !a.evaluate(store, bindings, result)
            || !result.is_numeric()
            || !b.evaluate(store, bindings, &mut right)
            || !right.is_numeric()
        {
            return false;
        }
        store.ensure_interpreted(result);
        store.ensure_interpreted(&mut right);
        if op == ArithOp::Div && result.is_integer() && right.is_integer() {
            // integer division yields a decimal
            let d1 = XsdDecimal::from_i64(result.integer());
            let d2 = XsdDecimal::from_i64(right.integer());
            return match d1.div(&d2) {
                Some(q) => {
                    result.fill_decimal(q);
                    true
                }
                None => false,
            };
        }
        Value::promote_numeric(result, &mut right);
        if right.is_integer() {
            let (l, r) = (result.integer(), right.integer());
            let v = match op {
                ArithOp::Add => l.wrapping_add(r),
                ArithOp::Sub => l.wrapping_sub(r),
                ArithOp::Mul => l.wrapping_mul(r),
                ArithOp::Div => unreachable!("integer division handled above"),
            };
            result.fill_integer(v);
        } else if right.is_decimal() {
            let (l, r) = (result.decimal().clone(), right.decimal().clone());
            let v = match op {
                ArithOp::Add => l.add(&r),
                ArithOp::Sub => l.sub(&r),
                ArithOp::Mul => l.mul(&r),
                ArithOp::Div => match l.div(&r) {
                    Some(q) => q,
                    None => return false,
                },
            };
            result.fill_decimal(v);
        } else {
            let (l, r) = (result.floating(), right.floating());
            let v = match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div => l / r,
            };
            result.fill_floating(v);
        }
        true
    }

    /// Effective boolean value of the expression.
    pub fn evaluate_ebv(&self, store: &Store, bindings: &[ValueId]) -> TriState {
        let mut buffer = Value::unknown();
        if !self.evaluate(store, bindings, &mut buffer) {
            return TriState::Error;
        }
        store.ensure_interpreted(&mut buffer);
        if buffer.is_plain() || buffer.is_xsd_string() {
            store.ensure_direct(&mut buffer.lexical);
        }
        buffer.ebv()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

////////////////////////////////////////////////////////////////////////
// Constraint posting

/// Compile `expr` into constraints on `sub`.
///
/// `b` is the reification target; `None` means the expression is a hard
/// filter that must evaluate to true.
pub fn post(expr: &Rc<Expression>, ctx: &mut PostCtx<'_>, sub: SubtreeId, b: Option<VarId>) {
    match &**expr {
        Expression::And(a1, a2) => match b {
            None => {
                post(a1, ctx, sub, None);
                post(a2, ctx, sub, None);
            }
            Some(bb) => {
                let b1 = ctx.new_truth_var(sub);
                let b2 = ctx.new_truth_var(sub);
                post(a1, ctx, sub, Some(b1));
                post(a2, ctx, sub, Some(b2));
                ctx.solver
                    .add_scoped(sub, Box::new(AndConstraint::new(b1, b2, bb)));
            }
        },
        Expression::Or(a1, a2) => {
            let b1 = ctx.new_truth_var(sub);
            let b2 = ctx.new_truth_var(sub);
            post(a1, ctx, sub, Some(b1));
            post(a2, ctx, sub, Some(b2));
            let bb = ctx.truth_or_true(sub, b);
            ctx.solver
                .add_scoped(sub, Box::new(OrConstraint::new(b1, b2, bb)));
        }
        Expression::Not(a) => {
            if b.is_none() {
                // specialized negations on the hard path
                if let Expression::SameTerm(l, r) = &**a {
                    if let (Some(v1), Some(v2)) = (l.as_variable(), r.as_variable()) {
                        let (x1, x2) = (ctx.vars[v1].cp(), ctx.vars[v2].cp());
                        ctx.solver
                            .add_scoped(sub, Box::new(VarDiffTermConstraint::new(x1, x2)));
                        return;
                    }
                }
                if let Expression::Eq(l, r) = &**a {
                    if let (Some(v1), Some(v2)) = (l.as_variable(), r.as_variable()) {
                        let (x1, x2) = (ctx.vars[v1].cp(), ctx.vars[v2].cp());
                        let store = ctx.store.clone();
                        ctx.solver
                            .add_scoped(sub, Box::new(VarDiffConstraint::new(store, x1, x2)));
                        return;
                    }
                }
                let inner = ctx.new_truth_var(sub);
                post(a, ctx, sub, Some(inner));
                ctx.solver.add_scoped(
                    sub,
                    Box::new(ConstantConstraint::new(inner, TriState::False)),
                );
            } else {
                let inner = ctx.new_truth_var(sub);
                post(a, ctx, sub, Some(inner));
                let bb = b.expect("reification target");
                ctx.solver
                    .add_scoped(sub, Box::new(NotConstraint::new(inner, bb)));
            }
        }
        Expression::Eq(a1, a2) => {
            if !post_equality(expr, ctx, sub, a1, a2, b) {
                post_fallback(expr, ctx, sub, b);
            }
        }
        Expression::Neq(a1, a2) => {
            if let (Some(v1), Some(v2)) = (a1.as_variable(), a2.as_variable()) {
                if b.is_none() {
                    let (x1, x2) = (ctx.vars[v1].cp(), ctx.vars[v2].cp());
                    let store = ctx.store.clone();
                    ctx.solver
                        .add_scoped(sub, Box::new(VarDiffConstraint::new(store, x1, x2)));
                    return;
                }
            }
            if b.is_none() {
                if post_hard_inequality(ctx, sub, a1, a2) {
                    return;
                }
            }
            let b2 = ctx.new_truth_var(sub);
            if post_equality(expr, ctx, sub, a1, a2, Some(b2)) {
                let bb = ctx.truth_or_true(sub, b);
                ctx.solver
                    .add_scoped(sub, Box::new(NotConstraint::new(b2, bb)));
            } else {
                post_fallback(expr, ctx, sub, b);
            }
        }
        Expression::Lt(a1, a2) => post_order(expr, ctx, sub, a1, a2, b, false),
        Expression::Gt(a1, a2) => post_order(expr, ctx, sub, a2, a1, b, false),
        Expression::Le(a1, a2) => post_order(expr, ctx, sub, a1, a2, b, true),
        Expression::Ge(a1, a2) => post_order(expr, ctx, sub, a2, a1, b, true),
        Expression::SameTerm(a1, a2) => {
            if !post_same_term(ctx, sub, a1, a2, b) {
                post_fallback(expr, ctx, sub, b);
            }
        }
        _ => post_fallback(expr, ctx, sub, b),
    }
}

/// Post the generic filter constraint.
fn post_fallback(expr: &Rc<Expression>, ctx: &mut PostCtx<'_>, sub: SubtreeId, b: Option<VarId>) {
    let vars: Vec<(VarIdx, VarId)> = expr
        .variables()
        .into_iter()
        .map(|i| (i, ctx.vars[i].cp()))
        .collect();
    let constraint = FilterConstraint::new(
        ctx.store.clone(),
        expr.clone(),
        vars,
        b,
        ctx.vars.len(),
    );
    ctx.solver.add_scoped(sub, Box::new(constraint));
}

/// Evaluate a constant operand, resolving it against the store.
fn const_operand(ctx: &PostCtx<'_>, e: &Rc<Expression>) -> Option<Value> {
    if !e.is_constant() {
        return None;
    }
    let mut val = Value::unknown();
    if !e.evaluate(ctx.store, &[], &mut val) {
        return None;
    }
    ctx.store.resolve(&mut val);
    ctx.store.ensure_interpreted(&mut val);
    ctx.store.ensure_direct_strings(&mut val);
    Some(val)
}

/// Post the reified equality of two operands. Returns `false` when no
/// specialization applies.
fn post_equality(
    _expr: &Rc<Expression>,
    ctx: &mut PostCtx<'_>,
    sub: SubtreeId,
    a1: &Rc<Expression>,
    a2: &Rc<Expression>,
    b: Option<VarId>,
) -> bool {
    match (a1.as_variable(), a2.as_variable()) {
        (Some(v1), Some(v2)) => {
            let (x1, x2) = (ctx.vars[v1].cp(), ctx.vars[v2].cp());
            let store = ctx.store.clone();
            if b.is_none() {
                ctx.solver.add_scoped(
                    sub,
                    Box::new(SameClassConstraint::new(store.clone(), x1, x2)),
                );
            }
            let bb = ctx.truth_or_true(sub, b);
            ctx.solver
                .add_scoped(sub, Box::new(VarEqConstraint::new(store, x1, x2, bb)));
            true
        }
        (Some(v), None) if a2.is_constant() => post_eq_const(ctx, sub, v, a2, b),
        (None, Some(v)) if a1.is_constant() => post_eq_const(ctx, sub, v, a1, b),
        _ => false,
    }
}

fn post_eq_const(
    ctx: &mut PostCtx<'_>,
    sub: SubtreeId,
    v: VarIdx,
    constant: &Rc<Expression>,
    b: Option<VarId>,
) -> bool {
    let x = ctx.vars[v].cp();
    let Some(val) = const_operand(ctx, constant) else {
        // evaluation error: the comparison always errors out
        let bb = ctx.truth_or_true(sub, b);
        ctx.solver.add_scoped(
            sub,
            Box::new(ConstantConstraint::new(bb, TriState::Error)),
        );
        return true;
    };
    let class = ctx.store.eq_class_of(&val);
    let bb = ctx.truth_or_true(sub, b);
    if class.is_empty() {
        let cat = val.category.unwrap_or(Category::Other);
        if cat <= Category::Uri {
            ctx.solver.add_scoped(
                sub,
                Box::new(ConstantConstraint::new(bb, TriState::False)),
            );
        } else if cat > Category::DateTime {
            ctx.solver.add_scoped(
                sub,
                Box::new(ConstantConstraint::new(bb, TriState::Error)),
            );
        } else {
            ctx.solver.add_scoped(
                sub,
                Box::new(NotConstantConstraint::new(bb, TriState::True)),
            );
            let range = ctx.store.range(cat);
            ctx.solver
                .add_scoped(sub, Box::new(RangeCompatConstraint::new(x, range, bb)));
        }
    } else {
        let x2 = ctx.fixed_value_var(sub, class.from);
        let store = ctx.store.clone();
        ctx.solver
            .add_scoped(sub, Box::new(VarEqConstraint::new(store, x, x2, bb)));
    }
    true
}

/// Hard `!=` against a constant: remove the class and keep the variable
/// in a category where the comparison cannot error out.
fn post_hard_inequality(
    ctx: &mut PostCtx<'_>,
    sub: SubtreeId,
    a1: &Rc<Expression>,
    a2: &Rc<Expression>,
) -> bool {
    let (v, constant) = match (a1.as_variable(), a2.as_variable()) {
        (Some(v), None) if a2.is_constant() => (v, a2),
        (None, Some(v)) if a1.is_constant() => (v, a1),
        _ => return false,
    };
    let x = ctx.vars[v].cp();
    let Some(val) = const_operand(ctx, constant) else {
        ctx.solver.add_scoped(sub, Box::new(FalseConstraint));
        return true;
    };
    let class = ctx.store.eq_class_of(&val);
    if !class.is_empty() {
        ctx.solver
            .add_scoped(sub, Box::new(NotInRangeConstraint::new(x, class)));
    }
    let cat = val.category.unwrap_or(Category::Other);
    let non_literal = ctx.store.range_between(Category::Blank, Category::Uri);
    if cat > Category::Uri {
        if cat <= Category::DateTime {
            let ranges = vec![non_literal, ctx.store.range(cat)];
            ctx.solver
                .add_scoped(sub, Box::new(InRangesConstraint::new(x, ranges)));
        } else {
            ctx.solver
                .add_scoped(sub, Box::new(InRangeConstraint::new(x, non_literal)));
        }
    }
    true
}

/// Post a reified order comparison `a1 <(=) a2 <=> b`.
fn post_order(
    expr: &Rc<Expression>,
    ctx: &mut PostCtx<'_>,
    sub: SubtreeId,
    a1: &Rc<Expression>,
    a2: &Rc<Expression>,
    b: Option<VarId>,
    equality: bool,
) {
    match (a1.as_variable(), a2.as_variable()) {
        (Some(v1), Some(v2)) => {
            let (x1, x2) = (ctx.vars[v1].cp(), ctx.vars[v2].cp());
            let bb = ctx.truth_or_true(sub, b);
            let store = ctx.store.clone();
            ctx.solver.add_scoped(
                sub,
                Box::new(VarLessConstraint::new(store, x1, x2, bb, equality)),
            );
        }
        (Some(v), None) if a2.is_constant() => {
            // x < c  (or x <= c)
            let x = ctx.vars[v].cp();
            match const_operand(ctx, a2) {
                None => post_order_error(ctx, sub, b),
                Some(val) => {
                    let class = ctx.store.eq_class_of(&val);
                    let cap = if equality { class.to } else { class.from - 1 };
                    let bb = ctx.truth_or_true(sub, b);
                    post_order_compat(ctx, sub, x, &val, bb);
                    ctx.solver
                        .add_scoped(sub, Box::new(ConstLEConstraint::new(x, cap, bb)));
                }
            }
        }
        (None, Some(v)) if a1.is_constant() => {
            // c < x  (or c <= x)
            let x = ctx.vars[v].cp();
            match const_operand(ctx, a1) {
                None => post_order_error(ctx, sub, b),
                Some(val) => {
                    let class = ctx.store.eq_class_of(&val);
                    let floor = if equality { class.from } else { class.to + 1 };
                    let bb = ctx.truth_or_true(sub, b);
                    post_order_compat(ctx, sub, x, &val, bb);
                    ctx.solver
                        .add_scoped(sub, Box::new(ConstGEConstraint::new(x, floor, bb)));
                }
            }
        }
        _ => post_fallback(expr, ctx, sub, b),
    }
}

fn post_order_error(ctx: &mut PostCtx<'_>, sub: SubtreeId, b: Option<VarId>) {
    let bb = ctx.truth_or_true(sub, b);
    ctx.solver.add_scoped(
        sub,
        Box::new(ConstantConstraint::new(bb, TriState::Error)),
    );
}

/// Order comparisons only make sense within the constant's category.
fn post_order_compat(ctx: &mut PostCtx<'_>, sub: SubtreeId, x: VarId, val: &Value, bb: VarId) {
    let range = match val.category {
        Some(cat) if val.is_comparable() => ctx.store.range(cat),
        _ => castor_common::ValueRange::new(1, 0),
    };
    ctx.solver
        .add_scoped(sub, Box::new(RangeCompatConstraint::new(x, range, bb)));
}

/// Post reified `sameTerm`. Returns `false` when no specialization
/// applies.
fn post_same_term(
    ctx: &mut PostCtx<'_>,
    sub: SubtreeId,
    a1: &Rc<Expression>,
    a2: &Rc<Expression>,
    b: Option<VarId>,
) -> bool {
    match (a1.as_variable(), a2.as_variable()) {
        (Some(v1), Some(v2)) => {
            let (x1, x2) = (ctx.vars[v1].cp(), ctx.vars[v2].cp());
            let bb = ctx.truth_or_true(sub, b);
            ctx.solver
                .add_scoped(sub, Box::new(VarSameTermConstraint::new(x1, x2, bb)));
            true
        }
        (Some(v), None) if a2.is_constant() => post_same_term_const(ctx, sub, v, a2, b),
        (None, Some(v)) if a1.is_constant() => post_same_term_const(ctx, sub, v, a1, b),
        _ => false,
    }
}

fn post_same_term_const(
    ctx: &mut PostCtx<'_>,
    sub: SubtreeId,
    v: VarIdx,
    constant: &Rc<Expression>,
    b: Option<VarId>,
) -> bool {
    let x = ctx.vars[v].cp();
    let bb = ctx.truth_or_true(sub, b);
    match const_operand(ctx, constant) {
        Some(val) if castor_common::valid_id(val.id) => {
            let x2 = ctx.fixed_value_var(sub, val.id);
            ctx.solver
                .add_scoped(sub, Box::new(VarSameTermConstraint::new(x, x2, bb)));
        }
        _ => {
            // a term absent from the store matches nothing in it
            ctx.solver.add_scoped(
                sub,
                Box::new(ConstantConstraint::new(bb, TriState::False)),
            );
        }
    }
    true
}
