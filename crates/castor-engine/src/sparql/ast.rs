//! SPARQL abstract syntax tree.

/// A parsed query.
#[derive(Debug)]
pub struct QueryAst {
    /// Query form and projection.
    pub form: QueryForm,
    /// `DISTINCT` modifier.
    pub distinct: bool,
    /// The WHERE clause.
    pub pattern: GroupPattern,
    /// `ORDER BY` conditions, in order.
    pub orders: Vec<OrderCondition>,
    /// `LIMIT`, if present.
    pub limit: Option<u64>,
    /// `OFFSET`, default 0.
    pub offset: u64,
}

/// Query form.
#[derive(Debug)]
pub enum QueryForm {
    /// `SELECT` with a projection.
    Select(Projection),
    /// `ASK`.
    Ask,
}

/// SELECT projection.
#[derive(Debug)]
pub enum Projection {
    /// `SELECT *`
    Star,
    /// Explicit variable list.
    Vars(Vec<String>),
}

/// One `ORDER BY` condition.
#[derive(Debug)]
pub struct OrderCondition {
    pub expr: ExprAst,
    pub descending: bool,
}

/// A group graph pattern: `{ ... }`.
#[derive(Debug, Default)]
pub struct GroupPattern {
    pub elements: Vec<GroupElement>,
}

/// One element of a group graph pattern.
#[derive(Debug)]
pub enum GroupElement {
    /// A run of triple patterns (one basic graph pattern).
    Triples(Vec<TriplePatternAst>),
    /// `FILTER` constraint.
    Filter(ExprAst),
    /// `OPTIONAL { ... }`.
    Optional(GroupPattern),
    /// `{ A } UNION { B } UNION ...`.
    Union(Vec<GroupPattern>),
    /// A nested group.
    Group(GroupPattern),
}

/// A term position in a triple pattern.
#[derive(Debug, Clone)]
pub enum TermAst {
    Var(String),
    Iri(String),
    /// Literal with optional language tag or datatype IRI.
    Literal {
        lexical: String,
        lang: Option<String>,
        datatype: Option<String>,
    },
    /// Labeled or generated blank node.
    Blank(String),
}

/// A triple pattern.
#[derive(Debug, Clone)]
pub struct TriplePatternAst {
    pub subject: TermAst,
    pub predicate: TermAst,
    pub object: TermAst,
}

/// Built-in call in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Bound,
    IsIri,
    IsBlank,
    IsLiteral,
    Str,
    Lang,
    Datatype,
    SameTerm,
    LangMatches,
    Regex,
}

/// Expression AST.
#[derive(Debug)]
pub enum ExprAst {
    Term(TermAst),
    Or(Box<ExprAst>, Box<ExprAst>),
    And(Box<ExprAst>, Box<ExprAst>),
    Eq(Box<ExprAst>, Box<ExprAst>),
    Neq(Box<ExprAst>, Box<ExprAst>),
    Lt(Box<ExprAst>, Box<ExprAst>),
    Gt(Box<ExprAst>, Box<ExprAst>),
    Le(Box<ExprAst>, Box<ExprAst>),
    Ge(Box<ExprAst>, Box<ExprAst>),
    Add(Box<ExprAst>, Box<ExprAst>),
    Sub(Box<ExprAst>, Box<ExprAst>),
    Mul(Box<ExprAst>, Box<ExprAst>),
    Div(Box<ExprAst>, Box<ExprAst>),
    Not(Box<ExprAst>),
    UnaryPlus(Box<ExprAst>),
    UnaryMinus(Box<ExprAst>),
    Call(Builtin, Vec<ExprAst>),
}
