//! SPARQL parser.

use castor_common::{Error, Result};

use super::ast::*;
use super::lexer::{tokenize, Token, TokenKind};

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// SPARQL parser over a token stream.
pub struct Parser {
    tokens: Vec<Token>,
    at: usize,
    prefixes: hashbrown::HashMap<String, String>,
    base: Option<String>,
    anon_counter: u32,
}

impl Parser {
    /// Create a parser for the given input.
    pub fn new(input: &str) -> Self {
        Self {
            tokens: tokenize(input),
            at: 0,
            prefixes: hashbrown::HashMap::new(),
            base: None,
            anon_counter: 0,
        }
    }

    /// Parse the input into a query.
    pub fn parse(mut self) -> Result<QueryAst> {
        self.parse_prologue()?;
        let (form, distinct) = match self.current() {
            TokenKind::Keyword(k) if k == "SELECT" => {
                self.advance();
                let distinct = self.eat_keyword("DISTINCT");
                self.eat_keyword("REDUCED");
                let projection = if self.current() == &TokenKind::Star {
                    self.advance();
                    Projection::Star
                } else {
                    let mut vars = Vec::new();
                    while let TokenKind::Var(name) = self.current() {
                        vars.push(name.clone());
                        self.advance();
                    }
                    if vars.is_empty() {
                        return Err(self.error("expected projection variables or *"));
                    }
                    Projection::Vars(vars)
                };
                (QueryForm::Select(projection), distinct)
            }
            TokenKind::Keyword(k) if k == "ASK" => {
                self.advance();
                (QueryForm::Ask, false)
            }
            TokenKind::Keyword(k) if k == "CONSTRUCT" || k == "DESCRIBE" => {
                return Err(Error::Unsupported(format!("{k} queries")));
            }
            _ => return Err(self.error("expected SELECT or ASK")),
        };

        self.eat_keyword("WHERE");
        let pattern = self.parse_group()?;

        let mut orders = Vec::new();
        if self.eat_keyword("ORDER") {
            if !self.eat_keyword("BY") {
                return Err(self.error("expected BY after ORDER"));
            }
            loop {
                match self.current().clone() {
                    TokenKind::Keyword(k) if k == "ASC" || k == "DESC" => {
                        self.advance();
                        self.expect(TokenKind::LParen)?;
                        let expr = self.parse_expression()?;
                        self.expect(TokenKind::RParen)?;
                        orders.push(OrderCondition {
                            expr,
                            descending: k == "DESC",
                        });
                    }
                    TokenKind::Var(name) => {
                        self.advance();
                        orders.push(OrderCondition {
                            expr: ExprAst::Term(TermAst::Var(name)),
                            descending: false,
                        });
                    }
                    TokenKind::LParen => {
                        self.advance();
                        let expr = self.parse_expression()?;
                        self.expect(TokenKind::RParen)?;
                        orders.push(OrderCondition {
                            expr,
                            descending: false,
                        });
                    }
                    _ => break,
                }
            }
            if orders.is_empty() {
                return Err(self.error("expected ORDER BY condition"));
            }
        }

        let mut limit = None;
        let mut offset = 0;
        loop {
            if self.eat_keyword("LIMIT") {
                limit = Some(self.parse_unsigned()?);
            } else if self.eat_keyword("OFFSET") {
                offset = self.parse_unsigned()?;
            } else {
                break;
            }
        }

        if self.current() != &TokenKind::Eof {
            return Err(self.error("trailing input after query"));
        }

        Ok(QueryAst {
            form,
            distinct,
            pattern,
            orders,
            limit,
            offset,
        })
    }

    fn parse_prologue(&mut self) -> Result<()> {
        loop {
            if self.eat_keyword("PREFIX") {
                let TokenKind::PrefixedName(prefix, local) = self.current().clone() else {
                    return Err(self.error("expected prefix name"));
                };
                if !local.is_empty() {
                    return Err(self.error("expected ':' after prefix name"));
                }
                self.advance();
                let TokenKind::Iri(iri) = self.current().clone() else {
                    return Err(self.error("expected IRI in PREFIX declaration"));
                };
                self.advance();
                self.prefixes.insert(prefix, iri);
            } else if self.eat_keyword("BASE") {
                let TokenKind::Iri(iri) = self.current().clone() else {
                    return Err(self.error("expected IRI in BASE declaration"));
                };
                self.advance();
                self.base = Some(iri);
            } else {
                return Ok(());
            }
        }
    }

    fn parse_group(&mut self) -> Result<GroupPattern> {
        self.expect(TokenKind::LBrace)?;
        let mut group = GroupPattern::default();
        loop {
            match self.current().clone() {
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(group);
                }
                TokenKind::Dot => {
                    self.advance();
                }
                TokenKind::Keyword(k) if k == "FILTER" => {
                    self.advance();
                    let expr = self.parse_constraint()?;
                    group.elements.push(GroupElement::Filter(expr));
                }
                TokenKind::Keyword(k) if k == "OPTIONAL" => {
                    self.advance();
                    let sub = self.parse_group()?;
                    group.elements.push(GroupElement::Optional(sub));
                }
                TokenKind::LBrace => {
                    let first = self.parse_group()?;
                    let mut branches = vec![first];
                    while self.eat_keyword("UNION") {
                        branches.push(self.parse_group()?);
                    }
                    if branches.len() == 1 {
                        group
                            .elements
                            .push(GroupElement::Group(branches.pop().expect("one branch")));
                    } else {
                        group.elements.push(GroupElement::Union(branches));
                    }
                }
                TokenKind::Eof => return Err(self.error("unterminated group pattern")),
                _ => {
                    let triples = self.parse_triples_block()?;
                    group.elements.push(GroupElement::Triples(triples));
                }
            }
        }
    }

    fn parse_triples_block(&mut self) -> Result<Vec<TriplePatternAst>> {
        let mut triples = Vec::new();
        loop {
            self.parse_triples_same_subject(&mut triples)?;
            if self.current() == &TokenKind::Dot {
                self.advance();
                if self.starts_term() {
                    continue;
                }
            }
            return Ok(triples);
        }
    }

    fn starts_term(&self) -> bool {
        matches!(
            self.current(),
            TokenKind::Var(_)
                | TokenKind::Iri(_)
                | TokenKind::PrefixedName(_, _)
                | TokenKind::BlankNode(_)
                | TokenKind::Anon
                | TokenKind::StringLit(_)
                | TokenKind::Integer(_)
                | TokenKind::Decimal(_)
                | TokenKind::Double(_)
        )
    }

    fn parse_triples_same_subject(&mut self, out: &mut Vec<TriplePatternAst>) -> Result<()> {
        let subject = self.parse_term()?;
        loop {
            let predicate = if self.current() == &TokenKind::A {
                self.advance();
                TermAst::Iri(RDF_TYPE.to_string())
            } else {
                self.parse_term()?
            };
            loop {
                let object = self.parse_term()?;
                out.push(TriplePatternAst {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object,
                });
                if self.current() == &TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.current() == &TokenKind::Semicolon {
                self.advance();
                // a dangling semicolon before '.' or '}' is allowed
                if !self.starts_term() && self.current() != &TokenKind::A {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn parse_term(&mut self) -> Result<TermAst> {
        let term = match self.current().clone() {
            TokenKind::Var(name) => {
                self.advance();
                TermAst::Var(name)
            }
            TokenKind::Iri(iri) => {
                self.advance();
                TermAst::Iri(self.resolve_iri(&iri))
            }
            TokenKind::PrefixedName(prefix, local) => {
                self.advance();
                TermAst::Iri(self.expand_prefixed(&prefix, &local)?)
            }
            TokenKind::BlankNode(label) => {
                self.advance();
                TermAst::Blank(label)
            }
            TokenKind::Anon => {
                self.advance();
                self.anon_counter += 1;
                TermAst::Blank(format!("-anon-{}", self.anon_counter))
            }
            TokenKind::StringLit(lexical) => {
                self.advance();
                match self.current().clone() {
                    TokenKind::LangTag(tag) => {
                        self.advance();
                        TermAst::Literal {
                            lexical,
                            lang: Some(tag),
                            datatype: None,
                        }
                    }
                    TokenKind::DatatypeMark => {
                        self.advance();
                        let datatype = match self.current().clone() {
                            TokenKind::Iri(iri) => {
                                self.advance();
                                self.resolve_iri(&iri)
                            }
                            TokenKind::PrefixedName(prefix, local) => {
                                self.advance();
                                self.expand_prefixed(&prefix, &local)?
                            }
                            _ => return Err(self.error("expected datatype IRI after ^^")),
                        };
                        TermAst::Literal {
                            lexical,
                            lang: None,
                            datatype: Some(datatype),
                        }
                    }
                    _ => TermAst::Literal {
                        lexical,
                        lang: None,
                        datatype: None,
                    },
                }
            }
            TokenKind::Integer(text) => {
                self.advance();
                numeric_literal(text, "integer")
            }
            TokenKind::Decimal(text) => {
                self.advance();
                numeric_literal(text, "decimal")
            }
            TokenKind::Double(text) => {
                self.advance();
                numeric_literal(text, "double")
            }
            TokenKind::Minus | TokenKind::Plus => {
                let negative = self.current() == &TokenKind::Minus;
                self.advance();
                let sign = if negative { "-" } else { "" };
                match self.current().clone() {
                    TokenKind::Integer(text) => {
                        self.advance();
                        numeric_literal(format!("{sign}{text}"), "integer")
                    }
                    TokenKind::Decimal(text) => {
                        self.advance();
                        numeric_literal(format!("{sign}{text}"), "decimal")
                    }
                    TokenKind::Double(text) => {
                        self.advance();
                        numeric_literal(format!("{sign}{text}"), "double")
                    }
                    _ => return Err(self.error("expected a numeric literal after sign")),
                }
            }
            TokenKind::Keyword(k) if k == "TRUE" || k == "FALSE" => {
                self.advance();
                TermAst::Literal {
                    lexical: k.to_ascii_lowercase(),
                    lang: None,
                    datatype: Some(format!("{XSD}boolean")),
                }
            }
            _ => return Err(self.error("expected an RDF term")),
        };
        Ok(term)
    }

    fn resolve_iri(&self, iri: &str) -> String {
        match (&self.base, iri.contains(':')) {
            (Some(base), false) => format!("{base}{iri}"),
            _ => iri.to_string(),
        }
    }

    fn expand_prefixed(&self, prefix: &str, local: &str) -> Result<String> {
        match self.prefixes.get(prefix) {
            Some(ns) => Ok(format!("{ns}{local}")),
            None => Err(self.error(format!("undeclared prefix '{prefix}:'"))),
        }
    }

    fn parse_constraint(&mut self) -> Result<ExprAst> {
        if self.current() == &TokenKind::LParen {
            self.advance();
            let expr = self.parse_expression()?;
            self.expect(TokenKind::RParen)?;
            Ok(expr)
        } else {
            self.parse_builtin_call()
        }
    }

    ////////////////////////////////////////////////////////////////////
    // Expressions

    fn parse_expression(&mut self) -> Result<ExprAst> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_and()?;
        while self.current() == &TokenKind::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = ExprAst::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_relational()?;
        while self.current() == &TokenKind::AndAnd {
            self.advance();
            let right = self.parse_relational()?;
            left = ExprAst::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<ExprAst> {
        let left = self.parse_additive()?;
        let op = match self.current() {
            TokenKind::Eq => ExprAst::Eq as fn(_, _) -> _,
            TokenKind::Neq => ExprAst::Neq,
            TokenKind::Lt => ExprAst::Lt,
            TokenKind::Gt => ExprAst::Gt,
            TokenKind::Le => ExprAst::Le,
            TokenKind::Ge => ExprAst::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(op(Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                TokenKind::Plus => ExprAst::Add as fn(_, _) -> _,
                TokenKind::Minus => ExprAst::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = op(Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<ExprAst> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                TokenKind::Star => ExprAst::Mul as fn(_, _) -> _,
                TokenKind::Slash => ExprAst::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = op(Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<ExprAst> {
        match self.current() {
            TokenKind::Bang => {
                self.advance();
                Ok(ExprAst::Not(Box::new(self.parse_unary()?)))
            }
            TokenKind::Plus => {
                self.advance();
                Ok(ExprAst::UnaryPlus(Box::new(self.parse_unary()?)))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(ExprAst::UnaryMinus(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExprAst> {
        match self.current() {
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Keyword(k) if builtin_of(k).is_some() => self.parse_builtin_call(),
            _ => Ok(ExprAst::Term(self.parse_term()?)),
        }
    }

    fn parse_builtin_call(&mut self) -> Result<ExprAst> {
        let TokenKind::Keyword(k) = self.current().clone() else {
            return Err(self.error("expected a built-in call"));
        };
        let Some(builtin) = builtin_of(&k) else {
            return Err(self.error(format!("unknown function {k}")));
        };
        self.advance();
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.current() != &TokenKind::RParen {
            loop {
                args.push(self.parse_expression()?);
                if self.current() == &TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let arity_ok = match builtin {
            Builtin::Regex => args.len() == 2 || args.len() == 3,
            Builtin::SameTerm | Builtin::LangMatches => args.len() == 2,
            _ => args.len() == 1,
        };
        if !arity_ok {
            return Err(self.error(format!("wrong number of arguments for {k}")));
        }
        if builtin == Builtin::Bound && !matches!(args[0], ExprAst::Term(TermAst::Var(_))) {
            return Err(self.error("BOUND expects a variable"));
        }
        Ok(ExprAst::Call(builtin, args))
    }

    ////////////////////////////////////////////////////////////////////
    // Token plumbing

    fn current(&self) -> &TokenKind {
        &self.tokens[self.at].kind
    }

    fn advance(&mut self) {
        if self.at + 1 < self.tokens.len() {
            self.at += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.current() == &kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {kind:?}")))
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.current(), TokenKind::Keyword(k) if k == kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_unsigned(&mut self) -> Result<u64> {
        let TokenKind::Integer(text) = self.current().clone() else {
            return Err(self.error("expected an integer"));
        };
        self.advance();
        text.parse()
            .map_err(|_| self.error("integer out of range"))
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(message, self.tokens[self.at].pos)
    }
}

fn builtin_of(k: &str) -> Option<Builtin> {
    Some(match k {
        "BOUND" => Builtin::Bound,
        "ISIRI" | "ISURI" => Builtin::IsIri,
        "ISBLANK" => Builtin::IsBlank,
        "ISLITERAL" => Builtin::IsLiteral,
        "STR" => Builtin::Str,
        "LANG" => Builtin::Lang,
        "DATATYPE" => Builtin::Datatype,
        "SAMETERM" => Builtin::SameTerm,
        "LANGMATCHES" => Builtin::LangMatches,
        "REGEX" => Builtin::Regex,
        _ => return None,
    })
}

fn numeric_literal(text: String, kind: &str) -> TermAst {
    TermAst::Literal {
        lexical: text,
        lang: None,
        datatype: Some(format!("{XSD}{kind}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> QueryAst {
        Parser::new(input).parse().unwrap()
    }

    #[test]
    fn test_parse_select() {
        let q = parse("SELECT ?s ?o WHERE { ?s <http://p> ?o . }");
        assert!(matches!(&q.form, QueryForm::Select(Projection::Vars(v)) if v == &["s", "o"]));
        assert_eq!(q.pattern.elements.len(), 1);
        let GroupElement::Triples(triples) = &q.pattern.elements[0] else {
            panic!("expected a triples block");
        };
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn test_parse_prefixes_and_abbreviations() {
        let q = parse(
            "PREFIX foaf: <http://xmlns.com/foaf/0.1/> \
             SELECT ?s WHERE { ?s a foaf:Person ; foaf:name \"Alice\", \"Bob\" . }",
        );
        let GroupElement::Triples(triples) = &q.pattern.elements[0] else {
            panic!("expected a triples block");
        };
        assert_eq!(triples.len(), 3);
        let TermAst::Iri(t) = &triples[0].predicate else {
            panic!("expected rdf:type IRI");
        };
        assert!(t.ends_with("#type"));
        let TermAst::Iri(name) = &triples[1].predicate else {
            panic!("expected expanded prefixed name");
        };
        assert_eq!(name, "http://xmlns.com/foaf/0.1/name");
    }

    #[test]
    fn test_parse_filter_and_optional() {
        let q = parse(
            "SELECT ?s WHERE { ?s <http://p> ?o . FILTER(?o > 3) \
             OPTIONAL { ?s <http://q> ?r } }",
        );
        assert_eq!(q.pattern.elements.len(), 3);
        assert!(matches!(q.pattern.elements[1], GroupElement::Filter(_)));
        assert!(matches!(q.pattern.elements[2], GroupElement::Optional(_)));
    }

    #[test]
    fn test_parse_union() {
        let q = parse("SELECT ?s WHERE { { ?s <http://p> 1 } UNION { ?s <http://q> 2 } }");
        let GroupElement::Union(branches) = &q.pattern.elements[0] else {
            panic!("expected a union");
        };
        assert_eq!(branches.len(), 2);
    }

    #[test]
    fn test_parse_modifiers() {
        let q = parse(
            "SELECT DISTINCT ?o WHERE { ?s ?p ?o } ORDER BY DESC(?o) ?s LIMIT 5 OFFSET 2",
        );
        assert!(q.distinct);
        assert_eq!(q.orders.len(), 2);
        assert!(q.orders[0].descending);
        assert!(!q.orders[1].descending);
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.offset, 2);
    }

    #[test]
    fn test_parse_ask() {
        let q = parse("ASK { <http://s> <http://p> 3 }");
        assert!(matches!(q.form, QueryForm::Ask));
    }

    #[test]
    fn test_parse_expression_precedence() {
        let q = parse("SELECT ?x WHERE { ?x <http://p> ?y . FILTER(?x = 1 || ?y > 2 && !BOUND(?x)) }");
        let GroupElement::Filter(expr) = &q.pattern.elements[1] else {
            panic!("expected filter");
        };
        // || binds weaker than &&
        let ExprAst::Or(_, rhs) = expr else {
            panic!("expected top-level OR");
        };
        assert!(matches!(**rhs, ExprAst::And(_, _)));
    }

    #[test]
    fn test_errors() {
        assert!(Parser::new("SELECT WHERE { }").parse().is_err());
        assert!(Parser::new("SELECT ?x WHERE { ?x <p> ").parse().is_err());
        assert!(matches!(
            Parser::new("CONSTRUCT { } WHERE { }").parse(),
            Err(Error::Unsupported(_))
        ));
        assert!(Parser::new("SELECT ?x WHERE { ?x foaf:name ?y }")
            .parse()
            .is_err());
    }

    #[test]
    fn test_typed_and_tagged_literals() {
        let q = parse(
            "SELECT ?s WHERE { ?s <http://p> \"x\"^^<http://dt> . ?s <http://q> \"hi\"@en }",
        );
        let GroupElement::Triples(triples) = &q.pattern.elements[0] else {
            panic!("expected triples");
        };
        assert!(matches!(
            &triples[0].object,
            TermAst::Literal { datatype: Some(dt), .. } if dt == "http://dt"
        ));
        assert!(matches!(
            &triples[1].object,
            TermAst::Literal { lang: Some(l), .. } if l == "en"
        ));
    }
}
